use core::fmt;
use core::str::FromStr;

use crate::error::{InitError, ParseStrategyError};

/// Placement policy, chosen once when the allocator is built.
///
/// The discriminants are the numeric ids used by the C interface.
#[repr(i32)]
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Strategy {
  /// Smallest free block that fits; earliest wins a tie.
  BestFit = 1,
  /// Largest free block that fits; earliest wins a tie.
  WorstFit = 2,
  /// First free block in address order that fits.
  FirstFit = 3,
  /// First fit, resuming after the previously allocated block.
  NextFit = 4,
  /// Power-of-two halving with XOR buddy merging.
  Buddy = 5,
}

impl Strategy {
  pub const ALL: [Strategy; 5] = [
    Strategy::BestFit,
    Strategy::WorstFit,
    Strategy::FirstFit,
    Strategy::NextFit,
    Strategy::Buddy,
  ];

  #[inline]
  pub const fn id(self) -> i32 {
    self as i32
  }

  #[inline]
  pub const fn is_buddy(self) -> bool {
    matches!(self, Strategy::Buddy)
  }

  pub const fn name(self) -> &'static str {
    match self {
      Strategy::BestFit => "best-fit",
      Strategy::WorstFit => "worst-fit",
      Strategy::FirstFit => "first-fit",
      Strategy::NextFit => "next-fit",
      Strategy::Buddy => "buddy",
    }
  }
}

impl TryFrom<i32> for Strategy {
  type Error = InitError;

  fn try_from(id: i32) -> Result<Self, Self::Error> {
    Strategy::ALL
      .into_iter()
      .find(|s| s.id() == id)
      .ok_or(InitError::UnknownStrategy(id))
  }
}

impl FromStr for Strategy {
  type Err = ParseStrategyError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let normalized = s.trim().to_ascii_lowercase().replace('_', "-");
    Strategy::ALL
      .into_iter()
      .find(|strategy| strategy.name() == normalized)
      .ok_or_else(|| ParseStrategyError(s.to_owned()))
  }
}

impl fmt::Display for Strategy {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.name())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn ids_match_c_constants() {
    assert_eq!(Strategy::try_from(1).ok(), Some(Strategy::BestFit));
    assert_eq!(Strategy::try_from(5).ok(), Some(Strategy::Buddy));
    assert!(matches!(Strategy::try_from(0), Err(InitError::UnknownStrategy(0))));
    assert!(matches!(Strategy::try_from(6), Err(InitError::UnknownStrategy(6))));
    assert!(matches!(Strategy::try_from(-1), Err(InitError::UnknownStrategy(-1))));
  }

  #[test]
  fn parses_names() {
    assert_eq!("best-fit".parse(), Ok(Strategy::BestFit));
    assert_eq!("Next_Fit".parse(), Ok(Strategy::NextFit));
    assert_eq!(" buddy ".parse(), Ok(Strategy::Buddy));
    assert_eq!(
      "slab".parse::<Strategy>(),
      Err(ParseStrategyError("slab".to_owned()))
    );
  }

  #[test]
  fn display_round_trips_through_parse() {
    for strategy in Strategy::ALL {
      assert_eq!(strategy.to_string().parse(), Ok(strategy));
    }
  }
}
