use std::io;

/// Reasons an allocator could not be brought up.
///
/// Every variant leaves the caller's state untouched: no region is mapped and
/// no process-wide engine is installed.
#[derive(Debug, thiserror::Error)]
pub enum InitError {
  #[error("allocator has already been initialized")]
  AlreadyInitialized,
  #[error("region capacity must be greater than zero")]
  ZeroCapacity,
  #[error("region capacity {0} is not a power of two")]
  NotPowerOfTwo(usize),
  #[error("no placement strategy with id {0}")]
  UnknownStrategy(i32),
  #[error("region capacity {capacity} is below the buddy minimum of {minimum} bytes")]
  CapacityTooSmall { capacity: usize, minimum: usize },
  #[error("failed to reserve {len} bytes from the OS")]
  Reservation {
    len: usize,
    #[source]
    source: io::Error,
  },
}

/// Reasons a pointer was refused by `deallocate`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum FreeError {
  #[error("cannot free a null pointer")]
  Null,
  #[error("pointer {0:#x} does not lie inside the managed region")]
  OutOfRegion(usize),
  #[error("pointer {0:#x} is not the start of a block payload")]
  NotABlock(usize),
  #[error("pointer {0:#x} refers to a block that is not allocated (double free?)")]
  NotAllocated(usize),
  #[error("allocator has not been initialized")]
  Uninitialized,
}

/// First broken block-list invariant found by
/// [`Allocator::check_invariants`](crate::Allocator::check_invariants).
///
/// Offsets are relative to the region base.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum InvariantError {
  #[error("block expected at offset {expected} but list continues at {found}")]
  Gap { expected: usize, found: usize },
  #[error("block at offset {offset} extends past the tracked end {end}")]
  Overrun { offset: usize, end: usize },
  #[error("block at offset {offset} has a payload of {size} bytes, not a word multiple")]
  Misaligned { offset: usize, size: usize },
  #[error("buddy block at offset {offset} spans {span} bytes, not an aligned power of two")]
  NotBuddy { offset: usize, span: usize },
  #[error("block list ends at offset {end}, region tracks {tracked} bytes")]
  ShortList { end: usize, tracked: usize },
}

/// A strategy name that [`Strategy::from_str`](crate::Strategy) did not recognise.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown placement strategy `{0}`")]
pub struct ParseStrategyError(pub String);

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn free_errors_name_the_pointer() {
    assert_eq!(
      FreeError::NotAllocated(0x1000).to_string(),
      "pointer 0x1000 refers to a block that is not allocated (double free?)"
    );
    assert_eq!(
      FreeError::NotABlock(0x1008).to_string(),
      "pointer 0x1008 is not the start of a block payload"
    );
  }
}
