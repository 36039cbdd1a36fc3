//! Read-only views of the block list.

use core::fmt;

use crate::block::{HEADER_SIZE, WORD_SIZE};
use crate::error::InvariantError;
use crate::{Allocator, HEAD};

/// One block as seen by [`Allocator::blocks`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockInfo {
  /// Header offset from the region base.
  pub offset: usize,
  pub payload_size: usize,
  pub allocated: bool,
}

/// Aggregate counters produced by [`Allocator::dump`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Report {
  pub header_size: usize,
  pub blocks: usize,
  pub allocated_blocks: usize,
  pub free_blocks: usize,
  /// Payload bytes of allocated blocks (headers excluded).
  pub allocated_bytes: usize,
  /// Payload bytes of free blocks (headers excluded).
  pub free_bytes: usize,
}

impl fmt::Display for Report {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    writeln!(f, "=====================MEMORY DUMP=====================")?;
    writeln!(f, "Size of the memory block metadata: {}", self.header_size)?;
    writeln!(f, "Total number of blocks: {}", self.blocks)?;
    writeln!(f, "Total number of allocated blocks: {}", self.allocated_blocks)?;
    writeln!(f, "Total number of free blocks: {}", self.free_blocks)?;
    writeln!(f, "Total allocated size: {}", self.allocated_bytes)?;
    writeln!(f, "Total free size: {}", self.free_bytes)?;
    write!(f, "=====================MEMORY DUMP=====================")
  }
}

impl Allocator {
  /// Every block in address order.
  pub fn blocks(&self) -> impl Iterator<Item = BlockInfo> + '_ {
    self.walk().map(|(offset, header)| BlockInfo {
      offset,
      payload_size: header.payload_size(),
      allocated: header.is_allocated(),
    })
  }

  /// Counts blocks and bytes, logs the result at debug level and returns it.
  pub fn dump(&self) -> Report {
    let report = self.blocks().fold(
      Report {
        header_size: HEADER_SIZE,
        ..Report::default()
      },
      |mut report, block| {
        report.blocks += 1;
        if block.allocated {
          report.allocated_blocks += 1;
          report.allocated_bytes += block.payload_size;
        } else {
          report.free_blocks += 1;
          report.free_bytes += block.payload_size;
        }
        report
      },
    );
    log::debug!("{report}");
    report
  }

  /// Walks the list checking that blocks tile the tracked region in address
  /// order with word-multiple payloads, and, for buddy, aligned power-of-two
  /// spans.
  ///
  /// Reads only headers it has already proven to lie inside the region.
  pub fn check_invariants(&self) -> Result<(), InvariantError> {
    let mut expected = HEAD;
    let mut current = Some(HEAD);
    while let Some(offset) = current {
      if offset != expected {
        return Err(InvariantError::Gap { expected, found: offset });
      }
      if offset + HEADER_SIZE > self.tracked {
        return Err(InvariantError::Overrun {
          offset,
          end: self.tracked,
        });
      }

      let header = self.header(offset);
      let size = header.payload_size();
      if size % WORD_SIZE != 0 {
        return Err(InvariantError::Misaligned { offset, size });
      }
      let span = header.span();
      if self.strategy.is_buddy() && !(span.is_power_of_two() && offset % span == 0) {
        return Err(InvariantError::NotBuddy { offset, span });
      }

      expected = match offset.checked_add(span) {
        Some(end) if end <= self.tracked => end,
        _ => {
          return Err(InvariantError::Overrun {
            offset,
            end: self.tracked,
          });
        }
      };
      current = header.next();
    }

    if expected != self.tracked {
      return Err(InvariantError::ShortList {
        end: expected,
        tracked: self.tracked,
      });
    }
    Ok(())
  }
}
