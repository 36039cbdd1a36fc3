//! Search policies. Each one only picks a block; carving and flagging happen
//! in [`Allocator::allocate`].

use crate::block::HEADER_SIZE;
use crate::{Allocator, HEAD};

impl Allocator {
  /// Smallest fitting free block by total span; the earliest wins a tie.
  pub(crate) fn best_fit(&self, size: usize) -> Option<usize> {
    let mut best: Option<(usize, usize)> = None;
    for (offset, header) in self.walk() {
      if !header.is_free_candidate() || header.payload_size() < size {
        continue;
      }
      let span = header.payload_size() + HEADER_SIZE;
      if best.is_none_or(|(_, best_span)| span < best_span) {
        best = Some((offset, span));
      }
    }
    best.map(|(offset, _)| offset)
  }

  /// Largest fitting free block by total span; a later equal block does not
  /// replace the first one found.
  pub(crate) fn worst_fit(&self, size: usize) -> Option<usize> {
    let mut worst: Option<(usize, usize)> = None;
    for (offset, header) in self.walk() {
      if !header.is_free_candidate() || header.payload_size() < size {
        continue;
      }
      let span = header.payload_size() + HEADER_SIZE;
      if worst.is_none_or(|(_, worst_span)| span > worst_span) {
        worst = Some((offset, span));
      }
    }
    worst.map(|(offset, _)| offset)
  }

  pub(crate) fn first_fit(&self, size: usize) -> Option<usize> {
    self.scan(Some(HEAD), None, size)
  }

  /// Resumes right after the last allocated block and wraps to the head
  /// once; the wrapped pass stops before the block the first pass started at.
  pub(crate) fn next_fit(&self, size: usize) -> Option<usize> {
    let start = match self.cursor {
      Some(cursor) => self.header(cursor).next(),
      None => Some(HEAD),
    };
    if let Some(found) = self.scan(start, None, size) {
      return Some(found);
    }

    // Nothing allocated yet means the first pass already covered the list.
    self.cursor?;
    self.scan(Some(HEAD), start, size)
  }

  /// First free block of at least `size`; it is halved down afterwards.
  pub(crate) fn buddy_fit(&self, size: usize) -> Option<usize> {
    self.scan(Some(HEAD), None, size)
  }

  /// First fitting free block from `from`, stopping at `until` (exclusive)
  /// or the end of the list.
  fn scan(&self, from: Option<usize>, until: Option<usize>, size: usize) -> Option<usize> {
    let mut current = from;
    while let Some(offset) = current {
      if Some(offset) == until {
        break;
      }
      let header = self.header(offset);
      if header.is_free_candidate() && header.payload_size() >= size {
        return Some(offset);
      }
      current = header.next();
    }
    None
  }
}
