//! Block header layout and the allocation-flag encoding.
//!
//! ```text
//! +-----------------------+------------------------------+
//! | next | size_and_flag  |       payload (size bytes)   |
//! +-----------------------+------------------------------+
//! ^ block offset          ^ block offset + HEADER_SIZE
//! ```
//!
//! `next` holds the offset of the following header, or `NO_NEXT` for the last
//! block. Payload sizes are word multiples, so the low bit of
//! `size_and_flag` is free to carry the allocated flag. All bit twiddling
//! lives here; the rest of the crate sees `(payload_size, is_allocated)`.

use core::mem::size_of;

/// Machine word size. Every payload is a multiple of this.
pub const WORD_SIZE: usize = size_of::<usize>();

/// Bytes taken by one in-band block header.
pub const HEADER_SIZE: usize = size_of::<Header>();

const NO_NEXT: usize = usize::MAX;
const ALLOCATED_BIT: usize = 1;

const _: () = assert!(WORD_SIZE.is_power_of_two());
const _: () = assert!(WORD_SIZE >= 2);
const _: () = assert!(HEADER_SIZE == 2 * WORD_SIZE);

/// Per-block metadata as it sits at the front of each block.
#[repr(C)]
#[derive(Clone, Copy, PartialEq, Eq)]
pub(crate) struct Header {
  next: usize,
  size_and_flag: usize,
}

impl Header {
  /// A free block with `payload` bytes, linked to `next`.
  #[inline]
  pub(crate) fn free(payload: usize, next: Option<usize>) -> Self {
    debug_assert!(payload % WORD_SIZE == 0, "unaligned payload {payload}");
    Self {
      next: next.unwrap_or(NO_NEXT),
      size_and_flag: payload,
    }
  }

  #[inline]
  pub(crate) fn next(&self) -> Option<usize> {
    (self.next != NO_NEXT).then_some(self.next)
  }

  #[inline]
  pub(crate) fn set_next(&mut self, next: Option<usize>) {
    self.next = next.unwrap_or(NO_NEXT);
  }

  #[inline]
  pub(crate) fn payload_size(&self) -> usize {
    self.size_and_flag & !ALLOCATED_BIT
  }

  /// Replaces the payload size, keeping the allocated flag.
  #[inline]
  pub(crate) fn set_payload_size(&mut self, payload: usize) {
    debug_assert!(payload % WORD_SIZE == 0, "unaligned payload {payload}");
    self.size_and_flag = payload | (self.size_and_flag & ALLOCATED_BIT);
  }

  #[inline]
  pub(crate) fn is_allocated(&self) -> bool {
    self.size_and_flag & ALLOCATED_BIT != 0
  }

  #[inline]
  pub(crate) fn set_allocated(&mut self, allocated: bool) {
    if allocated {
      self.size_and_flag |= ALLOCATED_BIT;
    } else {
      self.size_and_flag &= !ALLOCATED_BIT;
    }
  }

  /// True for a block the linear strategies may hand out: a set flag makes
  /// the raw word odd, hence not a word multiple.
  #[inline]
  pub(crate) fn is_free_candidate(&self) -> bool {
    self.size_and_flag % WORD_SIZE == 0
  }

  /// Header plus payload.
  #[inline]
  pub(crate) fn span(&self) -> usize {
    HEADER_SIZE + self.payload_size()
  }
}

impl core::fmt::Debug for Header {
  fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
    f.debug_struct("Header")
      .field("next", &self.next())
      .field("payload", &self.payload_size())
      .field("allocated", &self.is_allocated())
      .finish()
  }
}

/// Rounds `x` up to the next multiple of alignment `align`. Alignment must be a power of 2.
/// Returns `None` on overflow.
#[inline(always)]
pub(crate) const fn align_up(x: usize, align: usize) -> Option<usize> {
  let mask = align - 1;
  match x.checked_add(mask) {
    Some(v) => Some(v & !mask),
    None => None,
  }
}
