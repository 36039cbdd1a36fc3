//! # umem - a fixed-region user-space allocator
//!
//! An [`Allocator`] maps one region from the OS when it is built and carves
//! every allocation out of it. Blocks carry an in-band header and form an
//! address-ordered list that partitions the region with no gaps:
//!
//! ```text
//!   base                                                     base + tracked
//!   ┌────┬─────────┬────┬───────────────┬────┬─────────────────────────┐
//!   │ H  │ alloc'd │ H  │     free      │ H  │          free           │
//!   └────┴─────────┴────┴───────────────┴────┴─────────────────────────┘
//!     │             ▲ │                 ▲
//!     └── next ─────┘ └──── next ───────┘      (next = offset from base)
//! ```
//!
//! Which free block serves a request is decided by the [`Strategy`] chosen at
//! construction:
//!
//! - **Best-fit / worst-fit / first-fit / next-fit** split the chosen block
//!   when the remainder can hold another header, and coalesce with both
//!   address neighbours on free.
//! - **Buddy** keeps every block span a power of two, halves on allocation
//!   and merges XOR buddies on free.
//!
//! ## Concurrency
//!
//! `Allocator` is `Send` but not `Sync`: every mutating call takes
//! `&mut self`, so one owner has exclusive access. The [`global`] module
//! wraps a single process-wide instance in one coarse lock.
//!
//! ## Example
//!
//! ```rust
//! use umem::{Allocator, Strategy};
//!
//! let mut heap = Allocator::new(4096, Strategy::BestFit).unwrap();
//! let ptr = heap.allocate(100).unwrap();
//! unsafe { ptr.as_ptr().write_bytes(0xAB, 100) };
//! heap.deallocate(ptr.as_ptr()).unwrap();
//! assert_eq!(heap.dump().blocks, 1);
//! ```

mod block;
mod error;
mod merge;
mod placement;
mod region;
mod report;
mod strategy;

#[cfg(feature = "c_api")]
pub mod ffi;
pub mod global;

use core::ptr::NonNull;

pub use block::{HEADER_SIZE, WORD_SIZE};
pub use error::{FreeError, InitError, InvariantError, ParseStrategyError};
pub use report::{BlockInfo, Report};
pub use strategy::Strategy;

use block::{Header, align_up};
use region::Region;

/// The first block always starts at the region base; merges keep the lower address.
const HEAD: usize = 0;

/// Smallest buddy region: one block with a single word of payload.
pub const MIN_BUDDY_CAPACITY: usize = (HEADER_SIZE + WORD_SIZE).next_power_of_two();

// =============================================================================
// Allocator
// =============================================================================

pub struct Allocator {
  region: Region,
  strategy: Strategy,
  capacity: usize,
  /// Bytes covered by the block list; the buddy tree never uses page slack.
  tracked: usize,
  /// Most recently allocated block, where next-fit resumes.
  cursor: Option<usize>,
}

impl Allocator {
  /// Maps a region for `capacity` bytes and installs one free block over it.
  ///
  /// Linear strategies track the whole page-rounded mapping; buddy tracks
  /// exactly `capacity` so that every block span stays a power of two.
  pub fn new(capacity: usize, strategy: Strategy) -> Result<Self, InitError> {
    if capacity == 0 {
      return Err(InitError::ZeroCapacity);
    }
    if !capacity.is_power_of_two() {
      return Err(InitError::NotPowerOfTwo(capacity));
    }
    if strategy.is_buddy() && capacity < MIN_BUDDY_CAPACITY {
      return Err(InitError::CapacityTooSmall {
        capacity,
        minimum: MIN_BUDDY_CAPACITY,
      });
    }

    let mut region = Region::reserve(capacity)?;
    let tracked = if strategy.is_buddy() {
      capacity
    } else {
      region.len()
    };

    // Safety: offset 0 of a fresh mapping at least one page long.
    unsafe { region.write_header(HEAD, Header::free(tracked - HEADER_SIZE, None)) };

    log::debug!(
      "initialized {strategy} allocator: capacity {capacity}, tracking {tracked} of {} reserved bytes",
      region.len()
    );

    Ok(Self {
      region,
      strategy,
      capacity,
      tracked,
      cursor: None,
    })
  }

  /// Hands out at least `size` bytes, rounded up to a word multiple.
  ///
  /// Returns `None` for a zero-sized request or when no free block fits
  /// under the active strategy; nothing is modified in that case.
  pub fn allocate(&mut self, size: usize) -> Option<NonNull<u8>> {
    if size == 0 {
      return None;
    }
    let size = align_up(size, WORD_SIZE)?;

    let block = match self.strategy {
      Strategy::BestFit => self.best_fit(size),
      Strategy::WorstFit => self.worst_fit(size),
      Strategy::FirstFit => self.first_fit(size),
      Strategy::NextFit => self.next_fit(size),
      Strategy::Buddy => self.buddy_fit(size),
    }?;

    if self.strategy.is_buddy() {
      self.halve_to_fit(block, size);
    } else {
      self.split(block, size);
    }

    let mut header = self.header(block);
    header.set_allocated(true);
    self.set_header(block, header);
    self.cursor = Some(block);
    self.tripwire();

    Some(self.region.ptr_at(block + HEADER_SIZE))
  }

  /// Returns a block obtained from [`allocate`](Self::allocate) and merges it
  /// with free neighbours.
  ///
  /// The pointer is checked before anything is touched: it must lie in the
  /// region, start a block payload on the list, and that block must be
  /// allocated.
  pub fn deallocate(&mut self, ptr: *mut u8) -> Result<(), FreeError> {
    let (prev, block, mut header) = self.resolve(ptr).inspect_err(|err| {
      log::debug!("rejected free of {ptr:p}: {err}");
    })?;
    if !header.is_allocated() {
      log::debug!("rejected free of {ptr:p}: block is already free");
      return Err(FreeError::NotAllocated(ptr.addr()));
    }

    header.set_allocated(false);
    self.set_header(block, header);

    let survivor = if self.strategy.is_buddy() {
      self.merge_buddies(block)
    } else {
      self.coalesce(prev, block)
    };
    self.release_payload(survivor);
    self.tripwire();
    Ok(())
  }

  /// Payload size of the live allocation at `ptr`.
  pub fn usable_size(&self, ptr: *const u8) -> Option<usize> {
    let (_, _, header) = self.resolve(ptr.cast_mut()).ok()?;
    header.is_allocated().then(|| header.payload_size())
  }

  /// Whether `ptr` points into the part of the region covered by blocks.
  pub fn contains(&self, ptr: *const u8) -> bool {
    self
      .region
      .offset_of(ptr.addr())
      .is_some_and(|offset| offset < self.tracked)
  }

  #[inline]
  pub fn strategy(&self) -> Strategy {
    self.strategy
  }

  /// Capacity requested at construction.
  #[inline]
  pub fn capacity(&self) -> usize {
    self.capacity
  }

  /// Bytes mapped from the OS (capacity rounded up to whole pages).
  #[inline]
  pub fn reserved_len(&self) -> usize {
    self.region.len()
  }

  /// Bytes partitioned by the block list.
  #[inline]
  pub fn tracked_len(&self) -> usize {
    self.tracked
  }

  /// Payload of the initial block, the most a single request can get.
  ///
  /// In buddy mode this is `capacity - HEADER_SIZE`: the power of two is the
  /// block span, header included.
  #[inline]
  pub fn usable_capacity(&self) -> usize {
    self.tracked - HEADER_SIZE
  }

  /// Start of the region; block offsets are relative to it.
  #[inline]
  pub fn base(&self) -> NonNull<u8> {
    self.region.base()
  }

  // ===========================================================================
  // Internals
  // ===========================================================================

  #[inline]
  fn header(&self, block: usize) -> Header {
    debug_assert!(block + HEADER_SIZE <= self.tracked);
    // Safety: block offsets only ever come from the list, which stays inside `tracked`.
    unsafe { self.region.read_header(block) }
  }

  #[inline]
  fn set_header(&mut self, block: usize, header: Header) {
    debug_assert!(block + HEADER_SIZE <= self.tracked);
    // Safety: as for `header`; callers only write headers of free or resized blocks.
    unsafe { self.region.write_header(block, header) };
  }

  /// Walks the list in address order.
  fn walk(&self) -> impl Iterator<Item = (usize, Header)> + '_ {
    core::iter::successors(Some((HEAD, self.header(HEAD))), move |(_, header)| {
      header.next().map(|next| (next, self.header(next)))
    })
  }

  /// Maps a caller pointer to `(previous block, block, header)` without
  /// trusting it: the block must be found on the list.
  fn resolve(&self, ptr: *mut u8) -> Result<(Option<usize>, usize, Header), FreeError> {
    if ptr.is_null() {
      return Err(FreeError::Null);
    }
    let addr = ptr.addr();
    let payload = self
      .region
      .offset_of(addr)
      .filter(|&offset| offset < self.tracked)
      .ok_or(FreeError::OutOfRegion(addr))?;
    let block = payload
      .checked_sub(HEADER_SIZE)
      .filter(|block| block % WORD_SIZE == 0)
      .ok_or(FreeError::NotABlock(addr))?;

    let mut prev = None;
    for (offset, header) in self.walk() {
      if offset == block {
        return Ok((prev, block, header));
      }
      if offset > block {
        break;
      }
      prev = Some(offset);
    }
    Err(FreeError::NotABlock(addr))
  }

  #[cfg(feature = "release-mem")]
  fn release_payload(&self, block: usize) {
    let header = self.header(block);
    self.region.release(block + HEADER_SIZE, header.payload_size());
  }

  #[cfg(not(feature = "release-mem"))]
  #[inline]
  fn release_payload(&self, _block: usize) {}

  #[inline]
  fn tripwire(&self) {
    #[cfg(feature = "debug-tripwire")]
    if let Err(err) = self.check_invariants() {
      panic!("block list corrupted: {err}");
    }
  }
}

impl core::fmt::Debug for Allocator {
  fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
    f.debug_struct("Allocator")
      .field("base", &self.region.base())
      .field("strategy", &self.strategy)
      .field("capacity", &self.capacity)
      .field("tracked", &self.tracked)
      .field("cursor", &self.cursor)
      .finish()
  }
}
