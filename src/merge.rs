//! Carving blocks on allocation and merging them back on free.

use crate::Allocator;
use crate::block::{HEADER_SIZE, Header};

impl Allocator {
  /// Shrinks free `block` to `size` and links the remainder in behind it, as
  /// long as the remainder can hold a header. Otherwise the whole block is
  /// handed out as is.
  pub(crate) fn split(&mut self, block: usize, size: usize) {
    let mut header = self.header(block);
    let free = header.payload_size();
    debug_assert!(free >= size);
    if free - size < HEADER_SIZE {
      return;
    }

    let rest = block + HEADER_SIZE + size;
    self.set_header(rest, Header::free(free - size - HEADER_SIZE, header.next()));
    header.set_payload_size(size);
    header.set_next(Some(rest));
    self.set_header(block, header);
    log::trace!("split block {block}: {size} + {} at {rest}", free - size - HEADER_SIZE);
  }

  /// Halves free buddy `block` while the lower half still fits `size`.
  pub(crate) fn halve_to_fit(&mut self, block: usize, size: usize) {
    loop {
      let mut header = self.header(block);
      let half = header.span() / 2;
      match half.checked_sub(HEADER_SIZE) {
        Some(payload) if payload >= size => {
          let upper = block + half;
          self.set_header(upper, Header::free(payload, header.next()));
          header.set_payload_size(payload);
          header.set_next(Some(upper));
          self.set_header(block, header);
          log::trace!("halved buddy block {block}: upper half at {upper}, span {half}");
        }
        _ => break,
      }
    }
  }

  /// Folds `upper` into the block right before it. `upper` disappears from the list.
  fn absorb(&mut self, lower: usize, upper: usize) {
    let mut header = self.header(lower);
    let absorbed = self.header(upper);
    debug_assert_eq!(header.next(), Some(upper));
    header.set_payload_size(header.payload_size() + HEADER_SIZE + absorbed.payload_size());
    header.set_next(absorbed.next());
    self.set_header(lower, header);
    if self.cursor == Some(upper) {
      self.cursor = Some(lower);
    }
    log::trace!("merged block {upper} into {lower}");
  }

  /// Merges a just-freed block with its free successor, then with its free
  /// predecessor. Returns the block that now holds the freed bytes.
  pub(crate) fn coalesce(&mut self, prev: Option<usize>, block: usize) -> usize {
    if let Some(next) = self.header(block).next()
      && !self.header(next).is_allocated()
    {
      self.absorb(block, next);
    }

    match prev {
      Some(prev) if !self.header(prev).is_allocated() => {
        self.absorb(prev, block);
        prev
      }
      _ => block,
    }
  }

  /// Merges a just-freed buddy block with its buddy for as long as the buddy
  /// is free and of equal span. Returns the resulting block.
  pub(crate) fn merge_buddies(&mut self, mut block: usize) -> usize {
    loop {
      let span = self.header(block).span();
      if span >= self.tracked {
        break;
      }
      let buddy = block ^ span;
      let buddy_header = self.header(buddy);
      if buddy_header.is_allocated() || buddy_header.span() != span {
        break;
      }

      let (lower, upper) = if buddy < block {
        (buddy, block)
      } else {
        (block, buddy)
      };
      self.absorb(lower, upper);
      block = lower;
    }
    block
  }
}

#[cfg(test)]
mod tests {
  use crate::{Allocator, BlockInfo, HEADER_SIZE, Strategy};

  fn layout(heap: &Allocator) -> Vec<(usize, usize, bool)> {
    heap
      .blocks()
      .map(|BlockInfo { offset, payload_size, allocated }| (offset, payload_size, allocated))
      .collect()
  }

  #[test]
  fn split_leaves_trailing_remainder() {
    let mut heap = Allocator::new(1024, Strategy::FirstFit).unwrap();
    let total = heap.usable_capacity();
    heap.allocate(100).unwrap();
    assert_eq!(
      layout(&heap),
      vec![
        (0, 104, true),
        (HEADER_SIZE + 104, total - 104 - HEADER_SIZE, false),
      ]
    );
  }

  #[test]
  fn no_split_when_remainder_cannot_hold_header() {
    let mut heap = Allocator::new(1024, Strategy::FirstFit).unwrap();
    let total = heap.usable_capacity();
    // Leaves exactly one word behind, too small for a header.
    let ptr = heap.allocate(total - 8).unwrap();
    assert_eq!(layout(&heap), vec![(0, total, true)]);
    assert_eq!(heap.usable_size(ptr.as_ptr()), Some(total));
  }

  #[test]
  fn split_with_room_for_bare_header() {
    let mut heap = Allocator::new(1024, Strategy::FirstFit).unwrap();
    let total = heap.usable_capacity();
    heap.allocate(total - HEADER_SIZE).unwrap();
    assert_eq!(
      layout(&heap),
      vec![(0, total - HEADER_SIZE, true), (total, 0, false)]
    );
  }

  #[test]
  fn free_merges_next_then_previous() {
    let mut heap = Allocator::new(1024, Strategy::FirstFit).unwrap();
    let a = heap.allocate(64).unwrap();
    let b = heap.allocate(64).unwrap();
    let c = heap.allocate(64).unwrap();
    let _d = heap.allocate(64).unwrap();

    heap.deallocate(a.as_ptr()).unwrap();
    heap.deallocate(c.as_ptr()).unwrap();
    assert_eq!(heap.dump().free_blocks, 3);

    // Freeing `b` joins a, b and c in one call.
    heap.deallocate(b.as_ptr()).unwrap();
    let blocks = layout(&heap);
    assert_eq!(blocks[0], (0, 3 * 64 + 2 * HEADER_SIZE, false));
    assert!(blocks[1].2);
    assert_eq!(blocks.len(), 3);
  }

  #[test]
  fn full_free_restores_single_block() {
    for strategy in [Strategy::BestFit, Strategy::WorstFit, Strategy::FirstFit, Strategy::NextFit] {
      let mut heap = Allocator::new(2048, strategy).unwrap();
      let total = heap.usable_capacity();
      let ptrs = [24, 200, 8, 72, 512].map(|n| heap.allocate(n).unwrap());
      for i in [1, 3, 0, 4, 2] {
        heap.deallocate(ptrs[i].as_ptr()).unwrap();
      }
      assert_eq!(layout(&heap), vec![(0, total, false)], "{strategy}");
    }
  }

  #[test]
  fn cursor_follows_absorbing_block() {
    let mut heap = Allocator::new(1024, Strategy::NextFit).unwrap();
    let a = heap.allocate(64).unwrap();
    let b = heap.allocate(64).unwrap();
    heap.deallocate(a.as_ptr()).unwrap();
    // `b` is the cursor; freeing it folds it into `a`.
    heap.deallocate(b.as_ptr()).unwrap();
    assert_eq!(heap.cursor, Some(0));
    assert!(heap.check_invariants().is_ok());
    assert!(heap.allocate(64).is_some());
  }

  #[test]
  fn buddy_halves_down_to_request() {
    let mut heap = Allocator::new(1024, Strategy::Buddy).unwrap();
    heap.allocate(100).unwrap();
    assert_eq!(
      layout(&heap),
      vec![
        (0, 128 - HEADER_SIZE, true),
        (128, 128 - HEADER_SIZE, false),
        (256, 256 - HEADER_SIZE, false),
        (512, 512 - HEADER_SIZE, false),
      ]
    );
  }

  #[test]
  fn buddy_merge_climbs_to_root() {
    let mut heap = Allocator::new(1024, Strategy::Buddy).unwrap();
    let ptr = heap.allocate(8).unwrap();
    assert_eq!(heap.dump().blocks, 6);
    heap.deallocate(ptr.as_ptr()).unwrap();
    assert_eq!(layout(&heap), vec![(0, 1024 - HEADER_SIZE, false)]);
  }

  #[test]
  fn buddy_merge_stops_at_allocated_buddy() {
    let mut heap = Allocator::new(1024, Strategy::Buddy).unwrap();
    let a = heap.allocate(100).unwrap();
    let _b = heap.allocate(100).unwrap();
    heap.deallocate(a.as_ptr()).unwrap();
    assert_eq!(heap.dump().blocks, 4);
    assert_eq!(layout(&heap)[0], (0, 128 - HEADER_SIZE, false));
  }

  #[test]
  fn buddy_merge_stops_at_size_mismatch() {
    let mut heap = Allocator::new(1024, Strategy::Buddy).unwrap();
    let a = heap.allocate(100).unwrap();
    let _c = heap.allocate(200).unwrap();
    heap.deallocate(a.as_ptr()).unwrap();
    assert_eq!(
      layout(&heap),
      vec![
        (0, 256 - HEADER_SIZE, false),
        (256, 256 - HEADER_SIZE, true),
        (512, 512 - HEADER_SIZE, false),
      ]
    );
  }

  #[test]
  fn buddy_lower_block_absorbs_upper() {
    let mut heap = Allocator::new(1024, Strategy::Buddy).unwrap();
    let a = heap.allocate(100).unwrap();
    let b = heap.allocate(100).unwrap();
    heap.deallocate(b.as_ptr()).unwrap();
    assert_eq!(layout(&heap)[1], (128, 128 - HEADER_SIZE, false));
    heap.deallocate(a.as_ptr()).unwrap();
    assert_eq!(layout(&heap), vec![(0, 1024 - HEADER_SIZE, false)]);
  }
}
