//! The one span of memory an allocator manages, mapped once and released on drop.

use core::ptr::{self, NonNull};
use std::io;

use crate::block::{HEADER_SIZE, Header, WORD_SIZE, align_up};
use crate::error::InitError;

const FALLBACK_PAGE_SIZE: usize = 4096;

// =============================================================================
// Platform
// =============================================================================

fn page_size() -> usize {
  let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
  if size > 0 {
    size as usize
  } else {
    FALLBACK_PAGE_SIZE
  }
}

unsafe fn os_mmap(size: usize) -> *mut u8 {
  let ptr = unsafe {
    libc::mmap(
      ptr::null_mut(),
      size,
      libc::PROT_READ | libc::PROT_WRITE,
      libc::MAP_PRIVATE | libc::MAP_ANONYMOUS | libc::MAP_NORESERVE,
      -1,
      0,
    )
  };

  if ptr == libc::MAP_FAILED {
    ptr::null_mut()
  } else {
    ptr as *mut u8
  }
}

unsafe fn os_munmap(ptr: *mut u8, size: usize) {
  unsafe { libc::munmap(ptr.cast(), size) };
}

// =============================================================================
// Region
// =============================================================================

pub(crate) struct Region {
  base: NonNull<u8>,
  /// Mapping length: requested capacity rounded up to whole pages.
  len: usize,
  #[cfg_attr(not(feature = "release-mem"), allow(dead_code))]
  page: usize,
}

// Safety: the mapping is owned exclusively by this value; nothing else holds `base`.
unsafe impl Send for Region {}

impl Region {
  /// Maps `capacity` bytes, rounded up to the page size.
  pub(crate) fn reserve(capacity: usize) -> Result<Self, InitError> {
    let page = page_size();
    let Some(len) = align_up(capacity, page) else {
      return Err(InitError::Reservation {
        len: capacity,
        source: io::Error::from(io::ErrorKind::OutOfMemory),
      });
    };

    let raw = unsafe { os_mmap(len) };
    let Some(base) = NonNull::new(raw) else {
      return Err(InitError::Reservation {
        len,
        source: io::Error::last_os_error(),
      });
    };
    debug_assert!(base.as_ptr().addr() % WORD_SIZE == 0);

    log::debug!(
      "reserved {len} bytes at {:p} for a {capacity} byte region (page size {page})",
      base
    );
    Ok(Self { base, len, page })
  }

  #[inline]
  pub(crate) fn base(&self) -> NonNull<u8> {
    self.base
  }

  #[inline]
  pub(crate) fn len(&self) -> usize {
    self.len
  }

  /// Offset of `addr` from the base, if it falls inside the mapping.
  #[inline]
  pub(crate) fn offset_of(&self, addr: usize) -> Option<usize> {
    addr
      .checked_sub(self.base.as_ptr().addr())
      .filter(|&offset| offset < self.len)
  }

  #[inline]
  pub(crate) fn ptr_at(&self, offset: usize) -> NonNull<u8> {
    debug_assert!(offset < self.len);
    unsafe { self.base.add(offset) }
  }

  /// # Safety
  /// `offset` must be word aligned and `offset + HEADER_SIZE <= len`.
  #[inline]
  pub(crate) unsafe fn read_header(&self, offset: usize) -> Header {
    debug_assert!(offset % WORD_SIZE == 0 && offset + HEADER_SIZE <= self.len);
    unsafe { ptr::read(self.base.as_ptr().add(offset).cast::<Header>()) }
  }

  /// # Safety
  /// Same as [`read_header`](Self::read_header), and no live allocation may
  /// overlap `[offset, offset + HEADER_SIZE)`.
  #[inline]
  pub(crate) unsafe fn write_header(&mut self, offset: usize, header: Header) {
    debug_assert!(offset % WORD_SIZE == 0 && offset + HEADER_SIZE <= self.len);
    unsafe { ptr::write(self.base.as_ptr().add(offset).cast::<Header>(), header) };
  }

  /// Hands whole pages inside `[offset, offset + len)` back to the OS.
  /// They read back as zero on next touch.
  #[cfg(feature = "release-mem")]
  pub(crate) fn release(&self, offset: usize, len: usize) {
    let Some(start) = align_up(offset, self.page) else {
      return;
    };
    let end = (offset + len) & !(self.page - 1);
    if end <= start {
      return;
    }
    unsafe {
      libc::madvise(
        self.base.as_ptr().add(start).cast(),
        end - start,
        libc::MADV_DONTNEED,
      );
    }
  }
}

impl Drop for Region {
  fn drop(&mut self) {
    unsafe { os_munmap(self.base.as_ptr(), self.len) };
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn rounds_up_to_page() {
    let page = page_size();
    let region = Region::reserve(1).expect("mmap");
    assert_eq!(region.len(), page);
    assert_eq!(region.base().as_ptr().addr() % page, 0);

    let region = Region::reserve(page + 1).expect("mmap");
    assert_eq!(region.len(), 2 * page);
  }

  #[test]
  fn offsets_are_bounded() {
    let region = Region::reserve(1024).expect("mmap");
    let base = region.base().as_ptr().addr();
    assert_eq!(region.offset_of(base), Some(0));
    assert_eq!(region.offset_of(base + region.len() - 1), Some(region.len() - 1));
    assert_eq!(region.offset_of(base + region.len()), None);
    assert_eq!(region.offset_of(base - 1), None);
  }

  #[test]
  fn headers_round_trip_through_memory() {
    let mut region = Region::reserve(1024).expect("mmap");
    let mut header = Header::free(96, Some(112));
    header.set_allocated(true);
    unsafe {
      region.write_header(0, header);
      assert_eq!(region.read_header(0), header);
    }
  }

  #[cfg(feature = "release-mem")]
  #[test]
  fn release_zeroes_only_whole_inner_pages() {
    let page = page_size();
    let region = Region::reserve(3 * page).expect("mmap");
    let bytes = region.base().as_ptr();
    unsafe { bytes.write_bytes(0xA5, 3 * page) };

    // Unaligned on both ends: only the middle page is whole.
    region.release(100, 3 * page - 200);

    let all = unsafe { core::slice::from_raw_parts(bytes, 3 * page) };
    assert!(all[..page].iter().all(|&b| b == 0xA5));
    assert!(all[page..2 * page].iter().all(|&b| b == 0));
    assert!(all[2 * page..].iter().all(|&b| b == 0xA5));
  }

  #[cfg(feature = "release-mem")]
  #[test]
  fn release_shorter_than_a_page_is_a_no_op() {
    let page = page_size();
    let region = Region::reserve(2 * page).expect("mmap");
    let bytes = region.base().as_ptr();
    unsafe { bytes.write_bytes(0x3C, 2 * page) };

    region.release(page / 2, page);

    let all = unsafe { core::slice::from_raw_parts(bytes, 2 * page) };
    assert!(all.iter().all(|&b| b == 0x3C));
  }

  #[test]
  fn overflowing_capacity_is_rejected() {
    let err = Region::reserve(usize::MAX).err().expect("cannot round usize::MAX");
    assert!(matches!(err, InitError::Reservation { .. }));
  }
}
