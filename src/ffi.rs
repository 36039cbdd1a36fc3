//! C interface over the [`global`](crate::global) allocator
//! (enabled with `--features c_api`).
//!
//! Follows C conventions: `0` for success, `-1` for failure, `NULL` when an
//! allocation cannot be served.

use core::ffi::{c_int, c_void};
use core::ptr::null_mut;

use crate::{Strategy, global};

pub const BEST_FIT: c_int = Strategy::BestFit.id();
pub const WORST_FIT: c_int = Strategy::WorstFit.id();
pub const FIRST_FIT: c_int = Strategy::FirstFit.id();
pub const NEXT_FIT: c_int = Strategy::NextFit.id();
pub const BUDDY: c_int = Strategy::Buddy.id();

#[unsafe(no_mangle)]
pub extern "C" fn umeminit(size_of_region: usize, allocation_algo: c_int) -> c_int {
  let strategy = match Strategy::try_from(allocation_algo) {
    Ok(strategy) => strategy,
    Err(err) => {
      log::warn!("umeminit: {err}");
      return -1;
    }
  };
  match global::initialize(size_of_region, strategy) {
    Ok(()) => 0,
    Err(err) => {
      log::warn!("umeminit: {err}");
      -1
    }
  }
}

#[unsafe(no_mangle)]
pub extern "C" fn umalloc(size: usize) -> *mut c_void {
  global::allocate(size).map_or(null_mut(), |ptr| ptr.as_ptr().cast())
}

/// Pointers that were not handed out by `umalloc`, or were already freed,
/// are refused with `-1`.
#[unsafe(no_mangle)]
pub extern "C" fn ufree(ptr: *mut c_void) -> c_int {
  match global::deallocate(ptr.cast()) {
    Ok(()) => 0,
    Err(_) => -1,
  }
}

/// Prints the block counters to stderr.
#[unsafe(no_mangle)]
pub extern "C" fn umemdump() {
  if let Some(report) = global::dump() {
    eprintln!("{report}");
  }
}
