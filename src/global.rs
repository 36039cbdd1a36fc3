//! One process-wide allocator behind a single lock.
//!
//! [`initialize`] succeeds at most once per process, whatever its arguments;
//! a rejected call (bad capacity, failed mapping) does not use up that one
//! chance. The region is never unmapped.

use core::ptr::NonNull;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::{Allocator, FreeError, InitError, Report, Strategy};

static ENGINE: Mutex<Option<Allocator>> = Mutex::new(None);

fn engine() -> MutexGuard<'static, Option<Allocator>> {
  ENGINE.lock().unwrap_or_else(PoisonError::into_inner)
}

pub fn initialize(capacity: usize, strategy: Strategy) -> Result<(), InitError> {
  let mut engine = engine();
  if engine.is_some() {
    log::warn!("refusing to initialize twice");
    return Err(InitError::AlreadyInitialized);
  }
  let allocator = Allocator::new(capacity, strategy).inspect_err(|err| {
    log::warn!("initialization failed: {err}");
  })?;
  *engine = Some(allocator);
  Ok(())
}

pub fn is_initialized() -> bool {
  engine().is_some()
}

/// `None` before [`initialize`] as well as on exhaustion.
pub fn allocate(size: usize) -> Option<NonNull<u8>> {
  engine().as_mut()?.allocate(size)
}

pub fn deallocate(ptr: *mut u8) -> Result<(), FreeError> {
  engine()
    .as_mut()
    .ok_or(FreeError::Uninitialized)?
    .deallocate(ptr)
}

pub fn dump() -> Option<Report> {
  engine().as_ref().map(Allocator::dump)
}

pub fn strategy() -> Option<Strategy> {
  engine().as_ref().map(Allocator::strategy)
}
