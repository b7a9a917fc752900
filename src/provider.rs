//! The page provider: the external collaborator that supplies monotonic
//! heap growth. The allocator never shrinks the heap back to the
//! provider and never asks for an interior address; it only ever asks for
//! more space glued onto the end of what it already has.

use std::ptr;

/// Supplies monotonic heap growth by whole-byte chunks.
///
/// Implementations must guarantee that the range returned by `extend` is
/// immediately adjacent to the previously-ending byte of the heap, that the
/// heap never shrinks, and that `extend` never returns an interior address.
pub trait PageProvider {
  /// Grows the heap by `n` bytes, returning the start of the newly-added
  /// range, or `None` on exhaustion.
  fn extend(&mut self, n: usize) -> Option<*mut u8>;
  /// Current low end of the heap region.
  fn lo(&self) -> *mut u8;
  /// Current high end (one past the last byte) of the heap region.
  fn hi(&self) -> *mut u8;
}

/// The production page provider: grows the process heap with `sbrk(2)`.
///
/// This is the same system call a bump allocator would use to extend the
/// program break directly; here it plays the role of "lower-level page
/// provider" rather than being the whole allocator.
pub struct SbrkProvider {
  lo: *mut u8,
  hi: *mut u8,
}

impl SbrkProvider {
  /// Anchors the provider at the current program break.
  pub fn new() -> Self {
    let cur = unsafe { libc::sbrk(0) } as *mut u8;
    Self { lo: cur, hi: cur }
  }
}

impl Default for SbrkProvider {
  fn default() -> Self {
    Self::new()
  }
}

impl PageProvider for SbrkProvider {
  fn extend(&mut self, n: usize) -> Option<*mut u8> {
    let raw = unsafe { libc::sbrk(n as libc::intptr_t) };
    if raw as isize == -1 {
      return None;
    }
    let raw = raw as *mut u8;
    self.hi = unsafe { raw.add(n) };
    Some(raw)
  }

  fn lo(&self) -> *mut u8 {
    self.lo
  }

  fn hi(&self) -> *mut u8 {
    self.hi
  }
}

/// A deterministic, in-process provider for tests: backs the heap with a
/// fixed-size `Vec<u8>` instead of moving the real program break, and can
/// be told to start failing after a given number of successful `extend`
/// calls (used to simulate provider exhaustion, e.g. boundary scenario S6).
pub struct MockProvider {
  storage: Vec<u8>,
  used: usize,
  fail_after: Option<usize>,
  calls: usize,
}

impl MockProvider {
  pub fn new(capacity: usize) -> Self {
    Self {
      storage: vec![0u8; capacity],
      used: 0,
      fail_after: None,
      calls: 0,
    }
  }

  /// After `count` successful `extend` calls, every subsequent call fails.
  pub fn fail_after(mut self, count: usize) -> Self {
    self.fail_after = Some(count);
    self
  }
}

impl PageProvider for MockProvider {
  fn extend(&mut self, n: usize) -> Option<*mut u8> {
    if let Some(limit) = self.fail_after {
      if self.calls >= limit {
        return None;
      }
    }
    if self.used + n > self.storage.len() {
      return None;
    }
    let start = unsafe { self.storage.as_mut_ptr().add(self.used) };
    self.used += n;
    self.calls += 1;
    Some(start)
  }

  fn lo(&self) -> *mut u8 {
    if self.storage.is_empty() {
      ptr::null_mut()
    } else {
      self.storage.as_ptr() as *mut u8
    }
  }

  fn hi(&self) -> *mut u8 {
    unsafe { (self.storage.as_ptr() as *mut u8).add(self.used) }
  }
}
