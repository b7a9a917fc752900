//! `GlobalAlloc` adapter.
//!
//! [`Heap`] itself has no lock; a single logical owner may mutate it,
//! and concurrent callers require external mutual exclusion. A
//! `#[global_allocator]` is reachable from any thread, so this adapter
//! supplies that external exclusion with a plain [`std::sync::Mutex`]
//! rather than teaching the core engine anything about concurrency.

use std::alloc::{GlobalAlloc, Layout};
use std::ptr;
use std::sync::Mutex;

use crate::heap::Heap;
use crate::tag::DSIZE;

/// Installs [`Heap`] as the process's `#[global_allocator]`.
///
/// ```rust,ignore
/// use seglloc::GlobalHeapAllocator;
///
/// #[global_allocator]
/// static ALLOCATOR: GlobalHeapAllocator = GlobalHeapAllocator::new();
/// ```
///
/// Layouts whose alignment exceeds the allocator's native 8-byte alignment
/// are not supported and yield `NULL`, same as any other failed allocation.
pub struct GlobalHeapAllocator {
  heap: Mutex<Option<Heap>>,
}

impl GlobalHeapAllocator {
  /// Creates an allocator with no heap yet; the first real allocation
  /// request lazily initializes it. Constant so it can back a `static`.
  pub const fn new() -> Self {
    Self {
      heap: Mutex::new(None),
    }
  }
}

impl Default for GlobalHeapAllocator {
  fn default() -> Self {
    Self::new()
  }
}

unsafe impl GlobalAlloc for GlobalHeapAllocator {
  unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
    if layout.align() > DSIZE {
      return ptr::null_mut();
    }
    let mut guard = self.heap.lock().unwrap_or_else(|p| p.into_inner());
    let heap = guard.get_or_insert_with(Heap::new);
    heap.allocate(layout.size())
  }

  unsafe fn dealloc(&self, ptr: *mut u8, _layout: Layout) {
    let mut guard = self.heap.lock().unwrap_or_else(|p| p.into_inner());
    if let Some(heap) = guard.as_mut() {
      heap.release(ptr);
    }
  }

  unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
    if layout.align() > DSIZE {
      return ptr::null_mut();
    }
    let mut guard = self.heap.lock().unwrap_or_else(|p| p.into_inner());
    let heap = guard.get_or_insert_with(Heap::new);
    heap.reallocate(ptr, new_size)
  }

  unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
    if layout.align() > DSIZE {
      return ptr::null_mut();
    }
    let mut guard = self.heap.lock().unwrap_or_else(|p| p.into_inner());
    let heap = guard.get_or_insert_with(Heap::new);
    heap.zero_allocate(1, layout.size())
  }
}
