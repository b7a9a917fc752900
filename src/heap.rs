//! Heap lifecycle: bootstrap, extension, and the four-operation entry
//! surface (`allocate`/`release`/`reallocate`/`zero_allocate`), wired on
//! top of the block-tag arithmetic, the free-list index, and the
//! coalescer/placer in this same module.

use std::ptr;

use crate::free_list::FreeLists;
use crate::provider::{PageProvider, SbrkProvider};
use crate::tag::{
  self, CHUNK, DSIZE, MIN_BLOCK, SPLIT_THRESHOLD, WSIZE, is_allocated, is_prev_allocated, pack,
  unpack_size,
};

/// The allocator engine: one contiguous heap region, fifteen free lists,
/// and the page provider backing further growth.
///
/// `Heap` is a single-threaded core; it holds no lock of its own.
/// Concurrent access requires external synchronization, which is exactly
/// what [`crate::GlobalHeapAllocator`] supplies at the
/// `#[global_allocator]` seam rather than in here.
pub struct Heap {
  provider: Box<dyn PageProvider>,
  /// Payload pointer of the prologue block; the anchor for block walks.
  heap_start: *mut u8,
  lists: FreeLists,
  chunk: usize,
}

// SAFETY: a `Heap` has no interior aliasing beyond what its own API
// enforces (every raw pointer it touches lives inside the region owned by
// `provider`); it is only ever handed to another thread wrapped in a
// `Mutex`, which provides the single-logical-owner discipline a shared
// heap needs. `Heap` is still not `Sync`; only one thread may hold the
// lock and thus the `&mut Heap` at a time.
unsafe impl Send for Heap {}

impl Heap {
  /// Creates a heap backed by a real `sbrk`-based page provider, using
  /// the default chunk size. Panics if the provider cannot even supply
  /// the initial prologue/epilogue, that failure means the process is
  /// already out of address space.
  pub fn new() -> Self {
    Self::try_with_provider(Box::new(SbrkProvider::new()), CHUNK)
      .expect("page provider exhausted during heap initialization")
  }

  /// Like [`Heap::new`], but with a caller-chosen extension chunk size,
  /// mainly useful for tests that want to exercise extension logic
  /// without waiting on multi-megabyte `sbrk` calls.
  pub fn with_chunk_size(chunk: usize) -> Self {
    Self::try_with_provider(Box::new(SbrkProvider::new()), chunk)
      .expect("page provider exhausted during heap initialization")
  }

  /// Creates a heap over an arbitrary [`PageProvider`], returning `None`
  /// if the provider can't even supply the initial sentinel blocks.
  pub fn try_with_provider(mut provider: Box<dyn PageProvider>, chunk: usize) -> Option<Self> {
    // Four words: alignment pad, prologue header, prologue footer,
    // epilogue header.
    let base = provider.extend(4 * WSIZE)?;
    unsafe {
      // base[0] is alignment padding; left as-is (never read).
      let prologue = base.add(2 * WSIZE);
      tag::write_header(prologue, pack(DSIZE, true, true));
      tag::write_footer(prologue, DSIZE, pack(DSIZE, true, true));
      let epilogue = prologue.add(DSIZE);
      tag::write_header(epilogue, pack(0, true, true));

      let mut heap = Self {
        provider,
        heap_start: prologue,
        lists: FreeLists::new(),
        chunk,
      };
      heap.extend(chunk / WSIZE)?;
      Some(heap)
    }
  }

  /// Low end of the heap region (the provider's `lo()`), for pointer
  /// validation in the checker.
  pub fn lo(&self) -> *mut u8 {
    self.provider.lo()
  }

  /// High end of the heap region (the provider's `hi()`).
  pub fn hi(&self) -> *mut u8 {
    self.provider.hi()
  }

  /// Payload pointer of the prologue block; the start of a block walk.
  pub(crate) fn heap_start(&self) -> *mut u8 {
    self.heap_start
  }

  pub(crate) fn lists(&self) -> &FreeLists {
    &self.lists
  }

  /// Extends the heap by `words` words (rounded up to an even count to
  /// preserve double-word alignment), folding the new space in as a
  /// free block and coalescing it with a trailing free block if one
  /// exists. Returns the payload pointer of the resulting block.
  fn extend(&mut self, words: usize) -> Option<*mut u8> {
    let words = if words % 2 != 0 { words + 1 } else { words };
    let size = words * WSIZE;

    unsafe {
      // `sbrk`-style providers hand back the address the old
      // epilogue header occupied; the new block's payload begins
      // exactly there, since the epilogue had size 0.
      let bp = self.provider.extend(size)?;
      let old_epilogue = tag::read_header(bp);
      let prev_allocated = is_prev_allocated(old_epilogue);

      let word = pack(size, prev_allocated, false);
      tag::write_header(bp, word);
      tag::write_footer(bp, size, word);
      tag::write_header(tag::next_block(bp, size), pack(0, false, true));

      Some(self.coalesce(bp))
    }
  }

  /// Allocates `size` bytes, returning a payload pointer, or `NULL` on a
  /// zero-size request or provider exhaustion.
  pub fn allocate(&mut self, size: usize) -> *mut u8 {
    if size == 0 {
      return ptr::null_mut();
    }

    let asize = tag::block_size_for_request(size);

    if let Some(bp) = self.find_fit(asize) {
      return self.place(bp, asize);
    }

    let extend_size = asize.max(self.chunk);
    match self.extend(extend_size / WSIZE) {
      Some(bp) => self.place(bp, asize),
      None => ptr::null_mut(),
    }
  }

  /// Releases a previously-allocated pointer. `NULL` is a no-op.
  pub fn release(&mut self, ptr: *mut u8) {
    if ptr.is_null() {
      return;
    }

    unsafe {
      let header = tag::read_header(ptr);
      let size = unpack_size(header);
      let prev_allocated = is_prev_allocated(header);

      let word = pack(size, prev_allocated, false);
      tag::write_header(ptr, word);
      tag::write_footer(ptr, size, word);

      self.set_next_prev_allocated(ptr, size, false);
      self.coalesce(ptr);
    }
  }

  /// Resizes the allocation at `ptr` to `size` bytes:
  /// `size == 0` behaves as `release`; `ptr == NULL` behaves as
  /// `allocate`; otherwise a new block is allocated, the overlapping
  /// prefix copied, and the old block released. On allocation failure
  /// the original block is left untouched and `NULL` is returned.
  pub fn reallocate(&mut self, ptr: *mut u8, size: usize) -> *mut u8 {
    if size == 0 {
      self.release(ptr);
      return ptr::null_mut();
    }
    if ptr.is_null() {
      return self.allocate(size);
    }

    let new_ptr = self.allocate(size);
    if new_ptr.is_null() {
      return ptr::null_mut();
    }

    unsafe {
      let old_size = unpack_size(tag::read_header(ptr));
      let old_payload_size = old_size - WSIZE;
      let copy_size = size.min(old_payload_size);
      ptr::copy_nonoverlapping(ptr, new_ptr, copy_size);
    }

    self.release(ptr);
    new_ptr
  }

  /// Allocates space for `count` elements of `size` bytes each and
  /// zero-fills it. Zeroing happens only after a successful allocation,
  /// so a failed request never touches memory the caller doesn't own.
  pub fn zero_allocate(&mut self, count: usize, size: usize) -> *mut u8 {
    let total = count * size;
    let p = self.allocate(total);
    if !p.is_null() {
      unsafe { ptr::write_bytes(p, 0, total) };
    }
    p
  }

  /// First-fit search starting at the size class `asize` belongs to and
  /// cascading upward through class 15. See [`crate::free_list::class_of`]
  /// for why a single start-class walk covers every class the request
  /// could possibly fit in.
  fn find_fit(&self, asize: usize) -> Option<*mut u8> {
    let start = crate::free_list::class_of(asize);
    for class in start..crate::free_list::NUM_CLASSES {
      for bp in self.lists.iter_class(class) {
        let size = unsafe { unpack_size(tag::read_header(bp)) };
        if size >= asize {
          return Some(bp);
        }
      }
    }
    None
  }

  /// Commits an allocation of `asize` bytes within the free block `bp`,
  /// splitting off a residual free block when one of valid minimum size
  /// would remain.
  fn place(&mut self, bp: *mut u8, asize: usize) -> *mut u8 {
    unsafe {
      let header = tag::read_header(bp);
      let csize = unpack_size(header);
      let prev_allocated = is_prev_allocated(header);

      self.lists.remove(bp, csize);

      if csize - asize >= MIN_BLOCK {
        if asize < SPLIT_THRESHOLD {
          // Small allocation: head gets the allocation, tail the residual.
          tag::write_header(bp, pack(asize, prev_allocated, true));

          let residual = tag::next_block(bp, asize);
          let residual_size = csize - asize;
          let residual_word = pack(residual_size, true, false);
          tag::write_header(residual, residual_word);
          tag::write_footer(residual, residual_size, residual_word);
          self.lists.insert(residual, residual_size);

          bp
        } else {
          // Large allocation: head gets the residual, tail the allocation.
          let residual_size = csize - asize;
          let residual_word = pack(residual_size, prev_allocated, false);
          tag::write_header(bp, residual_word);
          tag::write_footer(bp, residual_size, residual_word);
          self.lists.insert(bp, residual_size);

          let alloc_bp = tag::next_block(bp, residual_size);
          tag::write_header(alloc_bp, pack(asize, false, true));
          self.set_next_prev_allocated(alloc_bp, asize, true);

          alloc_bp
        }
      } else {
        // No split: hand out the whole block.
        let word = pack(csize, prev_allocated, true);
        tag::write_header(bp, word);
        // Redundant footer write: logically unnecessary on an
        // allocated block (it carries no footer), but harmless.
        tag::write_footer(bp, csize, word);
        self.set_next_prev_allocated(bp, csize, true);
        bp
      }
    }
  }

  /// Boundary-tag coalescer: merges a newly-freed (or newly-extended)
  /// block at `bp` with whichever immediate physical neighbors are free,
  /// inserting the result into the appropriate free list. Returns the
  /// payload pointer of the (possibly merged) block.
  fn coalesce(&mut self, bp: *mut u8) -> *mut u8 {
    unsafe {
      let header = tag::read_header(bp);
      let size = unpack_size(header);
      let prev_allocated = is_prev_allocated(header);

      let next = tag::next_block(bp, size);
      let next_header = tag::read_header(next);
      let next_allocated = is_allocated(next_header);

      match (prev_allocated, next_allocated) {
        (true, true) => {
          self.lists.insert(bp, size);
          bp
        }
        (true, false) => {
          let next_size = unpack_size(next_header);
          self.lists.remove(next, next_size);

          let merged_size = size + next_size;
          let word = pack(merged_size, true, false);
          tag::write_header(bp, word);
          tag::write_footer(bp, merged_size, word);
          self.lists.insert(bp, merged_size);
          bp
        }
        (false, true) => {
          let prev = tag::prev_block(bp);
          let prev_size = unpack_size(tag::read_header(prev));
          self.lists.remove(prev, prev_size);

          let merged_size = prev_size + size;
          let word = pack(merged_size, true, false);
          tag::write_header(prev, word);
          tag::write_footer(prev, merged_size, word);
          self.lists.insert(prev, merged_size);
          prev
        }
        (false, false) => {
          let prev = tag::prev_block(bp);
          let prev_size = unpack_size(tag::read_header(prev));
          let next_size = unpack_size(next_header);
          self.lists.remove(prev, prev_size);
          self.lists.remove(next, next_size);

          let merged_size = prev_size + size + next_size;
          let word = pack(merged_size, true, false);
          tag::write_header(prev, word);
          tag::write_footer(prev, merged_size, word);
          self.lists.insert(prev, merged_size);
          prev
        }
      }
    }
  }

  /// Updates the `prev-allocated` bit of the block physically following
  /// `bp` (stored size `size`) to `value`, refreshing that block's footer
  /// too if it is currently free. Every mutation that toggles a block's
  /// own `allocated` state must call this; footer elision depends on the
  /// following block always having an accurate `prev-allocated` bit.
  ///
  /// # Safety
  /// `bp + size` must address a valid block header (true for every block
  /// including the epilogue, which this also correctly updates).
  unsafe fn set_next_prev_allocated(&mut self, bp: *mut u8, size: usize, value: bool) {
    unsafe {
      let next = tag::next_block(bp, size);
      let next_word = tag::read_header(next);
      let next_size = unpack_size(next_word);
      let next_allocated = is_allocated(next_word);

      let updated = pack(next_size, value, next_allocated);
      tag::write_header(next, updated);
      if !next_allocated {
        tag::write_footer(next, next_size, updated);
      }
    }
  }
}

impl Default for Heap {
  fn default() -> Self {
    Self::new()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::provider::MockProvider;

  fn test_heap() -> Heap {
    Heap::try_with_provider(Box::new(MockProvider::new(1 << 20)), 256).unwrap()
  }

  #[test]
  fn allocate_zero_returns_null() {
    let mut heap = test_heap();
    assert!(heap.allocate(0).is_null());
  }

  #[test]
  fn release_null_is_noop() {
    let mut heap = test_heap();
    heap.release(ptr::null_mut());
  }

  #[test]
  fn allocate_one_byte_yields_minimum_block() {
    let mut heap = test_heap();
    let p = heap.allocate(1);
    assert!(!p.is_null());
    let size = unsafe { unpack_size(tag::read_header(p)) };
    assert_eq!(size, MIN_BLOCK);
  }

  #[test]
  fn reallocate_null_behaves_as_allocate() {
    let mut heap = test_heap();
    let p = heap.reallocate(ptr::null_mut(), 40);
    assert!(!p.is_null());
  }

  #[test]
  fn reallocate_zero_behaves_as_release() {
    let mut heap = test_heap();
    let p = heap.allocate(40);
    let result = heap.reallocate(p, 0);
    assert!(result.is_null());
  }

  #[test]
  fn reuse_after_release_s1() {
    let mut heap = test_heap();
    let a = heap.allocate(24);
    let b = heap.allocate(24);
    heap.release(a);
    let c = heap.allocate(24);
    assert_eq!(a, c);
    let b_size = unsafe { unpack_size(tag::read_header(b)) };
    assert_eq!(b_size, tag::block_size_for_request(24));
  }

  #[test]
  fn adjacent_release_coalesces_s2() {
    let mut heap = test_heap();
    let a = heap.allocate(100);
    let b = heap.allocate(100);
    heap.release(a);
    heap.release(b);

    // exactly one free block spanning both, on exactly one list.
    let mut free_blocks = 0;
    for class in 0..crate::free_list::NUM_CLASSES {
      free_blocks += heap.lists.iter_class(class).count();
    }
    assert_eq!(free_blocks, 1);
  }

  #[test]
  fn tight_loop_does_not_grow_heap_s3() {
    let mut heap = test_heap();
    let hi_before_loop = heap.hi();
    let mut prev = heap.allocate(16);
    for _ in 0..1000 {
      let next = heap.allocate(16);
      heap.release(prev);
      prev = next;
    }
    assert_eq!(heap.hi(), hi_before_loop);
  }

  #[test]
  fn three_block_free_in_any_order_merges_s4() {
    let mut heap = test_heap();
    let a = heap.allocate(128);
    let b = heap.allocate(128);
    let c = heap.allocate(128);
    heap.release(a);
    heap.release(c);
    heap.release(b);

    let mut sizes = Vec::new();
    for class in 0..crate::free_list::NUM_CLASSES {
      for bp in heap.lists.iter_class(class) {
        sizes.push(unsafe { unpack_size(tag::read_header(bp)) });
      }
    }
    assert_eq!(sizes.len(), 1);
    assert!(sizes[0] >= 3 * tag::block_size_for_request(128));
  }

  #[test]
  fn reallocate_preserves_prefix_s5() {
    let mut heap = test_heap();
    let p = heap.allocate(32);
    let pattern: Vec<u8> = (0..32u8).collect();
    unsafe { ptr::copy_nonoverlapping(pattern.as_ptr(), p, 32) };

    let q = heap.reallocate(p, 128);
    assert!(!q.is_null());
    let mut out = [0u8; 32];
    unsafe { ptr::copy_nonoverlapping(q, out.as_mut_ptr(), 32) };
    assert_eq!(&out[..], &pattern[..]);
  }

  #[test]
  fn provider_exhaustion_returns_null_s6() {
    let provider = MockProvider::new(4096).fail_after(2);
    let mut heap = Heap::try_with_provider(Box::new(provider), 256).unwrap();
    loop {
      if heap.allocate(64).is_null() {
        break;
      }
    }
    // the heap is still usable: a subsequent release of a live pointer
    // must not panic.
    let p = heap.allocate(8);
    if !p.is_null() {
      heap.release(p);
    }
  }

  #[test]
  fn zero_allocate_zero_fills() {
    let mut heap = test_heap();
    let p = heap.zero_allocate(8, 4);
    assert!(!p.is_null());
    let bytes = unsafe { std::slice::from_raw_parts(p, 32) };
    assert!(bytes.iter().all(|&b| b == 0));
  }
}
