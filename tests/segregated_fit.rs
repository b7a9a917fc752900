//! Integration tests exercising the public API end to end: reuse,
//! coalescing, heap growth, reallocation, and provider exhaustion. These
//! use only what a downstream user of `seglloc` could reach: `Heap`,
//! `check_heap`, and the `MockProvider`/`PageProvider` test seam.

use seglloc::{Heap, MockProvider};

fn heap_with_capacity(bytes: usize) -> Heap {
    Heap::try_with_provider(Box::new(MockProvider::new(bytes)), 256).unwrap()
}

/// After every operation in a scripted sequence, the heap's own
/// consistency invariants (checked via `check_heap`) must hold.
fn assert_consistent(heap: &Heap) {
    if let Err(e) = heap.check_heap() {
        panic!("heap invariant violated: {e}");
    }
}

#[test]
fn reuse_after_release() {
    let mut heap = heap_with_capacity(1 << 16);
    let a = heap.allocate(24);
    assert_consistent(&heap);
    let b = heap.allocate(24);
    assert_consistent(&heap);
    heap.release(a);
    assert_consistent(&heap);
    let c = heap.allocate(24);
    assert_consistent(&heap);

    assert_eq!(a, c);
    assert_ne!(b, std::ptr::null_mut());
}

#[test]
fn adjacent_blocks_coalesce_into_one_list_entry() {
    let mut heap = heap_with_capacity(1 << 16);
    let a = heap.allocate(100);
    let b = heap.allocate(100);
    heap.release(a);
    assert_consistent(&heap);
    heap.release(b);
    assert_consistent(&heap);
}

#[test]
fn tight_allocate_release_loop_never_extends_heap() {
    let mut heap = heap_with_capacity(1 << 16);
    let hi_before = heap.hi();
    let mut prev = heap.allocate(16);
    assert_consistent(&heap);
    for _ in 0..1000 {
        let next = heap.allocate(16);
        heap.release(prev);
        prev = next;
        assert_consistent(&heap);
    }
    assert_eq!(heap.hi(), hi_before);
}

#[test]
fn three_blocks_freed_out_of_order_merge_into_one() {
    let mut heap = heap_with_capacity(1 << 16);
    let a = heap.allocate(128);
    let b = heap.allocate(128);
    let c = heap.allocate(128);
    heap.release(a);
    assert_consistent(&heap);
    heap.release(c);
    assert_consistent(&heap);
    heap.release(b);
    assert_consistent(&heap);
}

#[test]
fn reallocate_preserves_prefix_bytes() {
    let mut heap = heap_with_capacity(1 << 16);
    let p = heap.allocate(32);
    let pattern: Vec<u8> = (0..32u8).collect();
    unsafe { std::ptr::copy_nonoverlapping(pattern.as_ptr(), p, 32) };

    let q = heap.reallocate(p, 128);
    assert!(!q.is_null());
    assert_consistent(&heap);

    let mut out = [0u8; 32];
    unsafe { std::ptr::copy_nonoverlapping(q, out.as_mut_ptr(), 32) };
    assert_eq!(&out[..], &pattern[..]);
}

#[test]
fn provider_exhaustion_is_recoverable() {
    let provider = MockProvider::new(4096).fail_after(2);
    let mut heap = Heap::try_with_provider(Box::new(provider), 256).unwrap();

    let mut saw_null = false;
    let mut live = Vec::new();
    for _ in 0..256 {
        let p = heap.allocate(64);
        if p.is_null() {
            saw_null = true;
            break;
        }
        live.push(p);
        assert_consistent(&heap);
    }
    assert!(saw_null, "expected provider exhaustion to surface as NULL");

    for p in live {
        heap.release(p);
    }
    assert_consistent(&heap);
}

/// P3: every returned pointer is 8-byte aligned and lies within [lo, hi).
#[test]
fn returned_pointers_are_aligned_and_in_range() {
    let mut heap = heap_with_capacity(1 << 16);
    let sizes = [1, 7, 8, 9, 16, 17, 63, 64, 65, 111, 112, 113, 119, 120, 500, 4096];
    for &size in &sizes {
        let p = heap.allocate(size);
        assert!(!p.is_null());
        assert_eq!((p as usize) % 8, 0, "pointer for size {size} is misaligned");
        assert!((p as usize) >= (heap.lo() as usize));
        assert!((p as usize) < (heap.hi() as usize));
    }
    assert_consistent(&heap);
}

/// P5: releasing everything that was allocated returns the heap to an
/// invariant-satisfying state, even though coalescing may have changed the
/// exact block boundaries along the way.
#[test]
fn release_everything_restores_consistency() {
    let mut heap = heap_with_capacity(1 << 16);
    let sizes = [8, 16, 33, 64, 100, 200, 500, 1, 4096, 13, 112, 120];
    let mut live = Vec::new();
    for &s in &sizes {
        let p = heap.allocate(s);
        assert!(!p.is_null());
        live.push(p);
    }
    assert_consistent(&heap);
    for p in live.into_iter().rev() {
        heap.release(p);
        assert_consistent(&heap);
    }
}

/// Sizes that straddle the singleton classes (exactly 64, exactly 112, and
/// values in between that must skip both) all still round-trip correctly.
#[test]
fn singleton_class_boundary_sizes_round_trip() {
    let mut heap = heap_with_capacity(1 << 16);
    for &size in &[40u8 as usize, 64, 90, 112, 119] {
        let p = heap.allocate(size);
        assert!(!p.is_null());
        unsafe { std::ptr::write_bytes(p, 0x5A, size) };
        heap.release(p);
        assert_consistent(&heap);
    }
}

#[test]
fn zero_allocate_returns_zeroed_memory() {
    let mut heap = heap_with_capacity(1 << 16);
    let p = heap.zero_allocate(16, 8);
    assert!(!p.is_null());
    let bytes = unsafe { std::slice::from_raw_parts(p, 128) };
    assert!(bytes.iter().all(|&b| b == 0));
    assert_consistent(&heap);
}
