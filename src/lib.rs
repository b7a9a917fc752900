//! # seglloc - a segregated-fit heap allocator
//!
//! This crate provides a **segregated free-list** allocator implementation
//! in Rust that manages memory using the `sbrk` system call.
//!
//! ## Overview
//!
//! Unlike a bump allocator, a segregated-fit allocator reuses freed memory:
//! free blocks are indexed into one of fifteen size classes, and an
//! allocation request searches the smallest admitting class (and upward)
//! before ever asking the OS for more pages.
//!
//! ```text
//!   Segregated Free Lists:
//!
//!   class 0  [<=12]    -> [free] -> [free]
//!   class 1  [<=16]    -> [free]
//!   class 2  [<=20]    -> (empty)
//!   ...
//!   class 14 [<=MAX]   -> [free] -> [free] -> [free]
//! ```
//!
//! Each block carries a packed header word (and, for free blocks, a
//! matching footer) instead of a separate metadata struct, so headers cost
//! a single word rather than a multi-field record:
//!
//! ```text
//!   Allocated block (footer elided):
//!   ┌──────────┬──────────────────────────────┐
//!   │  header  │           payload             │
//!   │ (1 word) │                                │
//!   └──────────┴──────────────────────────────┘
//!
//!   Free block (footer present, boundary tag):
//!   ┌──────────┬───────────────┬──────────┐
//!   │  header  │  free payload  │  footer  │
//!   │ (1 word) │  (link word)   │ (1 word) │
//!   └──────────┴───────────────┴──────────┘
//! ```
//!
//! ## Crate Structure
//!
//! ```text
//!   seglloc
//!   ├── tag        - header/footer bit packing and block-pointer arithmetic
//!   ├── free_list  - size-class index over the fifteen segregated lists
//!   ├── provider   - PageProvider trait (sbrk-backed and mock implementations)
//!   ├── heap       - the allocator engine: allocate/release/reallocate
//!   ├── checker    - heap-consistency auditor
//!   └── global     - GlobalAlloc adapter
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use seglloc::Heap;
//!
//! fn main() {
//!     let mut heap = Heap::new();
//!
//!     unsafe {
//!         let ptr = heap.allocate(64) as *mut u64;
//!         *ptr = 42;
//!         println!("Value: {}", *ptr);
//!         heap.release(ptr as *mut u8);
//!     }
//! }
//! ```
//!
//! Or install it as the process's global allocator:
//!
//! ```rust,ignore
//! use seglloc::GlobalHeapAllocator;
//!
//! #[global_allocator]
//! static ALLOCATOR: GlobalHeapAllocator = GlobalHeapAllocator::new();
//! ```
//!
//! ## How It Works
//!
//! Like the bump allocator this crate grew out of, the production page
//! provider uses `sbrk(2)` to extend the program's data segment. The
//! difference is what happens on release: rather than only ever moving a
//! pointer forward, a released block is coalesced with any free physical
//! neighbors and filed into the free-list index so a later allocation can
//! reuse it without touching `sbrk` again.
//!
//! ## Limitations
//!
//! - **Single-threaded core**: [`Heap`] itself has no internal locking;
//!   [`GlobalHeapAllocator`] supplies a `Mutex` at the adapter boundary.
//! - **8-byte alignment only**: requests whose `Layout` demands a coarser
//!   alignment are rejected with a null pointer.
//! - **Unix-only**: requires `libc` and `sbrk` (POSIX systems).
//!
//! ## Safety
//!
//! This crate is inherently unsafe as it deals with raw memory management.
//! All allocation and deallocation operations require `unsafe` blocks.

mod checker;
mod free_list;
mod global;
mod heap;
mod provider;
mod tag;

pub use checker::CheckError;
pub use free_list::{CLASS_BOUNDS, NUM_CLASSES, class_of};
pub use global::GlobalHeapAllocator;
pub use heap::Heap;
pub use provider::{MockProvider, PageProvider, SbrkProvider};
pub use tag::{CHUNK, DSIZE, MIN_BLOCK, SPLIT_THRESHOLD, WSIZE};
