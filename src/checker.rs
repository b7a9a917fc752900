//! Read-only heap auditor.
//!
//! Walks every block from the prologue to the epilogue and every free
//! list, checking that block layout, free-list membership, and the
//! epilogue sentinel are all mutually consistent. This never runs on
//! the hot path; callers opt in, typically from tests or from an
//! interactive debugging session, a diagnostic helper rather than an
//! automatic guard.

use std::fmt;

use crate::heap::Heap;
use crate::tag::{self, DSIZE, MIN_BLOCK, is_allocated, is_prev_allocated, unpack_size};

/// A violated heap invariant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckError {
  /// A block address isn't double-word aligned.
  Unaligned { block: *mut u8 },
  /// A block's stored size isn't a multiple of 8, or is below the
  /// 16-byte minimum (the epilogue's size-0 is exempted).
  BadBlockSize { block: *mut u8, size: usize },
  /// A free block's header and footer disagree.
  HeaderFooterMismatch { block: *mut u8 },
  /// A block's `prev-allocated` bit disagrees with the actual
  /// allocation state of the physically preceding block.
  PrevAllocBitWrong { block: *mut u8 },
  /// Two physically adjacent blocks are both free.
  AdjacentFreeBlocks { first: *mut u8, second: *mut u8 },
  /// A block linked into a free list is not actually free.
  ListMemberNotFree { block: *mut u8 },
  /// A block is linked into a list whose class doesn't admit its size.
  ListMemberWrongClass {
    block: *mut u8,
    size: usize,
    class: usize,
  },
  /// A list member's address falls outside `[lo, hi)`.
  ListMemberOutOfHeap { block: *mut u8 },
  /// The number of free blocks seen walking the heap doesn't match the
  /// number seen walking the lists.
  FreeCountMismatch { walked: usize, listed: usize },
  /// The epilogue isn't a zero-sized allocated sentinel, or its
  /// `prev-allocated` bit doesn't reflect the last real block.
  EpilogueInvalid { block: *mut u8 },
}

impl fmt::Display for CheckError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      CheckError::Unaligned { block } => {
        write!(f, "block at {block:p} is not double-word aligned")
      }
      CheckError::BadBlockSize { block, size } => {
        write!(f, "block at {block:p} has invalid size {size}")
      }
      CheckError::HeaderFooterMismatch { block } => {
        write!(f, "block at {block:p} has mismatched header/footer")
      }
      CheckError::PrevAllocBitWrong { block } => {
        write!(
          f,
          "block at {block:p} has a prev-allocated bit inconsistent \
                     with its preceding block's actual state"
        )
      }
      CheckError::AdjacentFreeBlocks { first, second } => {
        write!(f, "blocks at {first:p} and {second:p} are both free")
      }
      CheckError::ListMemberNotFree { block } => {
        write!(f, "free list contains allocated block at {block:p}")
      }
      CheckError::ListMemberWrongClass {
        block,
        size,
        class,
      } => {
        write!(
          f,
          "block at {block:p} of size {size} is in class {class}, \
                     which does not admit that size"
        )
      }
      CheckError::ListMemberOutOfHeap { block } => {
        write!(f, "free list contains block at {block:p}, outside the heap")
      }
      CheckError::FreeCountMismatch { walked, listed } => {
        write!(
          f,
          "heap walk found {walked} free blocks but the lists hold {listed}"
        )
      }
      CheckError::EpilogueInvalid { block } => {
        write!(f, "epilogue at {block:p} is malformed")
      }
    }
  }
}

impl std::error::Error for CheckError {}

impl Heap {
  /// Walks the whole heap and every free list, checking block layout,
  /// free-list membership, and the epilogue sentinel. Returns the
  /// first violation found, if any.
  pub fn check_heap(&self) -> Result<(), CheckError> {
    let mut bp = self.heap_start();
    let mut walked_free = 0usize;
    let mut prev_was_free = false;
    let mut prev_bp: *mut u8 = std::ptr::null_mut();

    loop {
      let word = unsafe { tag::read_header(bp) };
      let size = unpack_size(word);
      let allocated = is_allocated(word);

      if (bp as usize) % DSIZE != 0 {
        return Err(CheckError::Unaligned { block: bp });
      }

      if size == 0 {
        // Epilogue: zero-sized, allocated, prev-allocated bit
        // must equal the last real block's allocation state.
        if !allocated {
          return Err(CheckError::EpilogueInvalid { block: bp });
        }
        if is_prev_allocated(word) != !prev_was_free {
          return Err(CheckError::EpilogueInvalid { block: bp });
        }
        break;
      }

      if size < MIN_BLOCK || size % DSIZE != 0 {
        return Err(CheckError::BadBlockSize { block: bp, size });
      }

      if bp != self.heap_start() && is_prev_allocated(word) == prev_was_free {
        return Err(CheckError::PrevAllocBitWrong { block: bp });
      }

      if !allocated {
        let footer = unsafe { tag::read_footer(bp, size) };
        if footer != word {
          return Err(CheckError::HeaderFooterMismatch { block: bp });
        }
        if prev_was_free {
          return Err(CheckError::AdjacentFreeBlocks {
            first: prev_bp,
            second: bp,
          });
        }
        walked_free += 1;
      }

      prev_was_free = !allocated;
      prev_bp = bp;
      bp = unsafe { tag::next_block(bp, size) };
    }

    let mut listed_free = 0usize;
    for class in 0..crate::free_list::NUM_CLASSES {
      for member in self.lists().iter_class(class) {
        if (member as usize) < (self.lo() as usize) || (member as usize) >= (self.hi() as usize) {
          return Err(CheckError::ListMemberOutOfHeap { block: member });
        }
        let member_word = unsafe { tag::read_header(member) };
        if is_allocated(member_word) {
          return Err(CheckError::ListMemberNotFree { block: member });
        }
        let member_size = unpack_size(member_word);
        if crate::free_list::class_of(member_size) != class {
          return Err(CheckError::ListMemberWrongClass {
            block: member,
            size: member_size,
            class,
          });
        }
        listed_free += 1;
      }
    }

    if walked_free != listed_free {
      return Err(CheckError::FreeCountMismatch {
        walked: walked_free,
        listed: listed_free,
      });
    }

    Ok(())
  }

  /// Convenience wrapper that panics with a descriptive message on the
  /// first invariant violation found.
  pub fn audit(&self) {
    if let Err(e) = self.check_heap() {
      panic!("heap invariant violated: {e}");
    }
  }

  /// Prints a human-readable walk of every block and every free list,
  /// for interactive debugging.
  pub fn dump(&self) {
    println!("heap [{:p}, {:p})", self.lo(), self.hi());
    let mut bp = self.heap_start();
    loop {
      let word = unsafe { tag::read_header(bp) };
      let size = unpack_size(word);
      let allocated = is_allocated(word);
      if size == 0 {
        println!("  {bp:p} epilogue");
        break;
      }
      println!(
        "  {bp:p} size={size} {}",
        if allocated { "allocated" } else { "free" }
      );
      bp = unsafe { tag::next_block(bp, size) };
    }
    for class in 0..crate::free_list::NUM_CLASSES {
      let members: Vec<_> = self.lists().iter_class(class).collect();
      if !members.is_empty() {
        println!("  class {class}: {} block(s)", members.len());
      }
    }
  }
}
