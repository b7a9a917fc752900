//! Block layout and boundary-tag arithmetic.
//!
//! This module is pure address arithmetic: given a payload pointer it knows
//! how to find the header, the footer, and the physically adjacent blocks.
//! Nothing here touches the free lists or the page provider; it is the
//! vocabulary the rest of the crate is written in.
//!
//! ## Header/footer encoding
//!
//! Every block is preceded by a 4-byte header packing three fields into one
//! `u32`:
//!
//! ```text
//!   bits [31:3]  block size in bytes (always a multiple of 8)
//!   bit  2       prev-allocated: 1 if the physically-preceding block is allocated
//!   bit  1       reserved, always 0
//!   bit  0       allocated: 1 if this block is allocated
//! ```
//!
//! Free blocks carry an identical 4-byte footer at the tail of the block;
//! allocated blocks do not, eliding the footer on the allocated path is
//! the whole point of tracking `prev-allocated` in bit 2, since otherwise a
//! block could not tell whether the bytes immediately behind its own header
//! belong to a footer or to the preceding block's payload.

use std::mem;

/// Header/footer word size.
pub const WSIZE: usize = 4;
/// Double-word size; the heap's payload alignment.
pub const DSIZE: usize = 8;
/// Default heap-extension granularity.
pub const CHUNK: usize = 4096;
/// Smallest valid block: header + one link word + footer, aligned.
pub const MIN_BLOCK: usize = 16;
/// Request size at or above which `place` tail-splits instead of head-splits.
pub const SPLIT_THRESHOLD: usize = 120;

/// Rounds `n` up to the next multiple of `align` (`align` must be a power of two).
#[inline]
pub const fn align_up(n: usize, align: usize) -> usize {
  (n + align - 1) & !(align - 1)
}

/// Packs a size and the two status bits into a header/footer word.
///
/// `size` must already be a multiple of 8; its low 3 bits are assumed zero
/// and are simply OR'd with the flag bits.
#[inline]
pub const fn pack(size: usize, prev_allocated: bool, allocated: bool) -> u32 {
  size as u32 | ((prev_allocated as u32) << 2) | (allocated as u32)
}

/// Extracts the size field from a header/footer word.
#[inline]
pub const fn unpack_size(word: u32) -> usize {
  (word & !0x7) as usize
}

/// Extracts the `allocated` bit.
#[inline]
pub const fn is_allocated(word: u32) -> bool {
  word & 0x1 != 0
}

/// Extracts the `prev-allocated` bit.
#[inline]
pub const fn is_prev_allocated(word: u32) -> bool {
  word & 0x4 != 0
}

/// Returns whether `n` is double-word aligned.
#[inline]
pub fn is_aligned(n: usize) -> bool {
  n % DSIZE == 0
}

/// Address of the header word for payload pointer `bp`.
///
/// # Safety
/// `bp` must point at least `WSIZE` bytes into a region the caller owns.
#[inline]
pub unsafe fn header_ptr(bp: *mut u8) -> *mut u32 {
  unsafe { bp.sub(WSIZE) as *mut u32 }
}

/// Address of the footer word for a block at `bp` with stored size `size`.
///
/// Only meaningful for free blocks (allocated blocks carry no footer).
///
/// # Safety
/// `bp .. bp + size` must be a valid block region.
#[inline]
pub unsafe fn footer_ptr(bp: *mut u8, size: usize) -> *mut u32 {
  unsafe { bp.add(size - DSIZE) as *mut u32 }
}

/// Reads the header word at `bp`.
///
/// # Safety
/// See [`header_ptr`].
#[inline]
pub unsafe fn read_header(bp: *mut u8) -> u32 {
  unsafe { header_ptr(bp).read() }
}

/// Writes the header word at `bp`.
///
/// # Safety
/// See [`header_ptr`].
#[inline]
pub unsafe fn write_header(bp: *mut u8, word: u32) {
  unsafe { header_ptr(bp).write(word) }
}

/// Reads the footer word of the block at `bp` whose stored size is `size`.
///
/// # Safety
/// See [`footer_ptr`]; additionally the block must actually carry a footer
/// (it must be free, allocated blocks must never have this called on them).
#[inline]
pub unsafe fn read_footer(bp: *mut u8, size: usize) -> u32 {
  unsafe { footer_ptr(bp, size).read() }
}

/// Writes the footer word of the block at `bp` whose stored size is `size`.
///
/// # Safety
/// See [`read_footer`].
#[inline]
pub unsafe fn write_footer(bp: *mut u8, size: usize, word: u32) {
  unsafe { footer_ptr(bp, size).write(word) }
}

/// Payload pointer of the block physically following the block at `bp`
/// (stored size `size`).
///
/// # Safety
/// `bp + size` must be a valid header address (always true for any block
/// that is not the epilogue, since the epilogue never has a "next").
#[inline]
pub unsafe fn next_block(bp: *mut u8, size: usize) -> *mut u8 {
  unsafe { bp.add(size) }
}

/// Payload pointer of the block physically preceding the block at `bp`.
///
/// # Safety
/// Only valid when the preceding block is free and therefore carries a
/// footer at `bp - DSIZE`; callers must gate this on the block's own
/// `prev-allocated` bit before calling.
#[inline]
pub unsafe fn prev_block(bp: *mut u8) -> *mut u8 {
  unsafe {
    let prev_footer = (bp.sub(DSIZE) as *mut u32).read();
    bp.sub(unpack_size(prev_footer))
  }
}

/// Rounds a user-requested allocation of `header_overhead` bytes described
/// by `mem::size_of::<T>()`-style overhead into a block size; kept as a
/// thin wrapper so call sites read like the size-class arithmetic in
/// `free_list.rs` rather than open-coding `align_up` everywhere.
#[inline]
pub fn block_size_for_request(size: usize) -> usize {
  if size <= DSIZE {
    2 * DSIZE
  } else {
    align_up(WSIZE + size, DSIZE)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn align_up_rounds_to_word_boundary() {
    assert_eq!(align_up(13, mem::size_of::<usize>()), 16);
    assert_eq!(align_up(16, mem::size_of::<usize>()), 16);
    assert_eq!(align_up(1, 8), 8);
    assert_eq!(align_up(0, 8), 0);
  }

  #[test]
  fn pack_and_unpack_roundtrip() {
    let word = pack(256, true, false);
    assert_eq!(unpack_size(word), 256);
    assert!(is_prev_allocated(word));
    assert!(!is_allocated(word));

    let word = pack(32, false, true);
    assert_eq!(unpack_size(word), 32);
    assert!(!is_prev_allocated(word));
    assert!(is_allocated(word));
  }

  #[test]
  fn block_size_for_request_matches_spec_rounding() {
    assert_eq!(block_size_for_request(1), 16);
    assert_eq!(block_size_for_request(8), 16);
    assert_eq!(block_size_for_request(9), 24);
    assert_eq!(block_size_for_request(24), 32);
  }
}
