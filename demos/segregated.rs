use std::io::Read;

use libc::sbrk;
use seglloc::Heap;

/// Waits until the user presses ENTER.
/// Useful when you want to inspect memory state with tools like `pmap`, `htop`,
/// `gdb`, or just visually track how allocations change the program break.
fn block_until_enter_pressed() {
  println!("\n>>> Press ENTER to continue...");
  let _ = std::io::stdin().bytes().next();
}

/// Prints the current program break using `sbrk(0)`.
/// The program break is the upper boundary of the heap managed via brk/sbrk.
unsafe fn print_program_break(label: &str) {
  println!(
    "[{}] PID = {}, program break (sbrk(0)) = {:?}",
    label,
    std::process::id(),
    unsafe { sbrk(0) },
  );
}

fn main() {
  // Our allocator holds a page provider, the prologue/epilogue region,
  // and the fifteen segregated free-list heads. Unlike a bump allocator
  // it actually looks at released blocks again before asking `sbrk` for
  // more pages.
  let mut heap = Heap::new();

  unsafe {
    print_program_break("start");
    block_until_enter_pressed();

    // --------------------------------------------------------------
    // 1) Allocate 4 bytes (a u32's worth).
    // --------------------------------------------------------------
    let first_block = heap.allocate(4);
    println!("\n[1] Allocate 4 bytes");
    println!("[1] ptr = {first_block:?}");

    let first_ptr = first_block as *mut u32;
    first_ptr.write(0xDEADBEEF);
    println!("[1] Value written to first_block = 0x{:X}", first_ptr.read());

    block_until_enter_pressed();

    // --------------------------------------------------------------
    // 2) Allocate 12 bytes, an "odd-sized" request that still rounds
    //    up to a double-word multiple.
    // --------------------------------------------------------------
    let second_block = heap.allocate(12);
    println!("\n[2] Allocate 12 bytes");
    println!("[2] ptr = {second_block:?}");

    std::ptr::write_bytes(second_block, 0xAB, 12);
    println!("[2] Initialized second block with 0xAB");

    block_until_enter_pressed();

    // --------------------------------------------------------------
    // 3) Allocate 8 bytes (a u64's worth) and check alignment.
    // --------------------------------------------------------------
    let third_block = heap.allocate(8);
    println!("\n[3] Allocate 8 bytes (observe alignment)");
    println!("[3] ptr = {third_block:?}");

    let third_ptr = third_block as *mut u64;
    third_ptr.write(0x1122334455667788);
    println!("[3] Value written = 0x{:X}", third_ptr.read());

    let addr_third = third_block as usize;
    println!(
      "[3] Address = {:#X}, addr % 8 = {}",
      addr_third,
      addr_third % 8
    );

    block_until_enter_pressed();

    // --------------------------------------------------------------
    // 4) Allocate 32 bytes (a u16[16]'s worth).
    // --------------------------------------------------------------
    let fourth_block = heap.allocate(32);
    println!("\n[4] Allocate 32 bytes");
    println!("[4] ptr = {fourth_block:?}");

    let fourth_ptr = fourth_block as *mut u16;
    for i in 0..16 {
      fourth_ptr.add(i).write(i as u16);
    }
    println!("[4] Wrote 0..15 into the u16 array");

    block_until_enter_pressed();

    // --------------------------------------------------------------
    // 5) Release the first block. Its free-list insertion makes it a
    //    candidate for the very next matching allocation.
    // --------------------------------------------------------------
    heap.release(first_block);
    println!("\n[5] Released first_block at {first_block:?}");
    block_until_enter_pressed();

    // --------------------------------------------------------------
    // 6) Allocate a small block (2 bytes) to see if the free-list
    //    reuses the block we just released.
    // --------------------------------------------------------------
    let fifth_block = heap.allocate(2);
    println!("\n[6] Allocate 2 bytes (check reuse of released block)");
    println!("[6] ptr = {fifth_block:?}");

    println!(
      "[6] fifth_block == first_block? {}",
      if fifth_block == first_block {
        "yes, it reused the released block"
      } else {
        "no, it placed the request elsewhere"
      }
    );

    block_until_enter_pressed();

    // --------------------------------------------------------------
    // 7) Allocate a large block to observe heap growth.
    //    This usually changes the result of `sbrk(0)`.
    // --------------------------------------------------------------
    print_program_break("before large alloc");

    let big_block = heap.allocate(64 * 1024);
    println!("\n[7] Allocate a large 64 KiB block");
    println!("[7] ptr = {big_block:?}");

    print_program_break("after large alloc");
    block_until_enter_pressed();

    // --------------------------------------------------------------
    // 8) Release everything and confirm the heap's own invariants
    //    still hold.
    // --------------------------------------------------------------
    heap.release(second_block);
    heap.release(third_block);
    heap.release(fourth_block);
    heap.release(fifth_block);
    heap.release(big_block);

    match heap.check_heap() {
      Ok(()) => println!("\n[8] check_heap: all invariants hold"),
      Err(e) => println!("\n[8] check_heap: {e}"),
    }

    println!("[8] End of example. Process will exit and the OS will reclaim all memory.");
  }
}
