//! Segregated free-list index.
//!
//! Fifteen LIFO singly-linked lists, one per size class. The link word for
//! a free block lives in the first 8 bytes of its own payload (there is no
//! back-link; removal walks from the list head).

/// Inclusive upper bound (in bytes) for each of the fifteen size classes.
/// The final entry catches everything larger than class 14's bound.
pub const CLASS_BOUNDS: [usize; 15] = [
  12, 16, 20, 64, 112, 120, 256, 448, 512, 1024, 2048, 3072, 4096, 8192, usize::MAX,
];

/// Classes 4 and 5 (indices 3 and 4) admit a block only when its size is
/// *exactly* the class bound; every other class admits any size up to its
/// bound. This asymmetry is intentional, kept rather than "fixed" into a
/// uniform `<=` ladder.
const SINGLETON: [bool; 15] = [
  false, false, false, true, true, false, false, false, false, false, false, false, false, false,
  false,
];

pub const NUM_CLASSES: usize = CLASS_BOUNDS.len();

/// Returns the index (0-based) of the size class that a block of `size`
/// bytes must live in.
///
/// Walks the classes in ascending order and returns the first one whose
/// admission test passes. Because the bounds are ascending, this is
/// equivalent to "the smallest class whose bound is `>= size`", except
/// that a singleton class is skipped entirely unless `size` equals its
/// bound exactly, so a request of, say, 40 bytes skips both the 64-byte
/// and 112-byte singleton classes and lands in class 6 (bound 120), even
/// though a 64-byte free block would satisfy it just fine. This is a
/// known fragmentation hazard, kept intentionally rather than patched.
pub fn class_of(size: usize) -> usize {
  for (i, &bound) in CLASS_BOUNDS.iter().enumerate() {
    if SINGLETON[i] {
      if size == bound {
        return i;
      }
    } else if size <= bound {
      return i;
    }
  }
  unreachable!("class 15's bound is usize::MAX and is not a singleton")
}

/// The fifteen list heads. Each head is a payload pointer or null.
pub struct FreeLists {
  heads: [*mut u8; NUM_CLASSES],
}

impl FreeLists {
  pub fn new() -> Self {
    Self {
      heads: [std::ptr::null_mut(); NUM_CLASSES],
    }
  }

  /// Prepends `bp` to the list for the class that `size` belongs to.
  ///
  /// `size` must be the exact size the block was stored with, singleton
  /// classes are admitted by equality, so inserting with a rounded or
  /// stale size silently corrupts the index.
  ///
  /// # Safety
  /// `bp` must be a valid, currently-free block of `size` bytes not
  /// already present in any list.
  pub unsafe fn insert(&mut self, bp: *mut u8, size: usize) {
    let class = class_of(size);
    unsafe {
      (bp as *mut *mut u8).write(self.heads[class]);
    }
    self.heads[class] = bp;
  }

  /// Removes `bp` from the list for the class that `size` belongs to.
  ///
  /// `size` must be the block's current (pre-mutation) size, matching the
  /// size it was inserted with.
  ///
  /// # Safety
  /// `bp` must currently be present in that class's list. Removing a
  /// block that isn't there is undefined behavior in the design (spec
  /// section 4.2's error condition), this walks off into whatever the link
  /// word happens to contain.
  pub unsafe fn remove(&mut self, bp: *mut u8, size: usize) {
    let class = class_of(size);
    let next = unsafe { (bp as *mut *mut u8).read() };

    if self.heads[class] == bp {
      self.heads[class] = next;
      return;
    }

    let mut cursor = self.heads[class];
    while !cursor.is_null() {
      let cursor_next = unsafe { (cursor as *mut *mut u8).read() };
      if cursor_next == bp {
        unsafe {
          (cursor as *mut *mut u8).write(next);
        }
        return;
      }
      cursor = cursor_next;
    }
  }

  /// Iterates the payload pointers currently linked in class `class`.
  pub fn iter_class(&self, class: usize) -> ListIter {
    ListIter {
      cursor: self.heads[class],
    }
  }

  /// Total number of blocks across all fifteen lists.
  pub fn count(&self) -> usize {
    (0..NUM_CLASSES).map(|c| self.iter_class(c).count()).sum()
  }

  pub fn heads(&self) -> &[*mut u8; NUM_CLASSES] {
    &self.heads
  }
}

impl Default for FreeLists {
  fn default() -> Self {
    Self::new()
  }
}

/// Walks one class's singly-linked list.
pub struct ListIter {
  cursor: *mut u8,
}

impl Iterator for ListIter {
  type Item = *mut u8;

  fn next(&mut self) -> Option<*mut u8> {
    if self.cursor.is_null() {
      return None;
    }
    let current = self.cursor;
    self.cursor = unsafe { (current as *mut *mut u8).read() };
    Some(current)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn class_of_matches_bounds() {
    assert_eq!(class_of(1), 0);
    assert_eq!(class_of(12), 0);
    assert_eq!(class_of(13), 1);
    assert_eq!(class_of(20), 2);
    assert_eq!(class_of(64), 3);
    assert_eq!(class_of(112), 4);
    assert_eq!(class_of(8192), 13);
    assert_eq!(class_of(8193), 14);
  }

  #[test]
  fn singleton_classes_skip_non_exact_sizes() {
    // 40 bytes doesn't match either singleton bound, so it falls
    // through to class 6 (bound 120) rather than landing in class 4.
    assert_eq!(class_of(40), 5);
    // An exact match does land in the singleton class.
    assert_eq!(class_of(64), 3);
    assert_eq!(class_of(112), 4);
  }

  #[test]
  fn insert_then_remove_empties_list() {
    let mut buf = vec![0u8; 64];
    let bp = buf.as_mut_ptr();
    let mut lists = FreeLists::new();
    unsafe {
      lists.insert(bp, 32);
    }
    assert_eq!(lists.iter_class(class_of(32)).count(), 1);
    unsafe {
      lists.remove(bp, 32);
    }
    assert_eq!(lists.iter_class(class_of(32)).count(), 0);
  }

  #[test]
  fn lifo_order_is_preserved() {
    let mut a = vec![0u8; 64];
    let mut b = vec![0u8; 64];
    let mut lists = FreeLists::new();
    unsafe {
      lists.insert(a.as_mut_ptr(), 32);
      lists.insert(b.as_mut_ptr(), 32);
    }
    let class = class_of(32);
    let order: Vec<*mut u8> = lists.iter_class(class).collect();
    assert_eq!(order, vec![b.as_mut_ptr(), a.as_mut_ptr()]);
  }
}
