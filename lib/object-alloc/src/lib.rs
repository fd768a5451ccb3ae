// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Allocation policies for kernel objects.
//!
//! Kernel objects never reach for a global allocator directly. Whoever builds
//! the system picks an [`Allocator`] and every resource the system
//! manufactures is placed through it, in an [`ObjectBox`]. This is what lets
//! a build with no heap at all place its objects in a static [`Arena`]
//! without changing any call site.
//!
//! Allocation failure is an ordinary outcome here, not a panic: `allocate`
//! returns `None` and [`ObjectBox::try_new_in`] hands the value back.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

mod arena;
mod boxed;
mod heap;

pub use arena::Arena;
pub use boxed::ObjectBox;
pub use heap::Heap;

use core::ptr::NonNull;

/// Alignment of every block an [`Allocator`] hands out. Objects aligned more
/// strictly than this cannot be placed.
pub const MAX_ALIGN: usize = 16;

/// A source of raw memory blocks.
///
/// Implementations are shared between tasks and interrupt handlers, hence
/// `Sync`.
pub trait Allocator: Sync {
    /// Returns a block of at least `size` bytes aligned to [`MAX_ALIGN`], or
    /// `None` if the policy is exhausted.
    fn allocate(&self, size: usize) -> Option<NonNull<u8>>;

    /// Releases a block. A null `ptr` is ignored.
    ///
    /// # Safety
    ///
    /// `ptr` must be null or a block returned by `allocate` on this same
    /// allocator that has not already been freed.
    unsafe fn free(&self, ptr: *mut u8);
}

/// The policy used when a system is built without naming one.
pub static HEAP: Heap = Heap;

#[inline(always)]
const fn round_up(size: usize) -> Option<usize> {
    match size.checked_add(MAX_ALIGN - 1) {
        Some(s) => Some(s & !(MAX_ALIGN - 1)),
        None => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounding() {
        assert_eq!(round_up(0), Some(0));
        assert_eq!(round_up(1), Some(MAX_ALIGN));
        assert_eq!(round_up(MAX_ALIGN), Some(MAX_ALIGN));
        assert_eq!(round_up(MAX_ALIGN + 1), Some(2 * MAX_ALIGN));
        assert_eq!(round_up(usize::MAX), None);
    }
}
