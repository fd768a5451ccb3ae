// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::{Allocator, MAX_ALIGN};
use alloc::alloc::{alloc, dealloc, Layout};
use core::ptr::NonNull;

/// Places objects on the global heap.
///
/// `free` only receives a pointer, so each block is preceded by a header
/// recording its full size. The header is `MAX_ALIGN` bytes to keep the
/// payload aligned.
#[derive(Copy, Clone, Debug, Default)]
pub struct Heap;

const HEADER: usize = MAX_ALIGN;

impl Allocator for Heap {
    fn allocate(&self, size: usize) -> Option<NonNull<u8>> {
        let total = size.checked_add(HEADER)?;
        let layout = Layout::from_size_align(total, MAX_ALIGN).ok()?;
        // Safety: layout has a nonzero size because of the header.
        let base = NonNull::new(unsafe { alloc(layout) })?;
        // Safety: the block is at least HEADER bytes and MAX_ALIGN aligned,
        // which is enough to hold a usize at its base.
        unsafe {
            base.as_ptr().cast::<usize>().write(total);
            Some(NonNull::new_unchecked(base.as_ptr().add(HEADER)))
        }
    }

    unsafe fn free(&self, ptr: *mut u8) {
        if ptr.is_null() {
            return;
        }
        // Safety: per our contract ptr came from allocate above, so the
        // header sits HEADER bytes before it and holds a size that made a
        // valid layout.
        unsafe {
            let base = ptr.sub(HEADER);
            let total = base.cast::<usize>().read();
            let layout = Layout::from_size_align_unchecked(total, MAX_ALIGN);
            dealloc(base, layout);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocks_are_aligned_and_writable() {
        for size in [0, 1, 7, 16, 17, 100, 4096] {
            let p = Heap.allocate(size).unwrap();
            assert_eq!(p.as_ptr() as usize % MAX_ALIGN, 0);
            unsafe {
                core::ptr::write_bytes(p.as_ptr(), 0xA5, size);
                Heap.free(p.as_ptr());
            }
        }
    }

    #[test]
    fn null_free_is_ignored() {
        unsafe { Heap.free(core::ptr::null_mut()) };
    }

    #[test]
    fn absurd_request_fails_cleanly() {
        assert!(Heap.allocate(usize::MAX).is_none());
        assert!(Heap.allocate(usize::MAX - HEADER).is_none());
    }
}
