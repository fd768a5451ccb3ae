// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::{round_up, Allocator, MAX_ALIGN};
use core::cell::UnsafeCell;
use core::mem::MaybeUninit;
use core::ptr::NonNull;
use core::sync::atomic::{AtomicUsize, Ordering};

/// Bump allocator over `N` bytes of storage held in place.
///
/// Intended to sit in a `static` on systems without a heap. Blocks are carved
/// off the front in `MAX_ALIGN` multiples and never returned; `free` is a
/// no-op, so an arena suits objects that live as long as the system does.
pub struct Arena<const N: usize> {
    storage: Storage<N>,
    head: AtomicUsize,
}

#[repr(C, align(16))]
struct Storage<const N: usize>(UnsafeCell<[MaybeUninit<u8>; N]>);

const _: () = assert!(core::mem::align_of::<Storage<1>>() == MAX_ALIGN);

// Safety: the only shared mutable state is `head`, which is updated
// atomically; each successful allocation hands out a disjoint byte range of
// `storage`.
unsafe impl<const N: usize> Sync for Arena<N> {}

impl<const N: usize> Arena<N> {
    pub const fn new() -> Self {
        Self {
            storage: Storage(UnsafeCell::new([MaybeUninit::uninit(); N])),
            head: AtomicUsize::new(0),
        }
    }

    /// Bytes not yet handed out.
    pub fn remaining(&self) -> usize {
        N.saturating_sub(self.head.load(Ordering::Relaxed))
    }
}

impl<const N: usize> Default for Arena<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> Allocator for Arena<N> {
    fn allocate(&self, size: usize) -> Option<NonNull<u8>> {
        // Zero-byte requests still get a distinct block.
        let need = round_up(size.max(1))?;
        let start = self
            .head
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |head| {
                head.checked_add(need).filter(|&end| end <= N)
            })
            .ok()?;
        let base = self.storage.0.get().cast::<u8>();
        // Safety: start + need <= N, so the offset is within storage.
        NonNull::new(unsafe { base.add(start) })
    }

    unsafe fn free(&self, _ptr: *mut u8) {}
}
