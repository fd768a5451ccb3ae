// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::{Allocator, MAX_ALIGN};
use core::fmt;
use core::marker::PhantomData;
use core::mem::{align_of, size_of};
use core::ops::{Deref, DerefMut};
use core::ptr::NonNull;

/// Owning pointer to a `T` placed through an [`Allocator`].
///
/// Dropping the box drops the value and then returns its block to the
/// allocator it came from, exactly once.
pub struct ObjectBox<T> {
    ptr: NonNull<T>,
    alloc: &'static dyn Allocator,
    _owns: PhantomData<T>,
}

impl<T> ObjectBox<T> {
    /// Moves `value` into a block from `alloc`.
    ///
    /// If the allocator is exhausted, or `T` needs more alignment than
    /// allocators provide, `value` is handed back unchanged.
    pub fn try_new_in(value: T, alloc: &'static dyn Allocator) -> Result<Self, T> {
        if align_of::<T>() > MAX_ALIGN {
            return Err(value);
        }
        let ptr = if size_of::<T>() == 0 {
            NonNull::dangling()
        } else {
            match alloc.allocate(size_of::<T>()) {
                Some(p) => p.cast::<T>(),
                None => return Err(value),
            }
        };
        // Safety: ptr is either dangling for a ZST, which is a valid place to
        // write one, or a fresh block of at least size_of::<T>() bytes with
        // sufficient alignment.
        unsafe { ptr.as_ptr().write(value) };
        Ok(Self {
            ptr,
            alloc,
            _owns: PhantomData,
        })
    }

    /// The allocator this box will return its block to.
    pub fn allocator(this: &Self) -> &'static dyn Allocator {
        this.alloc
    }
}

impl<T> Deref for ObjectBox<T> {
    type Target = T;

    fn deref(&self) -> &T {
        // Safety: ptr holds an initialized T for as long as the box lives.
        unsafe { self.ptr.as_ref() }
    }
}

impl<T> DerefMut for ObjectBox<T> {
    fn deref_mut(&mut self) -> &mut T {
        // Safety: as for deref, and we hold the only reference.
        unsafe { self.ptr.as_mut() }
    }
}

impl<T> Drop for ObjectBox<T> {
    fn drop(&mut self) {
        // Safety: the value is initialized and is dropped only here; the
        // block came from self.alloc and is freed only here.
        unsafe {
            core::ptr::drop_in_place(self.ptr.as_ptr());
            if size_of::<T>() != 0 {
                self.alloc.free(self.ptr.as_ptr().cast());
            }
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for ObjectBox<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&**self, f)
    }
}

// Safety: ObjectBox owns its T, like Box; allocators are Sync.
unsafe impl<T: Send> Send for ObjectBox<T> {}
unsafe impl<T: Sync> Sync for ObjectBox<T> {}
