// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Kernel ABI definitions, shared between kernel and applications.
//!
//! Everything a resource in this system promises to its users lives here as
//! a trait: the kernel provides implementations, applications consume them
//! (and provide `Task`s in return). None of these interfaces can fail loudly.
//! Construction failure is recorded in a [`Constructed`] flag, and every
//! operation on an object whose flag is down degrades to a neutral value.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

use alloc::sync::Arc;
use serde::{Deserialize, Serialize};

/// Records whether an object finished construction successfully.
///
/// The flag starts out raised. Once lowered it stays lowered: `set(true)` on
/// a lowered flag is ignored. Cloning an object clones its flag; moving an
/// object's resources out with [`Constructed::take`] lowers the source.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Constructed(bool);

impl Constructed {
    pub const fn new() -> Self {
        Self(true)
    }

    #[inline(always)]
    pub const fn get(&self) -> bool {
        self.0
    }

    /// Records the outcome of a construction step. Only `true -> false`
    /// transitions take effect.
    #[inline(always)]
    pub fn set(&mut self, flag: bool) {
        if self.0 {
            self.0 = flag;
        }
    }

    /// Moves the flag out, leaving this one lowered.
    pub fn take(&mut self) -> Self {
        let moved = Self(self.0);
        self.0 = false;
        moved
    }
}

impl Default for Constructed {
    fn default() -> Self {
        Self::new()
    }
}

/// Common root of every resource.
pub trait Object {
    /// `true` once the object finished construction and has not been
    /// invalidated since.
    fn is_constructed(&self) -> bool;
}

/// Checks an optional object, treating a missing one as unconstructed.
pub fn is_constructed<T: Object + ?Sized>(obj: Option<&T>) -> bool {
    obj.is_some_and(|o| o.is_constructed())
}

/// Something the kernel can run: either a task proper, or a handler bound to
/// an interrupt source.
pub trait Task: Send + Sync {
    /// Runs the task's entry point. Returns 0 on success.
    fn start(&self) -> i32;

    /// Requested stack size in bytes, 0 for the platform default.
    fn stack_size(&self) -> usize {
        0
    }
}

/// Marker for resources manufactured by the system rather than by their
/// users.
pub trait SysResource: Object {}

/// Counting semaphore.
///
/// Every operation checks [`Object::is_constructed`] first. On an
/// unconstructed semaphore `acquire*` returns `false` without blocking,
/// `release*` does nothing, and the queries return `false`.
pub trait Semaphore: Object {
    /// Blocks until one permit is available and takes it.
    fn acquire(&self) -> bool;

    /// Blocks until `permits` are available at once and takes all of them.
    fn acquire_n(&self, permits: i32) -> bool;

    fn release(&self);

    fn release_n(&self, permits: i32);

    /// Whether waiters are granted permits in arrival order. Fixed at
    /// construction.
    fn is_fair(&self) -> bool;

    /// Whether at least one caller is currently parked in `acquire*`.
    fn is_blocked(&self) -> bool;
}

/// A semaphore manufactured by the system.
pub trait SysSemaphore: Semaphore + SysResource {}

impl<T: Semaphore + SysResource + ?Sized> SysSemaphore for T {}

/// A maskable event source.
pub trait Interrupt: Object {
    /// Masks the source, returning whether it was enabled beforehand.
    fn disable(&self) -> bool;

    /// Restores the mask state returned by an earlier `disable`.
    fn enable(&self, status: bool);

    /// Raises the source from software.
    fn jump(&self);
}

/// An interrupt source bound to a handler task.
pub trait CpuInterrupt: Interrupt {
    /// The architecture's register-save layout.
    type Registers;

    /// Binds `task` as the handler for hardware source `source`. Returns
    /// `false` if the source is invalid or already has a handler, or if this
    /// handle is already bound.
    fn set_handler(&self, task: Arc<dyn Task>, source: i32) -> bool;

    /// Unbinds the handler. Does nothing if nothing is bound.
    fn remove_handler(&self);

    /// Makes interrupt entry and exit on this binding use `registers`
    /// instead of the default save area, starting with the next entry or
    /// with the current exit when called from within the handler.
    ///
    /// # Safety
    ///
    /// `registers` is borrowed, not retained: it must stay valid until
    /// `restore_context` or `remove_handler` is called on this handle, or
    /// the handle is dropped, whichever comes first.
    unsafe fn set_context(&self, registers: &Self::Registers);

    /// Switches back to the default save area.
    fn restore_context(&self);
}

/// Hardware timer. Counts and periods are in microseconds.
pub trait Timer: Object {
    fn count(&self) -> i64;

    fn set_count(&self, count: i64);

    fn period(&self) -> i64;

    /// Sets the period; 0 selects the longest period the timer supports.
    fn set_period(&self, us: i64);

    fn start(&self);

    fn stop(&self);

    /// Hardware index of this timer, or -1 if it is not constructed.
    fn index(&self) -> i32;
}

/// CPU clock generator. Frequencies are in Hz.
pub trait CpuPll: Object {
    fn source_clock(&self) -> i64;

    fn cpu_clock(&self) -> i64;
}

/// Names a hardware interrupt source.
#[derive(
    Copy, Clone, Debug, Serialize, Deserialize, Hash, Eq, PartialEq, Ord, PartialOrd,
)]
#[repr(transparent)]
pub struct InterruptNum(pub u32);

impl InterruptNum {
    /// Converts a source identifier as applications pass it. Negative values
    /// never name a source.
    pub fn from_source(source: i32) -> Option<Self> {
        u32::try_from(source).ok().map(Self)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A kernel-detected misuse of a resource.
///
/// Public operations report these as `false` or as an unconstructed object;
/// the kernel uses them internally and records them in its trace.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub enum UsageError {
    /// The source number does not name an interrupt on this CPU.
    NoIrq,
    /// The source already has a handler.
    IrqBusy,
    /// The source fired, or was asked to unbind, without a handler.
    NotBound,
    /// The handle already owns a source.
    AlreadyBound,
    /// The allocation policy could not satisfy a request.
    Exhausted,
    /// The timer index is out of range or already claimed.
    TimerBusy,
    /// The process-wide system instance already exists.
    AlreadyInitialized,
}
