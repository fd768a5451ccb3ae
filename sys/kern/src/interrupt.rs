// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! CPU interrupt controller handles.
//!
//! An [`Interrupt`] owns at most one interrupt source at a time. Binding a
//! handler to a source that some other handle (or this one) already bound is
//! refused rather than replacing the existing handler: the owner has to
//! `remove_handler` first. That keeps exactly one party responsible for each
//! source.
//!
//! Both binding and unbinding mask the source while the interrupt table
//! changes. After a successful `set_handler` the source is enabled; after
//! `remove_handler` it is left masked. Dropping a handle removes its handler.

use crate::arch;
use crate::system::System;
use crate::trace::{trace, Trace};
use abi::{Constructed, InterruptNum, Object, Task, UsageError};
use alloc::sync::Arc;
use core::ptr::NonNull;

/// A register-save area, as used on interrupt entry and exit.
///
/// The controller only ever borrows one of these; see
/// [`abi::CpuInterrupt::set_context`].
#[derive(Debug, Default)]
pub struct CpuRegisters(spin::Mutex<arch::SavedState>);

impl CpuRegisters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(state: arch::SavedState) -> Self {
        Self(spin::Mutex::new(state))
    }

    pub fn load(&self) -> arch::SavedState {
        self.0.lock().clone()
    }

    pub fn store(&self, state: arch::SavedState) {
        *self.0.lock() = state;
    }

    pub(crate) fn with<R>(&self, f: impl FnOnce(&mut arch::SavedState) -> R) -> R {
        f(&mut *self.0.lock())
    }
}

pub struct Interrupt<'a> {
    flag: Constructed,
    system: &'a System,
    source: spin::Mutex<Option<InterruptNum>>,
}

impl<'a> Interrupt<'a> {
    pub(crate) fn new(system: &'a System) -> Self {
        let mut this = Self {
            flag: Constructed::new(),
            system,
            source: spin::Mutex::new(None),
        };
        // A CPU with no interrupt sources has nothing to hand out.
        this.flag.set(arch::IRQ_COUNT != 0);
        this
    }

    /// The source this handle currently owns.
    pub fn source(&self) -> Option<InterruptNum> {
        *self.source.lock()
    }

    /// Unbinds whatever this handle owns, constructed or not.
    fn release_source(&self) {
        if let Some(n) = self.source.lock().take() {
            // Only this handle could have unbound it.
            let _ = self.system.unbind(n);
        }
    }

    fn try_bind(&self, task: Arc<dyn Task>, source: i32) -> Result<(), UsageError> {
        let n = InterruptNum::from_source(source).ok_or(UsageError::NoIrq)?;
        let mut bound = self.source.lock();
        if bound.is_some() {
            return Err(UsageError::AlreadyBound);
        }
        self.system.bind(n, task)?;
        *bound = Some(n);
        Ok(())
    }
}

impl Object for Interrupt<'_> {
    fn is_constructed(&self) -> bool {
        self.flag.get()
    }
}

impl abi::Interrupt for Interrupt<'_> {
    fn disable(&self) -> bool {
        match self.source() {
            Some(n) if self.flag.get() => {
                self.system.cpu().disable_irq(n).unwrap_or(false)
            }
            _ => false,
        }
    }

    fn enable(&self, status: bool) {
        if !status || !self.flag.get() {
            return;
        }
        if let Some(n) = self.source() {
            // The source was valid when it was bound.
            let _ = self.system.cpu().enable_irq(n);
        }
    }

    fn jump(&self) {
        if !self.flag.get() {
            return;
        }
        if let Some(n) = self.source() {
            let _ = self.system.raise(n);
        }
    }
}

impl abi::CpuInterrupt for Interrupt<'_> {
    type Registers = CpuRegisters;

    fn set_handler(&self, task: Arc<dyn Task>, source: i32) -> bool {
        if !self.flag.get() {
            return false;
        }
        match self.try_bind(task, source) {
            Ok(()) => true,
            Err(err) => {
                trace!(self.system, Trace::HandlerRejected { source, err });
                false
            }
        }
    }

    fn remove_handler(&self) {
        if self.flag.get() {
            self.release_source();
        }
    }

    unsafe fn set_context(&self, registers: &CpuRegisters) {
        if !self.flag.get() {
            return;
        }
        match self.source() {
            Some(n) => {
                let _ = self.system.redirect(n, Some(NonNull::from(registers)));
            }
            None => trace!(self.system, Trace::ContextIgnored),
        }
    }

    fn restore_context(&self) {
        if !self.flag.get() {
            return;
        }
        if let Some(n) = self.source() {
            let _ = self.system.redirect(n, None);
        }
    }
}

impl Drop for Interrupt<'_> {
    fn drop(&mut self) {
        self.release_source();
    }
}
