// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::arch;
use crate::system::System;
use crate::trace::{trace, Trace};
use abi::{Constructed, Object};
use object_alloc::ObjectBox;

/// Counting semaphore backed by a system semaphore.
///
/// If the system could not provide one, the semaphore is unconstructed and
/// every operation is a no-op: `acquire` returns `false` immediately and the
/// queries return `false`. Semaphores can't be cloned.
pub struct Semaphore {
    flag: Constructed,
    sem: Option<ObjectBox<arch::SysSemaphore>>,
}

impl Semaphore {
    /// A non-fair semaphore with `permits` initial permits.
    pub fn new(system: &System, permits: i32) -> Self {
        Self::with_fairness(system, permits, false)
    }

    pub fn with_fairness(system: &System, permits: i32, fair: bool) -> Self {
        let mut this = Self {
            flag: Constructed::new(),
            sem: None,
        };
        let ok = this.construct(system, permits, fair);
        this.flag.set(ok);
        this
    }

    fn construct(&mut self, system: &System, permits: i32, fair: bool) -> bool {
        let Some(sem) = system.create_semaphore(permits, fair) else {
            return false;
        };
        if !sem.is_constructed() {
            trace!(system, Trace::SemaphoreUnconstructed { permits });
            return false;
        }
        self.sem = Some(sem);
        true
    }

    /// Callers currently parked in `acquire`, 0 if unconstructed.
    pub fn waiters(&self) -> u32 {
        self.sys().map_or(0, arch::SysSemaphore::waiters)
    }

    fn sys(&self) -> Option<&arch::SysSemaphore> {
        if self.flag.get() {
            self.sem.as_deref()
        } else {
            None
        }
    }
}

impl Object for Semaphore {
    fn is_constructed(&self) -> bool {
        self.flag.get()
    }
}

impl abi::Semaphore for Semaphore {
    fn acquire(&self) -> bool {
        self.sys().is_some_and(abi::Semaphore::acquire)
    }

    fn acquire_n(&self, permits: i32) -> bool {
        self.sys()
            .is_some_and(|s| abi::Semaphore::acquire_n(s, permits))
    }

    fn release(&self) {
        if let Some(s) = self.sys() {
            abi::Semaphore::release(s);
        }
    }

    fn release_n(&self, permits: i32) {
        if let Some(s) = self.sys() {
            abi::Semaphore::release_n(s, permits);
        }
    }

    fn is_fair(&self) -> bool {
        self.sys().is_some_and(abi::Semaphore::is_fair)
    }

    fn is_blocked(&self) -> bool {
        self.sys().is_some_and(abi::Semaphore::is_blocked)
    }
}
