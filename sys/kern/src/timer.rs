// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::arch;
use crate::system::System;
use abi::{Constructed, Object};

/// Exclusive handle to a hardware timer.
///
/// Each hardware timer has at most one constructed handle at a time. A
/// handle for an index that is out of range, or already claimed, is
/// unconstructed: its queries return 0 (`index` returns -1) and its controls
/// do nothing. Dropping a constructed handle releases the claim.
pub struct Timer<'a> {
    flag: Constructed,
    system: &'a System,
    hw: Option<arch::Timer>,
}

impl<'a> Timer<'a> {
    pub(crate) fn new(system: &'a System, index: i32) -> Self {
        let mut this = Self {
            flag: Constructed::new(),
            system,
            hw: None,
        };
        let claimed = system.claim_timer(index);
        this.flag.set(claimed.is_ok());
        this.hw = claimed.ok().map(arch::Timer::new);
        this
    }

    fn hw(&self) -> Option<&arch::Timer> {
        if self.flag.get() {
            self.hw.as_ref()
        } else {
            None
        }
    }
}

impl Object for Timer<'_> {
    fn is_constructed(&self) -> bool {
        self.flag.get()
    }
}

impl abi::Timer for Timer<'_> {
    fn count(&self) -> i64 {
        self.hw().map_or(0, arch::Timer::count)
    }

    fn set_count(&self, count: i64) {
        if let Some(hw) = self.hw() {
            hw.set_count(count);
        }
    }

    fn period(&self) -> i64 {
        self.hw().map_or(0, arch::Timer::period)
    }

    fn set_period(&self, us: i64) {
        if let Some(hw) = self.hw() {
            hw.set_period(us);
        }
    }

    fn start(&self) {
        if let Some(hw) = self.hw() {
            hw.start();
        }
    }

    fn stop(&self) {
        if let Some(hw) = self.hw() {
            hw.stop();
        }
    }

    fn index(&self) -> i32 {
        self.hw()
            .and_then(|hw| i32::try_from(hw.index()).ok())
            .unwrap_or(-1)
    }
}

impl Drop for Timer<'_> {
    fn drop(&mut self) {
        if let Some(hw) = self.hw.take() {
            hw.stop();
            self.system.release_timer(hw.index());
        }
    }
}
