// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Hosted simulation of the hardware.
//!
//! Host threads stand in for tasks and a `Condvar` for the scheduler's wait
//! queue. Interrupt sources have the enable and pending bits an NVIC would
//! give them, and are delivered when the kernel services them (see
//! `System::raise`), on the thread that does so. The "live" register set
//! is whatever the simulated processor would be running.

use abi::{Constructed, InterruptNum, Object, SysResource, UsageError};
use core::sync::atomic::{AtomicU64, Ordering};
use kerncore::Permits;
use static_assertions::const_assert;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

pub const IRQ_COUNT: usize = 64;
pub const TIMER_COUNT: usize = 4;

// One bit per source in the enable and pending words.
const_assert!(IRQ_COUNT <= 64);

/// Longest timer period, in microseconds: a 32-bit counter at 1 MHz.
pub const MAX_PERIOD_US: i64 = u32::MAX as i64;

/// Registers saved across an interrupt. Mirrors what an ARMv7-M port saves by
/// hand; the rest is stacked by hardware.
#[repr(C)]
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SavedState {
    /// r4 through r11.
    pub r: [u32; 8],
    pub psp: u32,
    pub exc_return: u32,
}

pub struct Cpu {
    enabled: AtomicU64,
    pending: AtomicU64,
    live: spin::Mutex<SavedState>,
}

fn irq_bit(n: InterruptNum) -> Result<u64, UsageError> {
    if n.index() < IRQ_COUNT {
        Ok(1 << n.0)
    } else {
        Err(UsageError::NoIrq)
    }
}

impl Cpu {
    pub fn new() -> Self {
        Self {
            enabled: AtomicU64::new(0),
            pending: AtomicU64::new(0),
            live: spin::Mutex::new(SavedState::default()),
        }
    }

    /// Masks source `n`, returning whether it was enabled.
    pub fn disable_irq(&self, n: InterruptNum) -> Result<bool, UsageError> {
        let bit = irq_bit(n)?;
        Ok(self.enabled.fetch_and(!bit, Ordering::SeqCst) & bit != 0)
    }

    pub fn enable_irq(&self, n: InterruptNum) -> Result<(), UsageError> {
        let bit = irq_bit(n)?;
        self.enabled.fetch_or(bit, Ordering::SeqCst);
        Ok(())
    }

    pub fn irq_enabled(&self, n: InterruptNum) -> bool {
        irq_bit(n).is_ok_and(|bit| self.enabled.load(Ordering::SeqCst) & bit != 0)
    }

    pub fn pend_irq(&self, n: InterruptNum) -> Result<(), UsageError> {
        let bit = irq_bit(n)?;
        self.pending.fetch_or(bit, Ordering::SeqCst);
        Ok(())
    }

    pub fn irq_pending(&self, n: InterruptNum) -> bool {
        irq_bit(n).is_ok_and(|bit| self.pending.load(Ordering::SeqCst) & bit != 0)
    }

    /// Claims the lowest-numbered source that is both pending and enabled,
    /// clearing its pending bit.
    pub fn next_irq(&self) -> Option<InterruptNum> {
        loop {
            let ready = self.pending.load(Ordering::SeqCst)
                & self.enabled.load(Ordering::SeqCst);
            if ready == 0 {
                return None;
            }
            let n = ready.trailing_zeros();
            let bit = 1u64 << n;
            if self.pending.fetch_and(!bit, Ordering::SeqCst) & bit != 0 {
                return Some(InterruptNum(n));
            }
            // Someone else claimed it first; look again.
        }
    }

    /// Interrupt entry: spill the live registers to `into`.
    pub fn save_state(&self, into: &mut SavedState) {
        into.clone_from(&self.live.lock());
    }

    /// Interrupt exit: load the live registers from `from`.
    pub fn restore_state(&self, from: &SavedState) {
        self.live.lock().clone_from(from);
    }

    pub fn live_state(&self) -> SavedState {
        self.live.lock().clone()
    }

    pub fn set_live_state(&self, state: SavedState) {
        *self.live.lock() = state;
    }
}

impl Default for Cpu {
    fn default() -> Self {
        Self::new()
    }
}

/// Counting semaphore parking host threads.
pub struct SysSemaphore {
    flag: Constructed,
    ledger: Mutex<Permits>,
    wake: Condvar,
}

impl SysSemaphore {
    /// A negative permit count leaves the semaphore unconstructed.
    pub fn new(permits: i32, fair: bool) -> Self {
        let mut flag = Constructed::new();
        flag.set(permits >= 0);
        let initial = u32::try_from(permits).unwrap_or(0);
        Self {
            flag,
            ledger: Mutex::new(Permits::new(initial, fair)),
            wake: Condvar::new(),
        }
    }

    /// Permits not currently held, or 0 if unconstructed.
    pub fn available(&self) -> u32 {
        if self.flag.get() {
            self.ledger().available()
        } else {
            0
        }
    }

    /// Callers currently parked in `acquire`.
    pub fn waiters(&self) -> u32 {
        if self.flag.get() {
            self.ledger().waiters()
        } else {
            0
        }
    }

    fn ledger(&self) -> MutexGuard<'_, Permits> {
        // A thread that panicked while holding the lock did so outside of
        // Permits' methods, which can't leave it inconsistent.
        self.ledger.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Object for SysSemaphore {
    fn is_constructed(&self) -> bool {
        self.flag.get()
    }
}

impl SysResource for SysSemaphore {}

impl abi::Semaphore for SysSemaphore {
    fn acquire(&self) -> bool {
        abi::Semaphore::acquire_n(self, 1)
    }

    fn acquire_n(&self, permits: i32) -> bool {
        if !self.flag.get() {
            return false;
        }
        let Ok(want) = u32::try_from(permits) else {
            return false;
        };
        if want == 0 {
            return true;
        }

        let mut ledger = self.ledger();
        let mut waiter = ledger.arrive(want);
        while !ledger.poll(&mut waiter) {
            ledger = self
                .wake
                .wait(ledger)
                .unwrap_or_else(PoisonError::into_inner);
        }
        // A release covering several waiters wakes them all at once. In fair
        // mode any that looked before their turn went back to sleep, so pass
        // the wakeup along while permits remain.
        if ledger.is_blocked() && ledger.available() != 0 {
            self.wake.notify_all();
        }
        true
    }

    fn release(&self) {
        abi::Semaphore::release_n(self, 1)
    }

    fn release_n(&self, permits: i32) {
        if !self.flag.get() {
            return;
        }
        let Ok(n) = u32::try_from(permits) else {
            return;
        };
        if n == 0 {
            return;
        }
        self.ledger().release(n);
        self.wake.notify_all();
    }

    fn is_fair(&self) -> bool {
        self.flag.get() && self.ledger().is_fair()
    }

    fn is_blocked(&self) -> bool {
        self.flag.get() && self.ledger().is_blocked()
    }
}

/// Free-running up-counter clocked at 1 MHz from the host's monotonic clock.
pub struct Timer {
    index: usize,
    state: spin::Mutex<TimerState>,
}

struct TimerState {
    count: i64,
    period: i64,
    started: Option<Instant>,
}

impl TimerState {
    fn elapsed_us(&self) -> i64 {
        self.started.map_or(0, |t| {
            i64::try_from(t.elapsed().as_micros()).unwrap_or(i64::MAX)
        })
    }

    fn now(&self) -> i64 {
        self.count.saturating_add(self.elapsed_us()) % self.period
    }
}

impl Timer {
    pub fn new(index: usize) -> Self {
        Self {
            index,
            state: spin::Mutex::new(TimerState {
                count: 0,
                period: MAX_PERIOD_US,
                started: None,
            }),
        }
    }

    pub fn count(&self) -> i64 {
        self.state.lock().now()
    }

    /// Loads the counter. Negative values are ignored.
    pub fn set_count(&self, count: i64) {
        if count < 0 {
            return;
        }
        let mut s = self.state.lock();
        s.count = count % s.period;
        if s.started.is_some() {
            s.started = Some(Instant::now());
        }
    }

    pub fn period(&self) -> i64 {
        self.state.lock().period
    }

    /// Sets the reload period. 0 selects `MAX_PERIOD_US`; negative values are
    /// ignored.
    pub fn set_period(&self, us: i64) {
        if us < 0 {
            return;
        }
        let mut s = self.state.lock();
        let now = s.now();
        s.period = if us == 0 { MAX_PERIOD_US } else { us.min(MAX_PERIOD_US) };
        s.count = now % s.period;
        if s.started.is_some() {
            s.started = Some(Instant::now());
        }
    }

    pub fn start(&self) {
        let mut s = self.state.lock();
        if s.started.is_none() {
            s.started = Some(Instant::now());
        }
    }

    pub fn stop(&self) {
        let mut s = self.state.lock();
        s.count = s.now();
        s.started = None;
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().started.is_some()
    }

    pub fn index(&self) -> usize {
        self.index
    }
}

/// Fixed clock tree, as configured.
pub struct CpuPll {
    flag: Constructed,
    source_hz: i64,
    cpu_hz: i64,
}

impl CpuPll {
    /// Non-positive frequencies leave the PLL unconstructed.
    pub fn new(source_hz: i64, cpu_hz: i64) -> Self {
        let mut flag = Constructed::new();
        flag.set(source_hz > 0 && cpu_hz > 0);
        Self {
            flag,
            source_hz,
            cpu_hz,
        }
    }
}

impl Object for CpuPll {
    fn is_constructed(&self) -> bool {
        self.flag.get()
    }
}

impl abi::CpuPll for CpuPll {
    fn source_clock(&self) -> i64 {
        if self.flag.get() {
            self.source_hz
        } else {
            0
        }
    }

    fn cpu_clock(&self) -> i64 {
        if self.flag.get() {
            self.cpu_hz
        } else {
            0
        }
    }
}
