// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The system call interface.
//!
//! A [`System`] is the one place system resources are manufactured. It owns
//! the interrupt table, the timer claims and the trace, and places every
//! object it hands out through its allocation policy.
//!
//! There is one process-wide instance, reached through [`System::call`] and
//! created exactly once: either explicitly, by [`System::install`] early in
//! boot, or on first use with the default configuration. Independent
//! instances made with [`System::new`] are useful for simulation and tests,
//! since nothing in them is global.

use crate::arch;
use crate::config::{Config, UnboundIrq};
use crate::interrupt::{CpuRegisters, Interrupt};
use crate::timer::Timer;
use crate::trace::{trace, Ringbuf, Trace, TRACE_DEPTH};
use abi::{InterruptNum, Task, UsageError};
use alloc::sync::Arc;
use core::mem::size_of;
use core::ptr::NonNull;
use core::sync::atomic::{AtomicU32, Ordering};
use object_alloc::{Allocator, ObjectBox};
use static_assertions::const_assert;

static SYSTEM: spin::Once<System> = spin::Once::new();

// Timer claims are one bit each.
const_assert!(arch::TIMER_COUNT <= 32);

pub struct System {
    config: Config,
    alloc: &'static dyn Allocator,
    cpu: arch::Cpu,
    pll: arch::CpuPll,
    irqs: [IrqSlot; arch::IRQ_COUNT],
    timers: AtomicU32,
    trace: spin::Mutex<Ringbuf<Trace, TRACE_DEPTH>>,
}

/// Per-source entry in the interrupt table.
struct IrqSlot {
    binding: spin::Mutex<Binding>,
    /// Where entry and exit save registers unless redirected.
    default_context: CpuRegisters,
}

impl IrqSlot {
    /// The save area `binding` currently selects. Only use it while
    /// `binding` is held.
    fn save_area<'a>(&'a self, binding: &'a Binding) -> &'a CpuRegisters {
        match binding.context {
            // Safety: a redirected area stays valid until it is withdrawn,
            // which takes this binding's lock.
            Some(p) => unsafe { p.as_ref() },
            None => &self.default_context,
        }
    }
}

#[derive(Default)]
struct Binding {
    handler: Option<Arc<dyn Task>>,
    /// Caller-owned save area installed by `Interrupt::set_context`.
    context: Option<NonNull<CpuRegisters>>,
}

// Safety: the context pointer is only dereferenced during dispatch, with the
// binding locked, and the contract of `set_context` makes the caller keep it
// valid, from any thread, until it is withdrawn under that same lock.
unsafe impl Send for Binding {}

impl System {
    pub fn new(config: Config, alloc: &'static dyn Allocator) -> Self {
        let pll = arch::CpuPll::new(
            config.pll.source_clock_hz,
            config.pll.cpu_clock_hz,
        );
        let system = Self {
            config,
            alloc,
            cpu: arch::Cpu::new(),
            pll,
            irqs: core::array::from_fn(|_| IrqSlot {
                binding: spin::Mutex::new(Binding::default()),
                default_context: CpuRegisters::new(),
            }),
            timers: AtomicU32::new(0),
            trace: spin::Mutex::new(Ringbuf::new(Trace::None)),
        };
        trace!(system, Trace::Boot);
        system
    }

    /// Returns the process-wide system, creating it with the default
    /// configuration and the global heap if nothing was installed.
    pub fn call() -> &'static System {
        SYSTEM.call_once(|| System::new(Config::default(), &object_alloc::HEAP))
    }

    /// Creates the process-wide system. Fails if it already exists, whether
    /// from an earlier `install` or from `call`.
    pub fn install(
        config: Config,
        alloc: &'static dyn Allocator,
    ) -> Result<&'static System, UsageError> {
        let mut created = false;
        let system = SYSTEM.call_once(|| {
            created = true;
            System::new(config, alloc)
        });
        if created {
            Ok(system)
        } else {
            Err(UsageError::AlreadyInitialized)
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn allocator(&self) -> &'static dyn Allocator {
        self.alloc
    }

    pub fn cpu(&self) -> &arch::Cpu {
        &self.cpu
    }

    /// Manufactures a system semaphore with `permits` initial permits.
    ///
    /// Returns `None` if the allocation policy is exhausted. A semaphore that
    /// could be placed but not set up (negative `permits`) is returned
    /// unconstructed.
    pub fn create_semaphore(
        &self,
        permits: i32,
        fair: bool,
    ) -> Option<ObjectBox<arch::SysSemaphore>> {
        let sem = arch::SysSemaphore::new(permits, fair);
        let sem = self.place(sem).ok()?;
        trace!(self, Trace::SemaphoreCreated { permits, fair });
        Some(sem)
    }

    /// Manufactures an unbound interrupt controller handle.
    pub fn create_interrupt(&self) -> Option<ObjectBox<Interrupt<'_>>> {
        self.place(Interrupt::new(self)).ok()
    }

    /// Manufactures a handle to hardware timer `index`. The handle is
    /// unconstructed if the index is out of range or already claimed.
    pub fn create_timer(&self, index: i32) -> Option<ObjectBox<Timer<'_>>> {
        self.place(Timer::new(self, index)).ok()
    }

    pub fn cpu_pll(&self) -> &arch::CpuPll {
        &self.pll
    }

    /// Resolves a task's requested stack size, substituting the configured
    /// default for 0.
    pub fn stack_size(&self, task: &dyn Task) -> usize {
        match task.stack_size() {
            0 => self.config.default_stack_size,
            n => n,
        }
    }

    /// A copy of this system's trace.
    pub fn trace(&self) -> Ringbuf<Trace, TRACE_DEPTH> {
        *self.trace.lock()
    }

    pub(crate) fn trace_entry(&self, line: u16, payload: Trace) {
        self.trace.lock().entry(line, payload);
    }

    fn place<T>(&self, value: T) -> Result<ObjectBox<T>, UsageError> {
        ObjectBox::try_new_in(value, self.alloc).map_err(|_| {
            trace!(
                self,
                Trace::AllocFailed {
                    size: size_of::<T>()
                }
            );
            UsageError::Exhausted
        })
    }

    fn irq_slot(&self, n: InterruptNum) -> Result<&IrqSlot, UsageError> {
        self.irqs.get(n.index()).ok_or(UsageError::NoIrq)
    }

    /// Installs `handler` for source `n` and enables it. The source is masked
    /// while the table entry changes.
    pub(crate) fn bind(
        &self,
        n: InterruptNum,
        handler: Arc<dyn Task>,
    ) -> Result<(), UsageError> {
        let slot = self.irq_slot(n)?;
        let was_enabled = self.cpu.disable_irq(n)?;

        let mut binding = slot.binding.lock();
        if binding.handler.is_some() {
            drop(binding);
            if was_enabled {
                self.cpu.enable_irq(n)?;
            }
            return Err(UsageError::IrqBusy);
        }
        binding.handler = Some(handler);
        binding.context = None;
        drop(binding);

        self.cpu.enable_irq(n)?;
        trace!(self, Trace::HandlerBound(n));
        Ok(())
    }

    /// Removes the handler for source `n`, leaving the source masked.
    pub(crate) fn unbind(&self, n: InterruptNum) -> Result<(), UsageError> {
        let slot = self.irq_slot(n)?;
        self.cpu.disable_irq(n)?;

        let handler = {
            let mut binding = slot.binding.lock();
            binding.context = None;
            binding.handler.take()
        };
        // The handler is dropped here, outside the lock.
        match handler {
            Some(_) => {
                trace!(self, Trace::HandlerRemoved(n));
                Ok(())
            }
            None => Err(UsageError::NotBound),
        }
    }

    /// Points source `n`'s save area at `context`, or back at the default.
    pub(crate) fn redirect(
        &self,
        n: InterruptNum,
        context: Option<NonNull<CpuRegisters>>,
    ) -> Result<(), UsageError> {
        let slot = self.irq_slot(n)?;
        slot.binding.lock().context = context;
        trace!(
            self,
            match context {
                Some(_) => Trace::ContextRedirected(n),
                None => Trace::ContextRestored(n),
            }
        );
        Ok(())
    }

    /// Signals source `n` as the hardware would, then services whatever is
    /// pending and enabled. Returns the number of handlers run.
    pub fn raise(&self, n: InterruptNum) -> Result<usize, UsageError> {
        self.cpu.pend_irq(n)?;
        Ok(self.service())
    }

    /// Runs handlers for every source that is pending and enabled.
    pub fn service(&self) -> usize {
        let mut handled = 0;
        while let Some(n) = self.cpu.next_irq() {
            if self.handle_irq(n).is_ok() {
                handled += 1;
            }
        }
        handled
    }

    /// Interrupt entry for source `n`.
    ///
    /// Saves the interrupted registers into the binding's save area, runs the
    /// handler, then restores from whichever save area is installed once the
    /// handler returns. A handler that installs a different context on its
    /// own binding therefore resumes a different register set than the one it
    /// interrupted.
    ///
    /// Firing an unbound source is a hardware misconfiguration. It is
    /// recorded, masked if so configured, and reported as `NotBound`.
    pub fn handle_irq(&self, n: InterruptNum) -> Result<i32, UsageError> {
        let slot = self.irq_slot(n)?;

        // The binding stays locked while its save area is in use, so a
        // concurrent `restore_context` or `remove_handler` can't retire the
        // area halfway through a save or restore.
        let handler = {
            let binding = slot.binding.lock();
            let handler = binding.handler.clone();
            if handler.is_some() {
                slot.save_area(&binding)
                    .with(|state| self.cpu.save_state(state));
            }
            handler
        };
        let Some(handler) = handler else {
            trace!(self, Trace::Spurious(n));
            if self.config.unbound_irq == UnboundIrq::Mask {
                self.cpu.disable_irq(n)?;
            }
            return Err(UsageError::NotBound);
        };

        // Unlocked, so the handler can redirect its own binding.
        let rc = handler.start();
        if rc != 0 {
            trace!(self, Trace::HandlerFailed { source: n, rc });
        }

        let binding = slot.binding.lock();
        slot.save_area(&binding)
            .with(|state| self.cpu.restore_state(state));
        Ok(rc)
    }

    /// Takes timer `index` for exclusive use.
    pub(crate) fn claim_timer(&self, index: i32) -> Result<usize, UsageError> {
        let i = usize::try_from(index)
            .ok()
            .filter(|&i| i < arch::TIMER_COUNT)
            .ok_or(UsageError::TimerBusy)?;
        let bit = 1 << i;
        if self.timers.fetch_or(bit, Ordering::AcqRel) & bit != 0 {
            trace!(self, Trace::TimerRefused(index));
            return Err(UsageError::TimerBusy);
        }
        trace!(self, Trace::TimerClaimed(index));
        Ok(i)
    }

    pub(crate) fn release_timer(&self, index: usize) {
        self.timers.fetch_and(!(1 << index), Ordering::AcqRel);
    }
}
