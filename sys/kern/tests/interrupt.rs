// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Preemptive context switching built from nothing but `set_context`.
//!
//! A tick handler keeps two register sets and, on every tick, points its own
//! binding at the one that is not running. Interrupt exit then resumes that
//! one.

use abi::{CpuInterrupt as _, Interrupt as _, InterruptNum, Object, Task};
use kern::arch::SavedState;
use kern::{Config, CpuRegisters, Interrupt, System};
use object_alloc::HEAP;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread;

const TICK: i32 = 11;

struct Switcher {
    irq: OnceLock<&'static Interrupt<'static>>,
    contexts: [&'static CpuRegisters; 2],
    ticks: AtomicUsize,
}

impl Task for Switcher {
    fn start(&self) -> i32 {
        let Some(irq) = self.irq.get() else {
            return -1;
        };
        let tick = self.ticks.fetch_add(1, Ordering::SeqCst);
        let next = self.contexts[(tick + 1) % 2];
        // Safety: both contexts are leaked, so they outlive the binding.
        unsafe { irq.set_context(next) };
        0
    }
}

fn state(psp: u32) -> SavedState {
    SavedState {
        r: [psp; 8],
        psp,
        ..Default::default()
    }
}

fn leak<T>(value: T) -> &'static T {
    Box::leak(Box::new(value))
}

#[test]
fn tick_switches_between_two_tasks() {
    let sys = leak(System::new(Config::default(), &HEAP));
    let a = leak(CpuRegisters::new());
    let b = leak(CpuRegisters::with_state(state(0xB000)));

    let irq: &'static Interrupt<'static> = &**leak(sys.create_interrupt().unwrap());
    assert!(irq.is_constructed());

    let switcher = Arc::new(Switcher {
        irq: OnceLock::new(),
        contexts: [a, b],
        ticks: AtomicUsize::new(0),
    });
    assert!(switcher.irq.set(irq).is_ok());
    assert!(irq.set_handler(switcher.clone(), TICK));

    // Task A is running; entry saves it into `a`.
    unsafe { irq.set_context(a) };
    sys.cpu().set_live_state(state(0xA000));

    irq.jump();
    assert_eq!(sys.cpu().live_state(), state(0xB000));
    assert_eq!(a.load(), state(0xA000));

    // B makes progress, then the next tick swaps back.
    sys.cpu().set_live_state(state(0xB004));
    irq.jump();
    assert_eq!(sys.cpu().live_state(), state(0xA000));
    assert_eq!(b.load(), state(0xB004));

    irq.jump();
    assert_eq!(sys.cpu().live_state(), state(0xB004));
    assert_eq!(switcher.ticks.load(Ordering::SeqCst), 3);

    irq.remove_handler();
    assert!(!sys.cpu().irq_enabled(InterruptNum(TICK as u32)));
}

#[test]
fn restoring_the_default_context_ends_switching() {
    let sys = leak(System::new(Config::default(), &HEAP));
    let other = leak(CpuRegisters::with_state(state(0xC000)));
    let irq = sys.create_interrupt().unwrap();

    struct Noop;
    impl Task for Noop {
        fn start(&self) -> i32 {
            0
        }
    }

    assert!(irq.set_handler(Arc::new(Noop), TICK));
    unsafe { irq.set_context(other) };
    irq.restore_context();

    sys.cpu().set_live_state(state(0xD000));
    irq.jump();
    // Entry and exit both used the default area, so nothing moved.
    assert_eq!(sys.cpu().live_state(), state(0xD000));
    assert_eq!(other.load(), state(0xC000));
}

#[test]
fn exclusive_binding_across_handles() {
    let sys = leak(System::new(Config::default(), &HEAP));
    let first = sys.create_interrupt().unwrap();
    let second = sys.create_interrupt().unwrap();

    struct Hits(AtomicUsize);
    impl Task for Hits {
        fn start(&self) -> i32 {
            self.0.fetch_add(1, Ordering::SeqCst);
            0
        }
    }

    let a = Arc::new(Hits(AtomicUsize::new(0)));
    let b = Arc::new(Hits(AtomicUsize::new(0)));
    assert!(first.set_handler(a.clone(), 5));
    assert!(!second.set_handler(b.clone(), 5));

    second.jump();
    first.jump();
    assert_eq!(a.0.load(Ordering::SeqCst), 1);
    assert_eq!(b.0.load(Ordering::SeqCst), 0);

    first.remove_handler();
    assert!(second.set_handler(b.clone(), 5));
    second.jump();
    assert_eq!(a.0.load(Ordering::SeqCst), 1);
    assert_eq!(b.0.load(Ordering::SeqCst), 1);
}

#[test]
fn withdrawn_context_is_left_alone() {
    let sys = leak(System::new(Config::default(), &HEAP));
    let irq = sys.create_interrupt().unwrap();

    struct Noop;
    impl Task for Noop {
        fn start(&self) -> i32 {
            0
        }
    }
    assert!(irq.set_handler(Arc::new(Noop), TICK));

    let stop = AtomicBool::new(false);
    thread::scope(|s| {
        s.spawn(|| {
            while !stop.load(Ordering::Relaxed) {
                sys.cpu().set_live_state(state(0xEEEE));
                let _ = sys.raise(InterruptNum(TICK as u32));
            }
        });

        for i in 0..2000u32 {
            let regs = Box::new(CpuRegisters::with_state(state(i)));
            // Safety: withdrawn below, before `regs` is dropped.
            unsafe { irq.set_context(&regs) };
            irq.restore_context();

            // Once withdrawn, no dispatch in flight may still write here.
            let settled = regs.load();
            thread::yield_now();
            assert_eq!(regs.load(), settled);
        }
        stop.store(true, Ordering::Relaxed);
    });
}
