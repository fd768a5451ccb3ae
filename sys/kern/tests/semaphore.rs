// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Semaphore behavior with real threads parked in `acquire`.

use abi::{Object, Semaphore as _};
use kern::{Config, Semaphore, System};
use object_alloc::HEAP;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

fn system() -> &'static System {
    Box::leak(Box::new(System::new(Config::default(), &HEAP)))
}

fn wait_for(mut cond: impl FnMut() -> bool) {
    while !cond() {
        thread::sleep(Duration::from_millis(1));
    }
}

#[test]
fn fair_semaphore_grants_in_arrival_order() {
    let sys = system();
    let sem = Arc::new(Semaphore::with_fairness(sys, 1, true));
    assert!(sem.acquire());

    let order = Arc::new(Mutex::new(Vec::new()));
    let mut threads = Vec::new();
    for id in 1..=3u32 {
        let (s, order) = (sem.clone(), order.clone());
        threads.push(thread::spawn(move || {
            assert!(s.acquire());
            order.lock().unwrap().push(id);
        }));
        // Don't let the next task arrive until this one is parked.
        wait_for(|| sem.waiters() == id);
    }

    for granted in 1..=3usize {
        sem.release();
        wait_for(|| order.lock().unwrap().len() == granted);
    }
    for t in threads {
        t.join().unwrap();
    }
    assert_eq!(*order.lock().unwrap(), [1, 2, 3]);
    assert!(!sem.is_blocked());
}

#[test]
fn two_permits_three_takers() {
    let sys = system();
    let sem = Arc::new(Semaphore::with_fairness(sys, 2, true));
    let through = Arc::new(AtomicUsize::new(0));

    let threads: Vec<_> = (0..3)
        .map(|_| {
            let (sem, through) = (sem.clone(), through.clone());
            thread::spawn(move || {
                assert!(sem.acquire());
                through.fetch_add(1, Ordering::SeqCst);
            })
        })
        .collect();

    wait_for(|| through.load(Ordering::SeqCst) == 2 && sem.waiters() == 1);
    assert!(sem.is_blocked());
    thread::sleep(Duration::from_millis(10));
    assert_eq!(through.load(Ordering::SeqCst), 2);

    sem.release();
    for t in threads {
        t.join().unwrap();
    }
    assert_eq!(through.load(Ordering::SeqCst), 3);
    assert!(!sem.is_blocked());
}

#[test]
fn multi_permit_acquire_waits_for_all() {
    let sys = system();
    let sem = Arc::new(Semaphore::new(sys, 1));
    let done = Arc::new(AtomicUsize::new(0));

    let t = {
        let (sem, done) = (sem.clone(), done.clone());
        thread::spawn(move || {
            assert!(sem.acquire_n(3));
            done.store(1, Ordering::SeqCst);
        })
    };
    wait_for(|| sem.is_blocked());

    sem.release();
    thread::sleep(Duration::from_millis(10));
    assert_eq!(done.load(Ordering::SeqCst), 0);

    sem.release();
    t.join().unwrap();
    assert_eq!(done.load(Ordering::SeqCst), 1);
}

#[test]
fn one_release_wakes_several_small_waiters() {
    let sys = system();
    let sem = Arc::new(Semaphore::with_fairness(sys, 0, true));
    let threads: Vec<_> = (1..=3u32)
        .map(|id| {
            let s = sem.clone();
            let t = thread::spawn(move || assert!(s.acquire()));
            wait_for(|| sem.waiters() == id);
            t
        })
        .collect();

    sem.release_n(3);
    for t in threads {
        t.join().unwrap();
    }
    assert!(!sem.is_blocked());
}

#[test]
fn permits_are_never_oversubscribed() {
    const PERMITS: usize = 3;
    let sys = system();
    for fair in [false, true] {
        let sem = Arc::new(Semaphore::with_fairness(sys, PERMITS as i32, fair));
        let in_use = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let threads: Vec<_> = (0..8)
            .map(|_| {
                let (sem, in_use, peak) = (sem.clone(), in_use.clone(), peak.clone());
                thread::spawn(move || {
                    for _ in 0..200 {
                        assert!(sem.acquire());
                        let now = in_use.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        thread::yield_now();
                        in_use.fetch_sub(1, Ordering::SeqCst);
                        sem.release();
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }

        assert!(peak.load(Ordering::SeqCst) <= PERMITS);
        assert!(!sem.is_blocked());
        // All permits came back.
        assert!(sem.acquire_n(PERMITS as i32));
    }
}

#[test]
fn global_system_serves_semaphores() {
    let sem = Semaphore::new(System::call(), 1);
    assert!(sem.is_constructed());
    assert!(sem.acquire());
    sem.release();
}
