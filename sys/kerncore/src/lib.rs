// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Allow std-y things to be used in test. Note that this attribute is a bit of a
// trap for the programmer, because rust-analyzer by default seems to build
// things with test set. This means it's easy to introduce code incompatible
// with no_std without your editor hassling you about it. Beware.
#![cfg_attr(not(test), no_std)]
#![forbid(clippy::wildcard_imports)]

//! Platform-independent kernel algorithms.
//!
//! Each architecture port supplies the mechanism for parking and waking
//! callers; the decisions about who gets to proceed live here, where they can
//! be tested without any of that machinery.

/// Position of a caller in a semaphore's arrival order.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Ticket(u32);

/// A caller waiting on [`Permits`]: its place in line and what it asked for.
#[derive(Debug)]
pub struct Waiter {
    ticket: Ticket,
    want: u32,
    parked: bool,
}

impl Waiter {
    pub fn ticket(&self) -> Ticket {
        self.ticket
    }

    pub fn want(&self) -> u32 {
        self.want
    }
}

/// Permit accounting for a counting semaphore.
///
/// A caller announces itself with [`Permits::arrive`] and then calls
/// [`Permits::poll`] until it is granted, sleeping in between by whatever
/// means the platform has. Grants are all-or-nothing: a waiter is never
/// handed part of its request.
///
/// In fair mode waiters are granted strictly by ticket. The waiter at the
/// head of the line blocks everyone behind it until its whole request fits,
/// even if a later, smaller request could be satisfied right now. In unfair
/// mode any waiter whose request fits may take it.
///
/// A fair-mode request larger than the number of permits that will ever be
/// released stalls the line behind it forever; there is no cancellation.
#[derive(Debug)]
pub struct Permits {
    available: u32,
    fair: bool,
    /// Next ticket to hand out.
    next: u32,
    /// Ticket at the head of the line (fair mode only).
    serving: u32,
    /// Waiters that have failed at least one poll and not yet been granted.
    parked: u32,
}

impl Permits {
    pub const fn new(available: u32, fair: bool) -> Self {
        Self {
            available,
            fair,
            next: 0,
            serving: 0,
            parked: 0,
        }
    }

    pub fn available(&self) -> u32 {
        self.available
    }

    pub fn is_fair(&self) -> bool {
        self.fair
    }

    /// Whether any waiter has had to wait.
    pub fn is_blocked(&self) -> bool {
        self.parked != 0
    }

    /// Number of waiters that have had to wait and are still waiting.
    pub fn waiters(&self) -> u32 {
        self.parked
    }

    /// Takes a place in line for `want` permits.
    pub fn arrive(&mut self, want: u32) -> Waiter {
        let ticket = Ticket(self.next);
        self.next = self.next.wrapping_add(1);
        Waiter {
            ticket,
            want,
            parked: false,
        }
    }

    /// Attempts to grant `waiter`'s request. On `true` the permits are taken
    /// and the waiter is done; on `false` the caller should park and poll
    /// again after the next release.
    pub fn poll(&mut self, waiter: &mut Waiter) -> bool {
        let turn = !self.fair || waiter.ticket.0 == self.serving;
        if turn && self.available >= waiter.want {
            self.available -= waiter.want;
            if self.fair {
                self.serving = self.serving.wrapping_add(1);
            }
            if waiter.parked {
                waiter.parked = false;
                self.parked -= 1;
            }
            true
        } else {
            if !waiter.parked {
                waiter.parked = true;
                self.parked += 1;
            }
            false
        }
    }

    /// Returns `n` permits. Saturates rather than wrapping.
    pub fn release(&mut self, n: u32) {
        self.available = self.available.saturating_add(n);
    }
}
