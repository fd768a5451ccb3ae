// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Kernel event trace.
//!
//! Each [`System`](crate::System) keeps a fixed-size ring buffer of
//! [`Trace`] events, recorded with the [`trace!`] macro. When an event is
//! recorded with an identical payload to the most recent entry, from the same
//! source line, the entry's `count` is bumped instead of consuming a slot, so
//! an interrupt firing at a steady rate occupies one entry rather than
//! flushing everything else out.
//!
//! The buffer is meant to be read with a debugger or, on hosted builds, by
//! calling [`System::trace`](crate::System::trace).
//!
//! `Ringbuf` and `RingbufEntry` are the entry types from Hubris' `ringbuf`
//! crate, with the same layout so existing debugger tooling can read them.
//! That crate only supports buffers in statics, one per crate; here there's
//! one per `System`, behind its lock.

use abi::{InterruptNum, UsageError};

/// Number of entries in each system's trace.
pub const TRACE_DEPTH: usize = 32;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Trace {
    None,
    Boot,
    AllocFailed { size: usize },
    SemaphoreCreated { permits: i32, fair: bool },
    SemaphoreUnconstructed { permits: i32 },
    HandlerBound(InterruptNum),
    HandlerRejected { source: i32, err: UsageError },
    HandlerRemoved(InterruptNum),
    ContextRedirected(InterruptNum),
    ContextRestored(InterruptNum),
    ContextIgnored,
    HandlerFailed { source: InterruptNum, rc: i32 },
    Spurious(InterruptNum),
    TimerClaimed(i32),
    TimerRefused(i32),
}

/// One slot of a [`Ringbuf`].
#[derive(Copy, Clone, Debug)]
pub struct RingbufEntry<T: Copy + PartialEq> {
    pub line: u16,
    pub generation: u16,
    pub count: u32,
    pub payload: T,
}

/// A ring buffer of `N` entries carrying `T`.
#[derive(Copy, Clone, Debug)]
pub struct Ringbuf<T: Copy + PartialEq, const N: usize> {
    pub last: Option<usize>,
    pub buffer: [RingbufEntry<T>; N],
}

impl<T: Copy + PartialEq, const N: usize> Ringbuf<T, N> {
    pub const fn new(init: T) -> Self {
        Self {
            last: None,
            buffer: [RingbufEntry {
                line: 0,
                generation: 0,
                count: 0,
                payload: init,
            }; N],
        }
    }

    pub fn entry(&mut self, line: u16, payload: T) {
        // On the first entry `last` is None. Treat that as an out-of-range
        // index, so nothing gets its count bumped and the entry lands in
        // slot 0.
        let last = self.last.unwrap_or(usize::MAX);

        // get_mut also covers a corrupted `last` pointing out of range,
        // which starts us over at 0 instead of panicking.
        if let Some(ent) = self.buffer.get_mut(last) {
            if ent.line == line && ent.payload == payload {
                // Only reuse the entry if the count doesn't overflow.
                if let Some(new_count) = ent.count.checked_add(1) {
                    ent.count = new_count;
                    return;
                }
            }
        }

        // wrapping_add turns usize::MAX into 0 for the first entry. The
        // comparison stands in for a remainder, which is expensive on parts
        // without hardware divide.
        let ndx = {
            let next = last.wrapping_add(1);
            if next >= self.buffer.len() {
                0
            } else {
                next
            }
        };

        let ent = &mut self.buffer[ndx];
        *ent = RingbufEntry {
            line,
            payload,
            count: 1,
            generation: ent.generation.wrapping_add(1),
        };

        self.last = Some(ndx);
    }

    /// Entries that have been written, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &RingbufEntry<T>> + '_ {
        let start = self.last.map_or(0, |l| l + 1);
        let (newer, older) = self.buffer.split_at(start.min(N));
        older
            .iter()
            .chain(newer.iter())
            .filter(|ent| ent.generation != 0)
    }

    /// Payloads that have been written, oldest first.
    pub fn payloads(&self) -> impl Iterator<Item = T> + '_ {
        self.iter().map(|ent| ent.payload)
    }
}

/// Records an event in a system's trace, tagged with the current line.
macro_rules! trace {
    ($sys:expr, $payload:expr) => {
        $sys.trace_entry(line!() as u16, $payload)
    };
}
pub(crate) use trace;

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn repeated_entries_bump_count() {
        let mut rb = Ringbuf::<u8, 4>::new(0);
        rb.entry(10, 1);
        rb.entry(10, 1);
        rb.entry(10, 1);
        rb.entry(11, 1);
        let ents: Vec<_> = rb.iter().map(|e| (e.line, e.count)).collect();
        assert_eq!(ents, [(10, 3), (11, 1)]);
    }

    #[test]
    fn same_payload_from_other_line_is_new_entry() {
        let mut rb = Ringbuf::<u8, 4>::new(0);
        rb.entry(10, 7);
        rb.entry(12, 7);
        assert_eq!(rb.iter().count(), 2);
    }

    #[test]
    fn wraps_and_keeps_order() {
        let mut rb = Ringbuf::<u8, 3>::new(0);
        for i in 1..=5 {
            rb.entry(1, i);
        }
        assert_eq!(rb.payloads().collect::<Vec<_>>(), [3, 4, 5]);
        // Slot 0 has been written twice.
        assert_eq!(rb.buffer[0].generation, 2);
    }

    #[test]
    fn empty_buffer_yields_nothing() {
        let rb = Ringbuf::<Trace, TRACE_DEPTH>::new(Trace::None);
        assert_eq!(rb.iter().count(), 0);
    }

    #[test]
    fn saturated_count_starts_new_entry() {
        let mut rb = Ringbuf::<u8, 4>::new(0);
        rb.entry(3, 1);
        rb.buffer[0].count = u32::MAX;
        rb.entry(3, 1);
        let ents: Vec<_> = rb.iter().map(|e| e.count).collect();
        assert_eq!(ents, [u32::MAX, 1]);
    }

    #[test]
    fn corrupted_last_restarts_at_zero() {
        let mut rb = Ringbuf::<u8, 2>::new(0);
        rb.last = Some(99);
        rb.entry(1, 4);
        assert_eq!(rb.last, Some(0));
        assert_eq!(rb.buffer[0].payload, 4);
    }

    proptest! {
        /// The buffer holds the most recent runs of identical events, one
        /// entry per run, with each run's length as its count.
        #[test]
        fn keeps_last_runs(
            events in proptest::collection::vec((0u16..3, 0u8..3), 0..64),
        ) {
            let mut rb = Ringbuf::<u8, 8>::new(0);
            let mut runs: Vec<(u16, u8, u32)> = Vec::new();
            for &(line, payload) in &events {
                rb.entry(line, payload);
                match runs.last_mut() {
                    Some(r) if r.0 == line && r.1 == payload => r.2 += 1,
                    _ => runs.push((line, payload, 1)),
                }
            }

            let kept: Vec<_> = rb.iter().map(|e| (e.line, e.payload, e.count)).collect();
            let expected = &runs[runs.len().saturating_sub(8)..];
            prop_assert_eq!(kept.as_slice(), expected);
        }
    }
}
