//! Replay window for a single stream.

use std::time::Instant;

use compotastic_wire::SequenceNumber;

/// Result of offering a sequence number to a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// First sighting; apply the payload
    Accepted,
    /// Already seen inside the window
    Duplicate,
    /// Too far behind the highest accepted number to judge; assume replay
    StaleDuplicate,
    /// Unknown stream and no room to track it; dropped unapplied
    Untracked,
}

impl Verdict {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Verdict::Accepted)
    }
}

/// Recently accepted sequence numbers for one `(source, channel)` stream.
///
/// A ring of `window` slots indexed by `seq % window`. Every number in
/// `(highest - window, highest]` maps to its own slot, so the ring is exact
/// for the span it covers and costs `window` slots regardless of traffic.
#[derive(Debug, Clone)]
pub struct DedupWindow {
    highest: SequenceNumber,
    slots: Box<[Option<SequenceNumber>]>,
    last_activity: Instant,
}

impl DedupWindow {
    /// Start tracking a stream at its first accepted number.
    pub fn new(first: SequenceNumber, window: u16, now: Instant) -> Self {
        let mut w = Self {
            highest: first,
            slots: vec![None; usize::from(window.max(1))].into_boxed_slice(),
            last_activity: now,
        };
        w.mark(first);
        w
    }

    pub fn highest_accepted(&self) -> SequenceNumber {
        self.highest
    }

    pub fn last_activity(&self) -> Instant {
        self.last_activity
    }

    pub fn width(&self) -> usize {
        self.slots.len()
    }

    fn slot(&self, seq: SequenceNumber) -> usize {
        usize::from(seq.0) % self.slots.len()
    }

    fn mark(&mut self, seq: SequenceNumber) {
        let i = self.slot(seq);
        self.slots[i] = Some(seq);
    }

    /// Would `seq` be accepted? Does not modify the window.
    pub fn check(&self, seq: SequenceNumber) -> Verdict {
        if seq.is_newer_than(self.highest) {
            return Verdict::Accepted;
        }
        let behind = usize::from(self.highest.distance_from(seq));
        if behind >= self.slots.len() {
            Verdict::StaleDuplicate
        } else if self.slots[self.slot(seq)] == Some(seq) {
            Verdict::Duplicate
        } else {
            Verdict::Accepted
        }
    }

    /// Offer `seq`, recording it if accepted.
    pub fn observe(&mut self, seq: SequenceNumber, now: Instant) -> Verdict {
        let verdict = self.check(seq);
        if !verdict.is_accepted() {
            return verdict;
        }

        if seq.is_newer_than(self.highest) {
            // Forget the numbers the window slides past.
            let advance = usize::from(seq.distance_from(self.highest)).min(self.slots.len());
            let mut cleared = self.highest;
            for _ in 0..advance {
                cleared = cleared.next();
                let i = self.slot(cleared);
                self.slots[i] = None;
            }
            self.highest = seq;
        }

        self.mark(seq);
        self.last_activity = now;
        Verdict::Accepted
    }

    /// Time since the last accepted number.
    pub fn idle_for(&self, now: Instant) -> std::time::Duration {
        now.saturating_duration_since(self.last_activity)
    }
}
