//! Bounded queue of transitions waiting for airtime.

use std::collections::VecDeque;

use compotastic_wire::Transition;
use serde::Serialize;
use tracing::trace;

/// Outbox counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OutboxStats {
    pub queued: u64,
    pub coalesced: u64,
    pub dropped: u64,
}

/// What `push` did with a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Queued,
    /// Replaced an older transition from the same state.
    Coalesced,
    /// Queued after dropping the oldest entry.
    DroppedOldest,
}

/// Non-blocking outgoing queue.
///
/// Producers never wait on the radio. A transition from a state that already
/// has one queued replaces it in place, and a full queue sheds its oldest
/// entry.
#[derive(Debug, Clone)]
pub struct Outbox {
    queue: VecDeque<Transition>,
    capacity: usize,
    stats: OutboxStats,
}

impl Outbox {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            queue: VecDeque::with_capacity(capacity),
            capacity,
            stats: OutboxStats::default(),
        }
    }

    pub fn push(&mut self, transition: Transition) -> PushOutcome {
        if let Some(slot) = self.queue.iter_mut().find(|t| t.from == transition.from) {
            *slot = transition;
            self.stats.coalesced += 1;
            trace!("Coalesced outgoing transition from {}", transition.from);
            return PushOutcome::Coalesced;
        }

        let mut outcome = PushOutcome::Queued;
        if self.queue.len() >= self.capacity {
            self.queue.pop_front();
            self.stats.dropped += 1;
            outcome = PushOutcome::DroppedOldest;
        }
        self.queue.push_back(transition);
        self.stats.queued += 1;
        outcome
    }

    /// Take everything, oldest first.
    pub fn drain(&mut self) -> std::collections::vec_deque::Drain<'_, Transition> {
        self.queue.drain(..)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn stats(&self) -> OutboxStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use compotastic_wire::GridPosition;
    use proptest::prelude::*;

    fn t(x: u16, reward: i16) -> Transition {
        Transition::new(GridPosition::new(x, 1), 4, reward, GridPosition::new(x, 1), false)
    }

    #[test]
    fn coalesces_by_prior_state() {
        let mut outbox = Outbox::new(4);
        assert_eq!(outbox.push(t(1, 1)), PushOutcome::Queued);
        assert_eq!(outbox.push(t(2, 1)), PushOutcome::Queued);
        assert_eq!(outbox.push(t(1, 9)), PushOutcome::Coalesced);

        let drained: Vec<_> = outbox.drain().collect();
        assert_eq!(drained, vec![t(1, 9), t(2, 1)]);
        assert!(outbox.is_empty());
    }

    #[test]
    fn full_outbox_drops_oldest() {
        let mut outbox = Outbox::new(2);
        outbox.push(t(1, 0));
        outbox.push(t(2, 0));
        assert_eq!(outbox.push(t(3, 0)), PushOutcome::DroppedOldest);

        let drained: Vec<_> = outbox.drain().collect();
        assert_eq!(drained, vec![t(2, 0), t(3, 0)]);
        assert_eq!(outbox.stats().dropped, 1);
    }

    #[test]
    fn zero_capacity_still_holds_one() {
        let mut outbox = Outbox::new(0);
        outbox.push(t(1, 0));
        outbox.push(t(2, 0));
        assert_eq!(outbox.len(), 1);
        assert_eq!(outbox.capacity(), 1);
    }

    proptest! {
        #[test]
        fn never_exceeds_capacity(cap in 1usize..8, xs in proptest::collection::vec(0u16..12, 0..64)) {
            let mut outbox = Outbox::new(cap);
            for x in xs {
                outbox.push(t(x, 0));
                prop_assert!(outbox.len() <= cap);
            }
        }
    }
}
