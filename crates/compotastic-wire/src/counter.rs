//! Outgoing sequence counters, one per destination channel.

use std::collections::HashMap;

use crate::types::{Channel, NodeAddress, SequenceNumber};

/// Per-channel outgoing sequence numbers for one sender.
///
/// Each channel starts at 1 and wraps modulo 2^16. The counter is owned by
/// the sending node and is never shared.
#[derive(Debug, Default)]
pub struct SequenceCounter {
    next: HashMap<Channel, SequenceNumber>,
}

impl SequenceCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next sequence number for `destination`'s channel.
    pub fn next_for(&mut self, destination: NodeAddress) -> SequenceNumber {
        let slot = self
            .next
            .entry(Channel::for_destination(destination))
            .or_insert(SequenceNumber(1));
        let seq = *slot;
        *slot = seq.next();
        seq
    }

    /// Last number handed out on a channel, if any.
    pub fn last_for(&self, destination: NodeAddress) -> Option<SequenceNumber> {
        self.next
            .get(&Channel::for_destination(destination))
            .map(|n| SequenceNumber(n.0.wrapping_sub(1)))
    }

    /// Number of channels in use.
    pub fn channels(&self) -> usize {
        self.next.len()
    }
}
