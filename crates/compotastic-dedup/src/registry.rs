//! Replay windows for every stream a node hears.

use std::collections::HashMap;
use std::time::Instant;

use compotastic_wire::{Channel, NodeAddress, SequenceNumber};
use serde::Serialize;
use tracing::{debug, trace};

use crate::config::{DedupConfig, DedupError};
use crate::window::{DedupWindow, Verdict};

/// One sender's sequence stream as seen by the receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StreamKey {
    pub source: NodeAddress,
    pub channel: Channel,
}

impl StreamKey {
    pub fn new(source: NodeAddress, channel: Channel) -> Self {
        Self { source, channel }
    }

    /// Key for a source's broadcast stream.
    pub fn broadcast(source: NodeAddress) -> Self {
        Self::new(source, Channel::Broadcast)
    }
}

impl std::fmt::Display for StreamKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.channel {
            Channel::Broadcast => write!(f, "{}/broadcast", self.source),
            Channel::Direct(to) => write!(f, "{}->{}", self.source, to),
        }
    }
}

/// Counters for observability.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DedupStats {
    pub accepted: u64,
    pub duplicates: u64,
    pub stale: u64,
    pub idle_evictions: u64,
    pub capacity_evictions: u64,
    /// New streams dropped because every tracked one was still active.
    pub untracked: u64,
}

/// Per-stream dedup state with a hard bound on tracked streams.
///
/// Records are created on first contact, refreshed on every accepted
/// number, and dropped once idle past `idle_timeout`. When a new stream
/// arrives at capacity, idle records go first, then the least recently
/// active one provided it has been silent for `eviction_grace`. If every
/// record is busier than that the new stream is not tracked and its frame
/// is reported as [`Verdict::Untracked`].
#[derive(Debug)]
pub struct DedupRegistry {
    config: DedupConfig,
    records: HashMap<StreamKey, DedupWindow>,
    stats: DedupStats,
}

impl DedupRegistry {
    pub fn new(config: DedupConfig) -> Result<Self, DedupError> {
        config.validate()?;
        Ok(Self {
            config,
            records: HashMap::with_capacity(config.capacity),
            stats: DedupStats::default(),
        })
    }

    pub fn config(&self) -> &DedupConfig {
        &self.config
    }

    /// Offer a sequence number for a stream.
    pub fn observe(&mut self, key: StreamKey, seq: SequenceNumber, now: Instant) -> Verdict {
        let verdict = if let Some(window) = self.records.get_mut(&key) {
            window.observe(seq, now)
        } else if self.make_room(now) {
            self.records
                .insert(key, DedupWindow::new(seq, self.config.window, now));
            debug!("Tracking new stream {} at {}", key, seq);
            Verdict::Accepted
        } else {
            Verdict::Untracked
        };

        match verdict {
            Verdict::Accepted => self.stats.accepted += 1,
            Verdict::Duplicate => {
                self.stats.duplicates += 1;
                trace!("Duplicate {} from {}", seq, key);
            }
            Verdict::StaleDuplicate => {
                self.stats.stale += 1;
                trace!("Stale {} from {}", seq, key);
            }
            Verdict::Untracked => {
                self.stats.untracked += 1;
                debug!("Registry full of active streams, dropping {} from {}", seq, key);
            }
        }
        verdict
    }

    /// Would `seq` be accepted? Does not create or modify records.
    pub fn check(&self, key: &StreamKey, seq: SequenceNumber) -> Verdict {
        self.records
            .get(key)
            .map_or(Verdict::Accepted, |w| w.check(seq))
    }

    /// Drop streams idle longer than the configured timeout.
    /// Returns the number of records removed.
    pub fn evict_idle(&mut self, now: Instant) -> usize {
        let max_idle = self.config.idle_timeout;
        let before = self.records.len();
        self.records.retain(|_, w| w.idle_for(now) <= max_idle);
        let evicted = before - self.records.len();

        if evicted > 0 {
            self.stats.idle_evictions += evicted as u64;
            debug!("Evicted {} idle dedup records", evicted);
        }
        evicted
    }

    /// Free a slot for a new stream if the registry is full. Only a record
    /// silent for at least `eviction_grace` may go; returns false if none is.
    fn make_room(&mut self, now: Instant) -> bool {
        if self.records.len() < self.config.capacity {
            return true;
        }
        self.evict_idle(now);
        if self.records.len() < self.config.capacity {
            return true;
        }

        let grace = self.config.eviction_grace;
        let oldest = self
            .records
            .iter()
            .filter(|(_, w)| w.idle_for(now) >= grace)
            .min_by_key(|(_, w)| w.last_activity())
            .map(|(k, _)| *k);
        match oldest {
            Some(key) => {
                self.records.remove(&key);
                self.stats.capacity_evictions += 1;
                debug!("Registry full, evicted least recently active {}", key);
                true
            }
            None => false,
        }
    }

    pub fn get(&self, key: &StreamKey) -> Option<&DedupWindow> {
        self.records.get(key)
    }

    pub fn contains(&self, key: &StreamKey) -> bool {
        self.records.contains_key(key)
    }

    /// Number of tracked streams.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn stats(&self) -> DedupStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn key(n: u32) -> StreamKey {
        StreamKey::broadcast(NodeAddress::new(n))
    }

    #[test]
    fn dedup_acceptance_sequence() {
        let mut reg = DedupRegistry::new(DedupConfig::default().with_window(2)).unwrap();
        let now = Instant::now();
        let a = key(0xa);

        assert_eq!(reg.observe(a, SequenceNumber(5), now), Verdict::Accepted);
        assert_eq!(reg.observe(a, SequenceNumber(5), now), Verdict::Duplicate);
        assert_eq!(reg.observe(a, SequenceNumber(3), now), Verdict::StaleDuplicate);
        assert_eq!(reg.observe(a, SequenceNumber(6), now), Verdict::Accepted);

        let stats = reg.stats();
        assert_eq!(stats.accepted, 2);
        assert_eq!(stats.duplicates, 1);
        assert_eq!(stats.stale, 1);
    }

    #[test]
    fn streams_are_independent() {
        let mut reg = DedupRegistry::new(DedupConfig::default()).unwrap();
        let now = Instant::now();
        let src = NodeAddress::new(1);
        let me = NodeAddress::new(2);

        let bcast = StreamKey::new(src, Channel::Broadcast);
        let direct = StreamKey::new(src, Channel::Direct(me));

        assert!(reg.observe(bcast, SequenceNumber(1), now).is_accepted());
        assert!(reg.observe(direct, SequenceNumber(1), now).is_accepted());
        assert!(reg.observe(key(3), SequenceNumber(1), now).is_accepted());
        assert_eq!(reg.len(), 3);
    }

    #[test]
    fn check_has_no_side_effects() {
        let reg = DedupRegistry::new(DedupConfig::default()).unwrap();
        assert_eq!(reg.check(&key(1), SequenceNumber(1)), Verdict::Accepted);
        assert!(reg.is_empty());
    }

    #[test]
    fn idle_records_evicted() {
        let cfg = DedupConfig::default().with_idle_timeout(Duration::from_secs(60));
        let mut reg = DedupRegistry::new(cfg).unwrap();
        let t0 = Instant::now();

        reg.observe(key(1), SequenceNumber(1), t0);
        reg.observe(key(2), SequenceNumber(1), t0 + Duration::from_secs(50));

        let evicted = reg.evict_idle(t0 + Duration::from_secs(100));
        assert_eq!(evicted, 1);
        assert!(!reg.contains(&key(1)));
        assert!(reg.contains(&key(2)));
        assert_eq!(reg.stats().idle_evictions, 1);
    }

    #[test]
    fn evicted_stream_starts_fresh() {
        let cfg = DedupConfig::default().with_idle_timeout(Duration::from_secs(1));
        let mut reg = DedupRegistry::new(cfg).unwrap();
        let t0 = Instant::now();

        reg.observe(key(1), SequenceNumber(500), t0);
        reg.evict_idle(t0 + Duration::from_secs(5));

        // A rebooted sender restarting at 1 is accepted again.
        let later = t0 + Duration::from_secs(6);
        assert!(reg.observe(key(1), SequenceNumber(1), later).is_accepted());
    }

    #[test]
    fn memory_bounded_by_capacity() {
        let cfg = DedupConfig::default()
            .with_capacity(16)
            .with_idle_timeout(Duration::from_secs(10))
            .with_eviction_grace(Duration::from_millis(500));
        let mut reg = DedupRegistry::new(cfg).unwrap();
        let t0 = Instant::now();

        for n in 1..=5_000u32 {
            let now = t0 + Duration::from_millis(u64::from(n) * 50);
            assert!(reg.observe(key(n), SequenceNumber(1), now).is_accepted());
            assert!(reg.len() <= 16);
        }

        let stats = reg.stats();
        assert_eq!(reg.len(), 16);
        assert_eq!(stats.untracked, 0);
        assert!(stats.idle_evictions + stats.capacity_evictions >= 5_000 - 16);
    }

    #[test]
    fn full_registry_drops_least_recently_active() {
        let cfg = DedupConfig::default()
            .with_capacity(2)
            .with_eviction_grace(Duration::from_secs(1));
        let mut reg = DedupRegistry::new(cfg).unwrap();
        let t0 = Instant::now();

        reg.observe(key(1), SequenceNumber(1), t0);
        reg.observe(key(2), SequenceNumber(1), t0 + Duration::from_secs(1));
        reg.observe(key(1), SequenceNumber(2), t0 + Duration::from_secs(2));
        reg.observe(key(3), SequenceNumber(1), t0 + Duration::from_secs(3));

        assert!(reg.contains(&key(1)));
        assert!(!reg.contains(&key(2)));
        assert!(reg.contains(&key(3)));
        assert_eq!(reg.stats().capacity_evictions, 1);
    }

    #[test]
    fn full_registry_keeps_active_streams() {
        let cfg = DedupConfig::default()
            .with_capacity(2)
            .with_idle_timeout(Duration::from_secs(600));
        let mut reg = DedupRegistry::new(cfg).unwrap();
        let t0 = Instant::now();

        assert!(reg.observe(key(1), SequenceNumber(5), t0).is_accepted());
        assert!(reg
            .observe(key(2), SequenceNumber(1), t0 + Duration::from_secs(1))
            .is_accepted());
        assert_eq!(
            reg.observe(key(3), SequenceNumber(1), t0 + Duration::from_secs(2)),
            Verdict::Untracked
        );

        // The retransmission is still recognised.
        assert_eq!(
            reg.observe(key(1), SequenceNumber(5), t0 + Duration::from_secs(3)),
            Verdict::Duplicate
        );
        assert!(!reg.contains(&key(3)));
        assert_eq!(reg.stats().untracked, 1);
        assert_eq!(reg.stats().capacity_evictions, 0);

        // Once stream 1 has been quiet past the grace period it can go.
        let later = t0 + Duration::from_secs(40);
        assert!(reg.observe(key(3), SequenceNumber(1), later).is_accepted());
        assert!(!reg.contains(&key(1)));
        assert!(reg.contains(&key(2)));
        assert_eq!(reg.stats().capacity_evictions, 1);
    }
}
