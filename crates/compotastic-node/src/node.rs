//! One node's protocol state and receive path.
//!
//! A [`MeshNode`] owns everything a node needs to take part in the mesh:
//! its dedup registry, value table, merge engine and outgoing sequence
//! counters. Inbound frames go through
//!
//! ```text
//! decode -> echo check -> addressing -> payload check -> dedup -> merge
//! ```
//!
//! and every step that rejects a frame reports an [`InboundOutcome`]
//! instead of an error. Nothing on the receive path panics or propagates.

use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use compotastic_dedup::{DedupRegistry, DedupStats, StreamKey, Verdict};
use compotastic_learning::{MergeEngine, MergeOutcome, ValueTable};
use compotastic_wire::{
    Envelope, NodeAddress, Payload, SequenceCounter, SequenceNumber, Transition,
};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, trace};

use crate::config::NodeConfig;
use crate::error::Result;

/// A node shared between tasks.
///
/// The whole receive sequence runs under this one lock, so dedup and merge
/// never interleave for two frames.
pub type SharedNode = Arc<Mutex<MeshNode>>;

/// What an accepted frame delivered.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Delivery {
    /// A peer's transition, already merged into the table.
    Transition(MergeOutcome),
    /// A peer asked the mesh to re-share what it has learnt.
    ModelRequest { from: NodeAddress },
}

/// Result of handling one inbound frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InboundOutcome {
    Accepted(Delivery),
    Duplicate,
    StaleDuplicate,
    /// New stream while the dedup registry is full of active ones; dropped.
    Untracked,
    MalformedEnvelope,
    /// Unknown payload type or protocol version; skipped.
    Unsupported,
    /// Unicast frame for another node.
    NotAddressed,
}

impl InboundOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, InboundOutcome::Accepted(_))
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Counters {
    merged: u64,
    model_requests: u64,
    duplicates: u64,
    stale: u64,
    untracked: u64,
    echoes: u64,
    malformed: u64,
    unsupported: u64,
    not_addressed: u64,
    frames_built: u64,
    local_updates: u64,
}

/// Snapshot of a node's counters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct NodeStats {
    pub address: NodeAddress,
    /// Remote transitions merged.
    pub merged: u64,
    pub model_requests: u64,
    /// Includes `echoes`.
    pub duplicates: u64,
    pub stale: u64,
    pub untracked: u64,
    /// Own frames heard back from the mesh.
    pub echoes: u64,
    pub malformed: u64,
    pub unsupported: u64,
    pub not_addressed: u64,
    pub frames_built: u64,
    /// Local transitions merged.
    pub local_updates: u64,
    pub tracked_streams: usize,
    pub table_states: usize,
    pub dedup: DedupStats,
}

impl std::fmt::Display for NodeStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Node {}: {} merged ({} local), {} dup, {} stale, {} malformed, {} streams, {} states",
            self.address,
            self.merged,
            self.local_updates,
            self.duplicates,
            self.stale,
            self.malformed,
            self.tracked_streams,
            self.table_states
        )
    }
}

/// Protocol state for one mesh node.
#[derive(Debug)]
pub struct MeshNode {
    config: NodeConfig,
    dedup: DedupRegistry,
    table: ValueTable,
    engine: MergeEngine,
    counter: SequenceCounter,
    counters: Counters,
}

impl MeshNode {
    pub fn new(config: NodeConfig) -> Result<Self> {
        config.validate()?;
        let dedup = DedupRegistry::new(config.dedup)?;
        let engine = MergeEngine::new(config.learning)?;

        info!(
            "Node {} ready (max frame {} bytes, dedup window {})",
            config.address, config.max_frame_size, config.dedup.window
        );

        Ok(Self {
            config,
            dedup,
            table: ValueTable::new(),
            engine,
            counter: SequenceCounter::new(),
            counters: Counters::default(),
        })
    }

    /// Wrap into a [`SharedNode`].
    pub fn into_shared(self) -> SharedNode {
        Arc::new(Mutex::new(self))
    }

    pub fn address(&self) -> NodeAddress {
        self.config.address
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn table(&self) -> &ValueTable {
        &self.table
    }

    /// Step word for a transition.
    pub fn encode_transition(&self, transition: &Transition) -> Result<u32> {
        Ok(compotastic_wire::encode_transition(transition)?)
    }

    /// Frame a transition for `destination`, consuming the next sequence
    /// number on that channel.
    pub fn build_envelope(&mut self, destination: NodeAddress, transition: &Transition) -> Result<Bytes> {
        let (_, frame) = self.next_state_update(destination, transition)?;
        Ok(frame)
    }

    /// Frame a model request for `destination`.
    pub fn build_model_request(&mut self, destination: NodeAddress) -> Result<Bytes> {
        let sequence = self.counter.next_for(destination);
        let frame = Envelope::model_request(self.config.address, destination, sequence)
            .encode(self.config.max_frame_size)?;
        self.counters.frames_built += 1;
        Ok(frame)
    }

    /// Merge a locally produced transition sent as `sequence`.
    ///
    /// The copy the mesh may echo back carries this node's address and is
    /// dropped by [`handle_inbound`](Self::handle_inbound), so the
    /// transition is applied here exactly once.
    pub fn record_local(
        &mut self,
        transition: &Transition,
        sequence: SequenceNumber,
        destination: NodeAddress,
    ) -> Result<MergeOutcome> {
        let outcome = self.learn(transition)?;
        trace!("Recorded own {} for {}", sequence, destination);
        Ok(outcome)
    }

    /// Merge a local transition that has not been framed yet.
    pub fn learn(&mut self, transition: &Transition) -> Result<MergeOutcome> {
        transition.validate()?;
        self.counters.local_updates += 1;
        Ok(self.engine.apply(&mut self.table, transition))
    }

    /// Frame a transition and merge it locally.
    pub fn share(&mut self, destination: NodeAddress, transition: &Transition) -> Result<Bytes> {
        let (sequence, frame) = self.next_state_update(destination, transition)?;
        self.record_local(transition, sequence, destination)?;
        Ok(frame)
    }

    /// Handle a received frame.
    pub fn handle_inbound(&mut self, frame: &[u8]) -> InboundOutcome {
        self.handle_inbound_at(frame, Instant::now())
    }

    /// Handle a received frame at an explicit time.
    pub fn handle_inbound_at(&mut self, frame: &[u8], now: Instant) -> InboundOutcome {
        let envelope = match Envelope::decode(frame) {
            Ok(envelope) => envelope,
            Err(e) => {
                debug!("Dropping frame ({}): {}", e, hex::encode(frame));
                self.counters.malformed += 1;
                return InboundOutcome::MalformedEnvelope;
            }
        };
        let hdr = envelope.hdr;

        // Our own frame relayed back; it was merged when it was sent.
        if hdr.source == self.config.address {
            trace!("Echo of own {}", hdr.sequence);
            self.counters.echoes += 1;
            self.counters.duplicates += 1;
            return InboundOutcome::Duplicate;
        }

        if !hdr.destination.is_broadcast() && hdr.destination != self.config.address {
            trace!("Frame from {} is for {}", hdr.source, hdr.destination);
            self.counters.not_addressed += 1;
            return InboundOutcome::NotAddressed;
        }

        let transition = match &envelope.payload {
            Payload::StateUpdate(update) => match update.to_transition() {
                Ok(t) => Some(t),
                Err(reason) => {
                    debug!(
                        "Dropping state update from {} ({}): {}",
                        hdr.source,
                        reason,
                        hex::encode(frame)
                    );
                    self.counters.malformed += 1;
                    return InboundOutcome::MalformedEnvelope;
                }
            },
            Payload::ModelRequest => None,
            Payload::Unsupported { tag, .. } => {
                trace!(
                    "Skipping payload type {:#04x} v{} from {}",
                    tag,
                    hdr.version,
                    hdr.source
                );
                self.counters.unsupported += 1;
                return InboundOutcome::Unsupported;
            }
        };

        let key = StreamKey::new(hdr.source, hdr.channel());
        match self.dedup.observe(key, hdr.sequence, now) {
            Verdict::Accepted => {}
            Verdict::Duplicate => {
                self.counters.duplicates += 1;
                return InboundOutcome::Duplicate;
            }
            Verdict::StaleDuplicate => {
                self.counters.stale += 1;
                return InboundOutcome::StaleDuplicate;
            }
            Verdict::Untracked => {
                self.counters.untracked += 1;
                return InboundOutcome::Untracked;
            }
        }

        let delivery = match transition {
            Some(t) => {
                let outcome = self.engine.apply(&mut self.table, &t);
                self.counters.merged += 1;
                debug!(
                    "Merged {} {} from {}: {:.4} -> {:.4}",
                    hdr.sequence, t.from, hdr.source, outcome.previous, outcome.updated
                );
                Delivery::Transition(outcome)
            }
            None => {
                self.counters.model_requests += 1;
                debug!("Model request {} from {}", hdr.sequence, hdr.source);
                Delivery::ModelRequest { from: hdr.source }
            }
        };
        InboundOutcome::Accepted(delivery)
    }

    /// Forget streams that have gone quiet.
    pub fn evict_idle(&mut self, now: Instant) -> usize {
        self.dedup.evict_idle(now)
    }

    pub fn stats(&self) -> NodeStats {
        let c = &self.counters;
        NodeStats {
            address: self.config.address,
            merged: c.merged,
            model_requests: c.model_requests,
            duplicates: c.duplicates,
            stale: c.stale,
            untracked: c.untracked,
            echoes: c.echoes,
            malformed: c.malformed,
            unsupported: c.unsupported,
            not_addressed: c.not_addressed,
            frames_built: c.frames_built,
            local_updates: c.local_updates,
            tracked_streams: self.dedup.len(),
            table_states: self.table.len(),
            dedup: self.dedup.stats(),
        }
    }

    fn next_state_update(
        &mut self,
        destination: NodeAddress,
        transition: &Transition,
    ) -> Result<(SequenceNumber, Bytes)> {
        // Validate before a number is spent.
        transition.validate()?;
        let sequence = self.counter.next_for(destination);
        let frame = compotastic_wire::build_envelope(
            self.config.address,
            destination,
            sequence,
            transition,
            self.config.max_frame_size,
        )?;
        self.counters.frames_built += 1;
        trace!("Built {} for {} ({} bytes)", sequence, destination, frame.len());
        Ok((sequence, frame))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use compotastic_dedup::DedupConfig;
    use compotastic_learning::ValueStore;
    use compotastic_wire::{GridPosition, WireError};

    const A: NodeAddress = NodeAddress(0xa);
    const B: NodeAddress = NodeAddress(0xb);
    const C: NodeAddress = NodeAddress(0xc);

    fn node(address: NodeAddress) -> MeshNode {
        MeshNode::new(NodeConfig::new(address)).unwrap()
    }

    fn up_from_3_4() -> Transition {
        Transition::new(GridPosition::new(3, 4), 0, 5, GridPosition::new(3, 3), false)
    }

    #[test]
    fn first_frame_uses_sequence_one() {
        let mut a = node(A);
        let frame = a.build_envelope(NodeAddress::BROADCAST, &up_from_3_4()).unwrap();
        let env = Envelope::decode(&frame).unwrap();
        assert_eq!(env.hdr.sequence, SequenceNumber(1));
        assert_eq!(env.hdr.source, A);
        assert_eq!(frame.len(), 25);
    }

    #[test]
    fn merge_once_then_duplicate() {
        let mut a = node(A);
        let mut b = node(B);
        let frame = a.build_envelope(NodeAddress::BROADCAST, &up_from_3_4()).unwrap();

        let first = b.handle_inbound(&frame);
        let InboundOutcome::Accepted(Delivery::Transition(outcome)) = first else {
            panic!("expected a merged transition, got {:?}", first);
        };
        assert!((outcome.updated - 0.5).abs() < 1e-12);

        let before = b.table().get(GridPosition::new(3, 4));
        assert_eq!(b.handle_inbound(&frame), InboundOutcome::Duplicate);
        assert_eq!(b.table().get(GridPosition::new(3, 4)), before);
        assert_eq!(b.stats().merged, 1);
        assert_eq!(b.stats().duplicates, 1);
    }

    #[test]
    fn echo_of_own_frame_rejected() {
        let mut a = node(A);
        let frame = a.share(NodeAddress::BROADCAST, &up_from_3_4()).unwrap();
        let value = a.table().value(GridPosition::new(3, 4), 0);

        assert_eq!(a.handle_inbound(&frame), InboundOutcome::Duplicate);
        assert_eq!(a.table().value(GridPosition::new(3, 4), 0), value);
        assert_eq!(a.stats().local_updates, 1);
        assert_eq!(a.stats().echoes, 1);
        // Sending does not occupy the dedup registry.
        assert_eq!(a.stats().tracked_streams, 0);
    }

    #[test]
    fn echo_rejected_after_hearing_many_peers() {
        let config = NodeConfig::new(A).with_dedup(DedupConfig::default().with_capacity(2));
        let mut a = MeshNode::new(config).unwrap();
        let own = a.share(NodeAddress::BROADCAST, &up_from_3_4()).unwrap();

        for peer in [B, C, NodeAddress(0xd)] {
            let mut p = node(peer);
            let frame = p.build_envelope(NodeAddress::BROADCAST, &up_from_3_4()).unwrap();
            a.handle_inbound(&frame);
        }
        let value = a.table().value(GridPosition::new(3, 4), 0);

        assert_eq!(a.handle_inbound(&own), InboundOutcome::Duplicate);
        assert_eq!(a.table().value(GridPosition::new(3, 4), 0), value);
        assert_eq!(a.stats().local_updates, 1);
        assert_eq!(a.stats().echoes, 1);
    }

    #[test]
    fn busy_registry_does_not_remerge_live_stream() {
        let config = NodeConfig::new(B).with_dedup(DedupConfig::default().with_capacity(2));
        let mut b = MeshNode::new(config).unwrap();
        let t0 = Instant::now();
        let secs = |n| t0 + std::time::Duration::from_secs(n);

        let from_a = node(A).build_envelope(NodeAddress::BROADCAST, &up_from_3_4()).unwrap();
        let from_c = node(C).build_envelope(NodeAddress::BROADCAST, &up_from_3_4()).unwrap();
        let from_d = node(NodeAddress(0xd))
            .build_envelope(NodeAddress::BROADCAST, &up_from_3_4())
            .unwrap();

        assert!(b.handle_inbound_at(&from_a, t0).is_accepted());
        assert!(b.handle_inbound_at(&from_c, secs(1)).is_accepted());
        assert_eq!(b.handle_inbound_at(&from_d, secs(2)), InboundOutcome::Untracked);

        let before = b.table().value(GridPosition::new(3, 4), 0);
        assert_eq!(b.handle_inbound_at(&from_a, secs(3)), InboundOutcome::Duplicate);
        assert_eq!(b.table().value(GridPosition::new(3, 4), 0), before);

        let stats = b.stats();
        assert_eq!(stats.merged, 2);
        assert_eq!(stats.untracked, 1);
        assert_eq!(stats.dedup.untracked, 1);
    }

    #[test]
    fn unicast_for_someone_else_ignored() {
        let mut a = node(A);
        let mut c = node(C);
        let frame = a.build_envelope(B, &up_from_3_4()).unwrap();
        assert_eq!(c.handle_inbound(&frame), InboundOutcome::NotAddressed);
        assert!(c.table().is_empty());
    }

    #[test]
    fn direct_and_broadcast_streams_are_separate() {
        let mut a = node(A);
        let mut b = node(B);
        let direct = a.build_envelope(B, &up_from_3_4()).unwrap();
        let bcast = a.build_envelope(NodeAddress::BROADCAST, &up_from_3_4()).unwrap();

        // Both carry sequence 1 on different channels.
        assert!(b.handle_inbound(&direct).is_accepted());
        assert!(b.handle_inbound(&bcast).is_accepted());
        assert_eq!(b.stats().tracked_streams, 2);
    }

    #[test]
    fn malformed_frames_counted() {
        let mut b = node(B);
        assert_eq!(b.handle_inbound(&[1, 2, 3]), InboundOutcome::MalformedEnvelope);

        let mut a = node(A);
        let frame = a.build_envelope(NodeAddress::BROADCAST, &up_from_3_4()).unwrap();
        let mut corrupted = frame.to_vec();
        // Flip a bit in the step word's x coordinate.
        corrupted[21] ^= 0x04;
        assert_eq!(b.handle_inbound(&corrupted), InboundOutcome::MalformedEnvelope);

        assert_eq!(b.stats().malformed, 2);
        assert_eq!(b.stats().tracked_streams, 0);
        // The sequence number was not consumed by the corrupted copy.
        assert!(b.handle_inbound(&frame).is_accepted());
    }

    #[test]
    fn unknown_payload_type_skipped() {
        let mut b = node(B);
        let mut frame = vec![1u8, 0x7f];
        frame.extend_from_slice(&A.0.to_le_bytes());
        frame.extend_from_slice(&0u32.to_le_bytes());
        frame.extend_from_slice(&9u16.to_le_bytes());
        frame.push(2);
        frame.extend_from_slice(&[0xde, 0xad]);

        assert_eq!(b.handle_inbound(&frame), InboundOutcome::Unsupported);
        assert_eq!(b.stats().unsupported, 1);
        assert!(b.table().is_empty());
    }

    #[test]
    fn model_request_delivered() {
        let mut a = node(A);
        let mut b = node(B);
        let frame = a.build_model_request(NodeAddress::BROADCAST).unwrap();
        assert_eq!(
            b.handle_inbound(&frame),
            InboundOutcome::Accepted(Delivery::ModelRequest { from: A })
        );
        assert_eq!(b.handle_inbound(&frame), InboundOutcome::Duplicate);
    }

    #[test]
    fn invalid_transition_fails_fast_without_spending_a_number() {
        let mut a = node(A);
        let bad = Transition::new(GridPosition::new(2000, 1), 0, 0, GridPosition::new(1, 1), false);
        assert!(matches!(
            a.build_envelope(NodeAddress::BROADCAST, &bad),
            Err(crate::Error::Wire(WireError::FieldOutOfRange { field: "from.x", .. }))
        ));
        assert!(a.encode_transition(&bad).is_err());

        let frame = a.build_envelope(NodeAddress::BROADCAST, &up_from_3_4()).unwrap();
        assert_eq!(Envelope::decode(&frame).unwrap().hdr.sequence, SequenceNumber(1));
    }

    #[test]
    fn stats_display() {
        let b = node(B);
        let text = b.stats().to_string();
        assert!(text.starts_with("Node !0000000b"));
    }

    #[tokio::test]
    async fn shared_node_serializes_receive() {
        let shared = node(B).into_shared();
        let mut a = node(A);
        let frame = a.build_envelope(NodeAddress::BROADCAST, &up_from_3_4()).unwrap();

        let mut handles = Vec::new();
        for _ in 0..4 {
            let shared = shared.clone();
            let frame = frame.clone();
            handles.push(tokio::spawn(async move {
                shared.lock().await.handle_inbound(&frame).is_accepted()
            }));
        }

        let mut accepted = 0;
        for h in handles {
            if h.await.unwrap() {
                accepted += 1;
            }
        }
        assert_eq!(accepted, 1);
        assert_eq!(shared.lock().await.stats().merged, 1);
    }
}
