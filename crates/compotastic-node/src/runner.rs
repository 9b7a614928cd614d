//! Async event loop driving one node over a transport.

use std::collections::VecDeque;
use std::future::Future;
use std::time::{Duration, Instant};

use bytes::Bytes;
use compotastic_learning::{Environment, Policy};
use compotastic_wire::{NodeAddress, Transition};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, trace, warn};

use crate::energy::EnergyModel;
use crate::error::Result;
use crate::node::{Delivery, InboundOutcome, MeshNode, NodeStats, SharedNode};
use crate::outbox::Outbox;
use crate::transport::Transport;

enum Event {
    Frame(Bytes),
    Step,
    Evict,
}

/// Steps an environment, shares what it learns and merges what it hears.
pub struct NodeRunner<T, E> {
    node: SharedNode,
    transport: T,
    env: E,
    policy: Policy,
    outbox: Outbox,
    /// Recently produced transitions, re-shared on a model request.
    recent: VecDeque<Transition>,
    rng: StdRng,
    energy: EnergyModel,
    destination: NodeAddress,
    step_interval: Duration,
    eviction_interval: Duration,
    device_count: usize,
    bytes_sent: u64,
    frames_sent: u64,
}

impl<T, E> NodeRunner<T, E>
where
    T: Transport,
    E: Environment + Send,
{
    pub fn new(node: MeshNode, transport: T, env: E) -> Result<Self> {
        let config = node.config().clone();
        let policy = Policy::new(config.exploration_rate)?;
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        if transport.max_frame_size() < config.max_frame_size {
            warn!(
                "Transport carries {} bytes but node frames up to {}",
                transport.max_frame_size(),
                config.max_frame_size
            );
        }

        Ok(Self {
            node: node.into_shared(),
            transport,
            env,
            policy,
            outbox: Outbox::new(config.outbox_capacity),
            recent: VecDeque::with_capacity(config.outbox_capacity),
            rng,
            energy: EnergyModel::default(),
            destination: NodeAddress::BROADCAST,
            step_interval: config.step_interval,
            eviction_interval: config.eviction_interval,
            device_count: config.device_count,
            bytes_sent: 0,
            frames_sent: 0,
        })
    }

    /// Send to one peer instead of broadcasting.
    #[must_use]
    pub fn with_destination(mut self, destination: NodeAddress) -> Self {
        self.destination = destination;
        self
    }

    pub fn node(&self) -> SharedNode {
        self.node.clone()
    }

    pub fn outbox(&self) -> &Outbox {
        &self.outbox
    }

    /// Take one environment step, learn from it and queue it for sharing.
    pub async fn step(&mut self) -> Result<Transition> {
        let transition = {
            let mut node = self.node.lock().await;
            let state = self.env.position();
            let actions = self.env.available_actions();
            let action = self
                .policy
                .choose_action(node.table(), state, &actions, &mut self.rng)?;
            let transition = self.env.step(action)?;
            node.learn(&transition)?;
            transition
        };

        trace!(
            "Step {} a={} r={} -> {}",
            transition.from,
            transition.action,
            transition.reward,
            transition.to
        );
        if transition.done {
            debug!("Episode finished at {}", transition.to);
            self.env.reset();
        }

        self.outbox.push(transition);
        if self.recent.len() == self.outbox.capacity() {
            self.recent.pop_front();
        }
        self.recent.push_back(transition);
        Ok(transition)
    }

    /// Frame and send everything queued. Returns the number of frames sent.
    pub async fn flush(&mut self) -> usize {
        let frames: Vec<Bytes> = {
            let mut node = self.node.lock().await;
            let destination = self.destination;
            self.outbox
                .drain()
                .filter_map(|t| match node.build_envelope(destination, &t) {
                    Ok(frame) => Some(frame),
                    Err(e) => {
                        warn!("Could not frame transition from {}: {}", t.from, e);
                        None
                    }
                })
                .collect()
        };

        let mut sent = 0;
        for frame in frames {
            sent += usize::from(self.transmit(frame).await);
        }
        if sent > 0 {
            self.log_energy();
        }
        sent
    }

    /// Ask peers to re-share what they have learnt.
    pub async fn request_model(&mut self) -> Result<()> {
        let frame = self.node.lock().await.build_model_request(self.destination)?;
        self.transmit(frame).await;
        Ok(())
    }

    /// Handle one inbound frame.
    pub async fn on_frame(&mut self, frame: &[u8]) -> InboundOutcome {
        let outcome = self.node.lock().await.handle_inbound(frame);
        if let InboundOutcome::Accepted(Delivery::ModelRequest { from }) = outcome {
            debug!("Re-sharing {} transitions for {}", self.recent.len(), from);
            for t in &self.recent {
                self.outbox.push(*t);
            }
        }
        outcome
    }

    /// Run until `shutdown` resolves or the transport closes.
    pub async fn run<F>(mut self, shutdown: F) -> Result<NodeStats>
    where
        F: Future<Output = ()>,
    {
        let mut step = tokio::time::interval(self.step_interval);
        step.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut evict = tokio::time::interval(self.eviction_interval);
        evict.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        if let Err(e) = self.request_model().await {
            warn!("Model request failed: {}", e);
        }

        loop {
            let event = tokio::select! {
                _ = &mut shutdown => break,
                frame = self.transport.recv() => match frame {
                    Some(frame) => Event::Frame(frame),
                    None => {
                        info!("Transport closed");
                        break;
                    }
                },
                _ = step.tick() => Event::Step,
                _ = evict.tick() => Event::Evict,
            };

            match event {
                Event::Frame(frame) => {
                    let outcome = self.on_frame(&frame).await;
                    trace!("Inbound {} bytes: {:?}", frame.len(), outcome);
                }
                Event::Step => {
                    if let Err(e) = self.step().await {
                        warn!("Step failed: {}", e);
                    }
                    self.flush().await;
                }
                Event::Evict => {
                    let stats = {
                        let mut node = self.node.lock().await;
                        node.evict_idle(Instant::now());
                        node.stats()
                    };
                    match serde_json::to_string(&stats) {
                        Ok(json) => debug!("Stats: {}", json),
                        Err(e) => warn!("Could not serialize stats: {}", e),
                    }
                }
            }
        }

        self.flush().await;
        let stats = self.node.lock().await.stats();
        info!("{}", stats);
        Ok(stats)
    }

    async fn transmit(&mut self, frame: Bytes) -> bool {
        let len = frame.len() as u64;
        match self.transport.send(frame).await {
            Ok(()) => {
                self.bytes_sent += len;
                self.frames_sent += 1;
                true
            }
            Err(e) => {
                warn!("Send failed: {}", e);
                false
            }
        }
    }

    fn log_energy(&self) {
        match self.energy.estimate(self.bytes_sent, self.device_count) {
            Ok(est) => debug!(
                "Estimated mesh energy for {} devices after {} frames: {}",
                self.device_count, self.frames_sent, est
            ),
            Err(e) => warn!("Energy estimate unavailable: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NodeConfig;
    use crate::simulated::{LinkProfile, SimulatedMesh};
    use compotastic_learning::GridWorld;
    use compotastic_wire::GridPosition;

    fn runner(
        mesh: &SimulatedMesh,
        address: u32,
    ) -> NodeRunner<crate::simulated::SimulatedLink, GridWorld> {
        let config = NodeConfig::new(NodeAddress::new(address)).with_seed(u64::from(address));
        let node = MeshNode::new(config).unwrap();
        let world = GridWorld::new(8, 8, GridPosition::new(3, 3)).unwrap();
        NodeRunner::new(node, mesh.link(), world).unwrap()
    }

    #[tokio::test]
    async fn step_learns_and_queues() {
        let mesh = SimulatedMesh::new(LinkProfile::default(), 3);
        let mut a = runner(&mesh, 1);

        let t = a.step().await.unwrap();
        assert_eq!(t.from, GridPosition::new(3, 3));
        assert_eq!(a.outbox().len(), 1);
        assert_eq!(a.node().lock().await.stats().local_updates, 1);
    }

    #[tokio::test]
    async fn flushed_steps_reach_peers() {
        let mesh = SimulatedMesh::new(LinkProfile::default(), 3);
        let mut a = runner(&mesh, 1);
        let mut b = runner(&mesh, 2);

        a.step().await.unwrap();
        assert_eq!(a.flush().await, 1);
        assert!(a.outbox().is_empty());

        let frame = b.transport.recv().await.unwrap();
        assert!(b.on_frame(&frame).await.is_accepted());
        assert_eq!(b.node().lock().await.stats().merged, 1);
    }

    #[tokio::test]
    async fn model_request_requeues_recent_steps() {
        let mesh = SimulatedMesh::new(LinkProfile::default(), 3);
        let mut a = runner(&mesh, 1);
        let mut b = runner(&mesh, 2);

        b.step().await.unwrap();
        b.flush().await;
        a.request_model().await.unwrap();

        // b hears the request and queues its history again.
        let frame = b.transport.recv().await.unwrap();
        assert!(b.on_frame(&frame).await.is_accepted());
        assert_eq!(b.outbox().len(), 1);
    }

    #[tokio::test]
    async fn run_stops_on_shutdown() {
        let mesh = SimulatedMesh::new(LinkProfile::default(), 3);
        let a = runner(&mesh, 1);
        let stats = a.run(async {}).await.unwrap();
        assert_eq!(stats.address, NodeAddress::new(1));
    }
}
