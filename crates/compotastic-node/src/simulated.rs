//! In-process mesh with configurable loss, duplication and reordering.

use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::bail;
use bytes::Bytes;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::mpsc;

use crate::transport::Transport;

/// How badly the simulated radio behaves.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinkProfile {
    /// Probability a frame never reaches a given peer.
    pub loss: f64,
    /// Probability a delivered frame arrives twice.
    pub duplication: f64,
    /// Probability a frame is held back and sent after the next one.
    pub reorder: f64,
    pub max_frame_size: usize,
}

impl Default for LinkProfile {
    fn default() -> Self {
        Self {
            loss: 0.0,
            duplication: 0.0,
            reorder: 0.0,
            max_frame_size: compotastic_wire::DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

impl LinkProfile {
    #[must_use]
    pub fn with_loss(mut self, loss: f64) -> Self {
        self.loss = loss;
        self
    }

    #[must_use]
    pub fn with_duplication(mut self, duplication: f64) -> Self {
        self.duplication = duplication;
        self
    }

    #[must_use]
    pub fn with_reorder(mut self, reorder: f64) -> Self {
        self.reorder = reorder;
        self
    }

    #[must_use]
    pub fn with_max_frame_size(mut self, max_frame_size: usize) -> Self {
        self.max_frame_size = max_frame_size;
        self
    }
}

#[derive(Debug, Default)]
struct Hub {
    members: Vec<(usize, mpsc::UnboundedSender<Bytes>)>,
}

/// A shared broadcast medium. Every frame a link sends is offered to every
/// other link.
#[derive(Debug, Clone)]
pub struct SimulatedMesh {
    hub: Arc<Mutex<Hub>>,
    profile: LinkProfile,
    seed: u64,
}

impl SimulatedMesh {
    pub fn new(profile: LinkProfile, seed: u64) -> Self {
        Self {
            hub: Arc::new(Mutex::new(Hub::default())),
            profile,
            seed,
        }
    }

    /// Attach a new link.
    pub fn link(&self) -> SimulatedLink {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = {
            let mut hub = lock(&self.hub);
            let id = hub.members.len();
            hub.members.push((id, tx));
            id
        };
        SimulatedLink {
            id,
            hub: Arc::clone(&self.hub),
            rx,
            profile: self.profile,
            rng: StdRng::seed_from_u64(self.seed.wrapping_add(id as u64)),
            held: None,
        }
    }
}

fn lock(hub: &Mutex<Hub>) -> MutexGuard<'_, Hub> {
    hub.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// One node's attachment to a [`SimulatedMesh`].
#[derive(Debug)]
pub struct SimulatedLink {
    id: usize,
    hub: Arc<Mutex<Hub>>,
    rx: mpsc::UnboundedReceiver<Bytes>,
    profile: LinkProfile,
    rng: StdRng,
    held: Option<Bytes>,
}

impl SimulatedLink {
    /// Inbound frame if one is already waiting.
    pub fn try_recv(&mut self) -> Option<Bytes> {
        self.rx.try_recv().ok()
    }

    /// Release a frame held back for reordering.
    pub fn flush(&mut self) {
        if let Some(late) = self.held.take() {
            self.fan_out(late);
        }
    }

    fn fan_out(&mut self, frame: Bytes) {
        let hub = lock(&self.hub);
        for (id, tx) in &hub.members {
            if *id == self.id || self.rng.gen::<f64>() < self.profile.loss {
                continue;
            }
            let copies = if self.rng.gen::<f64>() < self.profile.duplication {
                2
            } else {
                1
            };
            for _ in 0..copies {
                // A dropped receiver is a node that left the mesh.
                let _ = tx.send(frame.clone());
            }
        }
    }
}

impl Transport for SimulatedLink {
    fn max_frame_size(&self) -> usize {
        self.profile.max_frame_size
    }

    async fn send(&mut self, frame: Bytes) -> anyhow::Result<()> {
        if frame.len() > self.profile.max_frame_size {
            bail!(
                "frame of {} bytes exceeds maximum {}",
                frame.len(),
                self.profile.max_frame_size
            );
        }

        if self.held.is_none() && self.rng.gen::<f64>() < self.profile.reorder {
            self.held = Some(frame);
            return Ok(());
        }
        self.fan_out(frame);
        self.flush();
        Ok(())
    }

    async fn recv(&mut self) -> Option<Bytes> {
        self.rx.recv().await
    }
}
