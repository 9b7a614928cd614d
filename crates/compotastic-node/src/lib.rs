//! Compotastic Node - a learning agent on a lossy radio mesh
//!
//! Ties the wire format, dedup windows and merge engine together into one
//! node that:
//! - frames its own transitions with per-channel sequence numbers
//! - merges each peer transition at most once, whatever the mesh does to it
//! - queues outgoing transitions without ever blocking the learner
//! - runs over UDP or an in-process simulated mesh
//!
//! # Example
//!
//! ```rust
//! use compotastic_node::{InboundOutcome, MeshNode, NodeConfig};
//! use compotastic_wire::{GridPosition, NodeAddress, Transition};
//!
//! let mut a = MeshNode::new(NodeConfig::new(NodeAddress::new(1)))?;
//! let mut b = MeshNode::new(NodeConfig::new(NodeAddress::new(2)))?;
//!
//! let step = Transition::new(GridPosition::new(3, 4), 0, 5, GridPosition::new(3, 3), false);
//! let frame = a.share(NodeAddress::BROADCAST, &step)?;
//!
//! assert!(b.handle_inbound(&frame).is_accepted());
//! assert_eq!(b.handle_inbound(&frame), InboundOutcome::Duplicate);
//! # Ok::<(), compotastic_node::Error>(())
//! ```

pub mod config;
pub mod energy;
pub mod error;
pub mod node;
pub mod outbox;
pub mod runner;
pub mod simulated;
pub mod transport;

pub use config::NodeConfig;
pub use energy::{EnergyEstimate, EnergyModel};
pub use error::{Error, Result};
pub use node::{Delivery, InboundOutcome, MeshNode, NodeStats, SharedNode};
pub use outbox::{Outbox, OutboxStats, PushOutcome};
pub use runner::NodeRunner;
pub use simulated::{LinkProfile, SimulatedLink, SimulatedMesh};
pub use transport::{Transport, UdpConfig, UdpTransport};
