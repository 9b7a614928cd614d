//! Node configuration.

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use compotastic_dedup::DedupConfig;
use compotastic_learning::{LearningConfig, Policy};
use compotastic_wire::{NodeAddress, DEFAULT_MAX_FRAME_SIZE, HEADER_LEN, STATE_UPDATE_LEN};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Port used when nothing else is configured.
pub const DEFAULT_PORT: u16 = 4403;

/// Configuration for a mesh node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeConfig {
    /// This node's mesh address. Must not be the broadcast sentinel.
    pub address: NodeAddress,
    /// Largest frame the transport carries.
    pub max_frame_size: usize,
    pub dedup: DedupConfig,
    pub learning: LearningConfig,
    /// Epsilon for the node's own action selection.
    pub exploration_rate: f64,
    /// Transitions waiting for airtime.
    pub outbox_capacity: usize,
    /// Time between environment steps.
    pub step_interval: Duration,
    /// Time between idle dedup sweeps.
    pub eviction_interval: Duration,
    /// UDP bind address for the datagram transport.
    pub bind: SocketAddr,
    /// Peers every frame is sent to.
    pub peers: Vec<SocketAddr>,
    /// Devices in radio range, for the energy estimate.
    pub device_count: usize,
    /// Grid world dimensions.
    pub grid_width: u16,
    pub grid_height: u16,
    /// Seed for action selection; random when unset.
    pub seed: Option<u64>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            address: NodeAddress::new(1),
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            dedup: DedupConfig::default(),
            learning: LearningConfig::default(),
            exploration_rate: 0.1,
            outbox_capacity: 16,
            step_interval: Duration::from_secs(5),
            eviction_interval: Duration::from_secs(60),
            bind: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            peers: Vec::new(),
            device_count: 2,
            grid_width: 12,
            grid_height: 12,
            seed: None,
        }
    }
}

impl NodeConfig {
    /// Default config for a given address.
    pub fn new(address: NodeAddress) -> Self {
        Self {
            address,
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_max_frame_size(mut self, max_frame_size: usize) -> Self {
        self.max_frame_size = max_frame_size;
        self
    }

    #[must_use]
    pub fn with_dedup(mut self, dedup: DedupConfig) -> Self {
        self.dedup = dedup;
        self
    }

    #[must_use]
    pub fn with_learning(mut self, learning: LearningConfig) -> Self {
        self.learning = learning;
        self
    }

    #[must_use]
    pub fn with_exploration_rate(mut self, exploration_rate: f64) -> Self {
        self.exploration_rate = exploration_rate;
        self
    }

    #[must_use]
    pub fn with_outbox_capacity(mut self, outbox_capacity: usize) -> Self {
        self.outbox_capacity = outbox_capacity;
        self
    }

    #[must_use]
    pub fn with_step_interval(mut self, step_interval: Duration) -> Self {
        self.step_interval = step_interval;
        self
    }

    #[must_use]
    pub fn with_peers(mut self, peers: Vec<SocketAddr>) -> Self {
        self.peers = peers;
        self
    }

    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Create config from environment variables, falling back to defaults.
    ///
    /// | variable | meaning |
    /// |---|---|
    /// | `COMPOTASTIC_ADDRESS` | node address, `!a1b2c3d4`, `0x...` or decimal |
    /// | `COMPOTASTIC_BIND` | UDP bind address |
    /// | `COMPOTASTIC_PEERS` | comma separated peer socket addresses |
    /// | `COMPOTASTIC_MAX_FRAME` | maximum frame size in bytes |
    /// | `COMPOTASTIC_STEP_MS` | step interval in milliseconds |
    /// | `COMPOTASTIC_DEVICES` | devices in range for energy estimates |
    /// | `COMPOTASTIC_EPSILON` | exploration rate |
    /// | `COMPOTASTIC_SEED` | action selection seed |
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(raw) = std::env::var("COMPOTASTIC_ADDRESS") {
            config.address = parse_address(&raw)?;
        }
        if let Some(bind) = env_parse("COMPOTASTIC_BIND")? {
            config.bind = bind;
        }
        if let Ok(raw) = std::env::var("COMPOTASTIC_PEERS") {
            config.peers = parse_peers(&raw)?;
        }
        if let Some(max) = env_parse("COMPOTASTIC_MAX_FRAME")? {
            config.max_frame_size = max;
        }
        if let Some(ms) = env_parse::<u64>("COMPOTASTIC_STEP_MS")? {
            config.step_interval = Duration::from_millis(ms);
        }
        if let Some(devices) = env_parse("COMPOTASTIC_DEVICES")? {
            config.device_count = devices;
        }
        if let Some(epsilon) = env_parse("COMPOTASTIC_EPSILON")? {
            config.exploration_rate = epsilon;
        }
        config.seed = env_parse("COMPOTASTIC_SEED")?;

        config.validate()?;
        Ok(config)
    }

    /// Check every field; the first problem wins.
    pub fn validate(&self) -> Result<()> {
        if self.address.is_broadcast() {
            return Err(Error::Config(
                "node address cannot be the broadcast address".into(),
            ));
        }
        let min_frame = HEADER_LEN + STATE_UPDATE_LEN;
        if self.max_frame_size < min_frame {
            return Err(Error::Config(format!(
                "max frame size {} cannot carry a {} byte state update",
                self.max_frame_size, min_frame
            )));
        }
        if self.outbox_capacity == 0 {
            return Err(Error::Config("outbox capacity must be at least 1".into()));
        }
        if self.device_count == 0 {
            return Err(Error::Config("device count must be at least 1".into()));
        }
        if self.step_interval.is_zero() || self.eviction_interval.is_zero() {
            return Err(Error::Config("intervals must be non-zero".into()));
        }
        self.dedup.validate()?;
        self.learning.validate()?;
        Policy::new(self.exploration_rate)?;
        Ok(())
    }
}

fn env_parse<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| Error::Config(format!("invalid {}={:?}: {}", name, raw, e))),
        Err(_) => Ok(None),
    }
}

/// Parse a node address in Meshtastic (`!a1b2c3d4`), hex (`0x...`) or
/// decimal form.
pub fn parse_address(raw: &str) -> Result<NodeAddress> {
    let raw = raw.trim();
    let parsed = if let Some(hex) = raw.strip_prefix('!') {
        u32::from_str_radix(hex, 16)
    } else if let Some(hex) = raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16)
    } else {
        raw.parse()
    };
    parsed
        .map(NodeAddress::new)
        .map_err(|e| Error::Config(format!("invalid node address {:?}: {}", raw, e)))
}

fn parse_peers(raw: &str) -> Result<Vec<SocketAddr>> {
    raw.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|p| {
            p.parse()
                .map_err(|e| Error::Config(format!("invalid peer {:?}: {}", p, e)))
        })
        .collect()
}
