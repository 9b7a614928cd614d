//! Dedup registry configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Invalid dedup configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DedupError {
    #[error("window size must be a power of two in 1..={max}, got {got}")]
    InvalidWindow { got: u16, max: u16 },

    #[error("registry capacity must be at least 1")]
    ZeroCapacity,
}

/// Configuration for a [`DedupRegistry`](crate::DedupRegistry).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DedupConfig {
    /// How many of the most recent sequence numbers each record remembers.
    /// Anything further behind the highest accepted number is stale.
    /// Must be a power of two so ring slots stay distinct across wraparound.
    pub window: u16,

    /// Maximum number of tracked streams.
    pub capacity: usize,

    /// Streams silent for longer than this are forgotten.
    pub idle_timeout: Duration,

    /// A full registry only gives up a record that has been silent at least
    /// this long. Forgetting a live stream would let its retransmissions in
    /// again, so with no such record the new stream is left untracked.
    pub eviction_grace: Duration,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            window: 32,
            capacity: 64,
            idle_timeout: Duration::from_secs(600),
            eviction_grace: Duration::from_secs(30),
        }
    }
}

impl DedupConfig {
    /// Largest permitted window: a quarter of the sequence space.
    pub const MAX_WINDOW: u16 = 1 << 14;

    /// Config for small, memory-constrained nodes.
    #[must_use]
    pub fn constrained() -> Self {
        Self {
            window: 16,
            capacity: 16,
            idle_timeout: Duration::from_secs(300),
            eviction_grace: Duration::from_secs(30),
        }
    }

    #[must_use]
    pub fn with_window(mut self, window: u16) -> Self {
        self.window = window;
        self
    }

    #[must_use]
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    #[must_use]
    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    #[must_use]
    pub fn with_eviction_grace(mut self, eviction_grace: Duration) -> Self {
        self.eviction_grace = eviction_grace;
        self
    }

    pub fn validate(&self) -> Result<(), DedupError> {
        if self.window == 0 || self.window > Self::MAX_WINDOW || !self.window.is_power_of_two() {
            return Err(DedupError::InvalidWindow {
                got: self.window,
                max: Self::MAX_WINDOW,
            });
        }
        if self.capacity == 0 {
            return Err(DedupError::ZeroCapacity);
        }
        Ok(())
    }
}
