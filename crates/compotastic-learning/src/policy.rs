//! Epsilon-greedy action selection.

use compotastic_wire::GridPosition;
use rand::seq::SliceRandom;
use rand::Rng;

use crate::error::{LearningError, Result};
use crate::table::ValueTable;

/// Epsilon-greedy policy over a [`ValueTable`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Policy {
    exploration_rate: f64,
}

impl Policy {
    pub fn new(exploration_rate: f64) -> Result<Self> {
        if !(0.0..=1.0).contains(&exploration_rate) {
            return Err(LearningError::InvalidParameter {
                name: "exploration_rate",
                value: exploration_rate,
                domain: "[0, 1]",
            });
        }
        Ok(Self { exploration_rate })
    }

    /// Never explores.
    pub fn greedy() -> Self {
        Self {
            exploration_rate: 0.0,
        }
    }

    pub fn exploration_rate(&self) -> f64 {
        self.exploration_rate
    }

    /// With probability epsilon pick uniformly, otherwise the best known
    /// action (first listed wins ties).
    pub fn choose_action<R: Rng + ?Sized>(
        &self,
        table: &ValueTable,
        state: GridPosition,
        available: &[u8],
        rng: &mut R,
    ) -> Result<u8> {
        if available.is_empty() {
            return Err(LearningError::NoActions);
        }
        if rng.gen::<f64>() < self.exploration_rate {
            return available.choose(rng).copied().ok_or(LearningError::NoActions);
        }
        table.best_of(state, available).ok_or(LearningError::NoActions)
    }
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            exploration_rate: 0.1,
        }
    }
}
