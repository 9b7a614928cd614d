//! Merge engine: folds transitions into a value table.
//!
//! Every accepted transition, local or remote, goes through
//!
//! ```text
//! Q(s,a) <- Q(s,a) + alpha * (r + gamma * max_a' Q(s',a') * (1 - done) - Q(s,a))
//! ```
//!
//! Updates are local and incremental. Peers converge approximately over
//! time; nothing is locked, rolled back, or reconciled against a "true"
//! value, and updates from different sources need not commute.

use compotastic_wire::{GridPosition, Transition, ACTION_COUNT};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::environment::Action;
use crate::error::{LearningError, Result};
use crate::table::ValueStore;

/// Learning hyperparameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LearningConfig {
    /// Step size alpha, in (0, 1].
    pub learning_rate: f64,
    /// Discount gamma, in [0, 1].
    pub discount: f64,
    /// Actions `0..action_count` the environment defines. Only these take
    /// part in `max_a' Q(s', a')`; the remaining row slots are never written.
    pub action_count: u8,
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.1,
            discount: 0.9,
            action_count: Action::ALL.len() as u8,
        }
    }
}

impl LearningConfig {
    #[must_use]
    pub fn with_learning_rate(mut self, learning_rate: f64) -> Self {
        self.learning_rate = learning_rate;
        self
    }

    #[must_use]
    pub fn with_discount(mut self, discount: f64) -> Self {
        self.discount = discount;
        self
    }

    #[must_use]
    pub fn with_action_count(mut self, action_count: u8) -> Self {
        self.action_count = action_count;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.learning_rate > 0.0 && self.learning_rate <= 1.0) {
            return Err(LearningError::InvalidParameter {
                name: "learning_rate",
                value: self.learning_rate,
                domain: "(0, 1]",
            });
        }
        if !(0.0..=1.0).contains(&self.discount) {
            return Err(LearningError::InvalidParameter {
                name: "discount",
                value: self.discount,
                domain: "[0, 1]",
            });
        }
        if self.action_count == 0 || usize::from(self.action_count) > ACTION_COUNT {
            return Err(LearningError::InvalidParameter {
                name: "action_count",
                value: f64::from(self.action_count),
                domain: "[1, 8]",
            });
        }
        Ok(())
    }
}

/// What a single merge changed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MergeOutcome {
    pub state: GridPosition,
    pub action: u8,
    pub previous: f64,
    pub updated: f64,
}

impl MergeOutcome {
    pub fn delta(&self) -> f64 {
        self.updated - self.previous
    }
}

/// Applies transitions to a [`ValueStore`].
#[derive(Debug, Clone, Copy)]
pub struct MergeEngine {
    config: LearningConfig,
}

impl MergeEngine {
    pub fn new(config: LearningConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &LearningConfig {
        &self.config
    }

    /// Bootstrapped target `r + gamma * max Q(s')`, without the bootstrap on
    /// terminal steps. The max runs over the configured actions only.
    pub fn target<S: ValueStore + ?Sized>(&self, store: &S, transition: &Transition) -> f64 {
        let future = if transition.done {
            0.0
        } else {
            store
                .get(transition.to)
                .iter()
                .take(usize::from(self.config.action_count))
                .copied()
                .fold(f64::NEG_INFINITY, f64::max)
        };
        f64::from(transition.reward) + self.config.discount * future
    }

    /// Apply one transition.
    pub fn apply<S: ValueStore + ?Sized>(&self, store: &mut S, transition: &Transition) -> MergeOutcome {
        let target = self.target(store, transition);
        let previous = store
            .get(transition.from)
            .get(usize::from(transition.action))
            .copied()
            .unwrap_or(0.0);
        let updated = previous + self.config.learning_rate * (target - previous);
        store.set(transition.from, transition.action, updated);

        trace!(
            "Q{} a={} {:.4} -> {:.4} (r={}, done={})",
            transition.from,
            transition.action,
            previous,
            updated,
            transition.reward,
            transition.done
        );

        MergeOutcome {
            state: transition.from,
            action: transition.action,
            previous,
            updated,
        }
    }
}

impl Default for MergeEngine {
    fn default() -> Self {
        Self {
            config: LearningConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::ValueTable;

    fn t(from: (u16, u16), action: u8, reward: i16, to: (u16, u16), done: bool) -> Transition {
        Transition::new(
            GridPosition::new(from.0, from.1),
            action,
            reward,
            GridPosition::new(to.0, to.1),
            done,
        )
    }

    #[test]
    fn first_update_from_zero() {
        let engine = MergeEngine::new(LearningConfig::default().with_learning_rate(0.5).with_discount(0.5))
            .unwrap();
        let mut table = ValueTable::new();

        let out = engine.apply(&mut table, &t((1, 1), 4, 5, (1, 1), false));
        assert_eq!(out.previous, 0.0);
        assert!((out.updated - 2.5).abs() < 1e-12);
        assert_eq!(table.greedy_action(GridPosition::new(1, 1)), Some(4));
    }

    #[test]
    fn bootstraps_from_next_state() {
        let engine = MergeEngine::new(LearningConfig::default()).unwrap();
        let mut table = ValueTable::new();
        let next = GridPosition::new(3, 3);
        table.set(next, 2, 10.0);

        let out = engine.apply(&mut table, &t((3, 4), 0, 5, (3, 3), false));
        // 0 + 0.1 * (5 + 0.9 * 10 - 0)
        assert!((out.updated - 1.4).abs() < 1e-12);
    }

    #[test]
    fn negative_next_state_propagates() {
        let engine = MergeEngine::default();
        let mut table = ValueTable::new();
        let next = GridPosition::new(3, 3);
        for action in Action::ALL {
            table.set(next, action as u8, -10.0);
        }

        let out = engine.apply(&mut table, &t((3, 4), 0, 0, (3, 3), false));
        // 0 + 0.1 * (0 + 0.9 * -10 - 0)
        assert!((out.updated + 0.9).abs() < 1e-12);
    }

    #[test]
    fn unused_slots_ignored_by_bootstrap() {
        let engine = MergeEngine::new(LearningConfig::default().with_action_count(2)).unwrap();
        let mut table = ValueTable::new();
        let next = GridPosition::new(3, 3);
        table.set(next, 0, -4.0);
        table.set(next, 1, -2.0);
        table.set(next, 5, 50.0);

        assert!((engine.target(&table, &t((3, 4), 0, 1, (3, 3), false)) - (1.0 - 1.8)).abs() < 1e-12);
    }

    #[test]
    fn terminal_step_ignores_future() {
        let engine = MergeEngine::new(LearningConfig::default()).unwrap();
        let mut table = ValueTable::new();
        table.set(GridPosition::new(3, 3), 2, 10.0);

        let out = engine.apply(&mut table, &t((3, 4), 5, 0, (3, 3), true));
        assert_eq!(out.updated, 0.0);
    }

    #[test]
    fn reading_next_state_does_not_create_it() {
        let engine = MergeEngine::default();
        let mut table = ValueTable::new();
        engine.apply(&mut table, &t((3, 4), 0, 1, (3, 3), false));
        assert!(table.contains(&GridPosition::new(3, 4)));
        assert!(!table.contains(&GridPosition::new(3, 3)));
    }

    #[test]
    fn repeated_updates_converge_to_reward() {
        let engine = MergeEngine::new(LearningConfig::default().with_learning_rate(0.5)).unwrap();
        let mut table = ValueTable::new();
        let step = t((2, 2), 4, 8, (2, 2), true);
        for _ in 0..60 {
            engine.apply(&mut table, &step);
        }
        assert!((table.value(GridPosition::new(2, 2), 4) - 8.0).abs() < 1e-9);
    }

    #[test]
    fn config_validation() {
        assert!(LearningConfig::default().validate().is_ok());
        assert!(LearningConfig::default().with_learning_rate(1.0).validate().is_ok());
        assert!(LearningConfig::default().with_learning_rate(0.0).validate().is_err());
        assert!(LearningConfig::default().with_learning_rate(f64::NAN).validate().is_err());
        assert!(LearningConfig::default().with_discount(1.5).validate().is_err());
        assert!(LearningConfig::default().with_action_count(0).validate().is_err());
        assert!(LearningConfig::default().with_action_count(9).validate().is_err());
        assert!(LearningConfig::default().with_action_count(8).validate().is_ok());
        assert!(matches!(
            MergeEngine::new(LearningConfig::default().with_discount(-0.1)),
            Err(LearningError::InvalidParameter { name: "discount", .. })
        ));
    }
}
