//! Compotastic Learning - value tables that merge mesh experience
//!
//! Each node keeps a tabular value function over grid positions. Its own
//! steps and its peers' shared steps go through the same [`MergeEngine`],
//! so the table treats "my experience" and "a neighbour's experience"
//! uniformly.
//!
//! # Consistency
//!
//! Tables are eventually consistent, not linearizable: peers apply the same
//! transitions in different orders and end up close to, not exactly at, the
//! same values. There is no CRDT merge and no coordination.
//!
//! # Example
//!
//! ```rust
//! use compotastic_learning::{
//!     Environment, GridWorld, LearningConfig, MergeEngine, ValueTable,
//! };
//! use compotastic_wire::GridPosition;
//!
//! let mut world = GridWorld::new(12, 12, GridPosition::new(6, 6))?
//!     .with_reward(GridPosition::new(6, 5), 8);
//! let engine = MergeEngine::new(LearningConfig::default())?;
//! let mut table = ValueTable::new();
//!
//! let step = world.step(0)?;
//! engine.apply(&mut table, &step);
//! assert!(table.value(GridPosition::new(6, 6), 0) > 0.0);
//! # Ok::<(), compotastic_learning::LearningError>(())
//! ```

pub mod environment;
pub mod error;
pub mod merge;
pub mod policy;
pub mod table;

pub use environment::{Action, Environment, GridWorld};
pub use error::{LearningError, Result};
pub use merge::{LearningConfig, MergeEngine, MergeOutcome};
pub use policy::Policy;
pub use table::{ActionValues, ValueStore, ValueTable};
