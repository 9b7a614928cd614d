//! Error types for compotastic-learning.

use thiserror::Error;

use compotastic_wire::GridPosition;

/// Result type for learning operations.
pub type Result<T> = std::result::Result<T, LearningError>;

/// Errors that can occur in the learning layer.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LearningError {
    /// A hyperparameter is outside its domain.
    #[error("{name} = {value} is outside {domain}")]
    InvalidParameter {
        name: &'static str,
        value: f64,
        domain: &'static str,
    },

    /// Grid dimensions unusable for an environment.
    #[error("grid {width}x{height} must be between 3x3 and 1024x1024")]
    InvalidGrid { width: u16, height: u16 },

    /// A position is off the grid or on its border.
    #[error("position {0} is not in the passable interior")]
    Impassable(GridPosition),

    /// Action index not defined by the environment.
    #[error("unknown action {0}")]
    UnknownAction(u8),

    /// Policy asked to choose from nothing.
    #[error("no actions available")]
    NoActions,
}
