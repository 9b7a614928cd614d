//! Error types for the mesh node.

use thiserror::Error;

use compotastic_dedup::DedupError;
use compotastic_learning::LearningError;
use compotastic_wire::WireError;

/// Result type for node operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while building or running a node.
#[derive(Debug, Error)]
pub enum Error {
    /// Encoding failed
    #[error("Wire error: {0}")]
    Wire(#[from] WireError),

    /// Dedup configuration rejected
    #[error("Dedup error: {0}")]
    Dedup(#[from] DedupError),

    /// Learning configuration or environment error
    #[error("Learning error: {0}")]
    Learning(#[from] LearningError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration value
    #[error("Config error: {0}")]
    Config(String),
}
