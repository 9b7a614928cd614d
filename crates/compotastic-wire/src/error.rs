//! Error types for compotastic-wire.

use thiserror::Error;

/// Result type for wire operations.
pub type Result<T> = std::result::Result<T, WireError>;

/// Errors raised while encoding or decoding wire data.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WireError {
    /// A transition field does not fit its bit field. Caller bug.
    #[error("{field} = {value} is outside {min}..={max}")]
    FieldOutOfRange {
        field: &'static str,
        value: i64,
        min: i64,
        max: i64,
    },

    /// The serialized frame would not fit the transport.
    #[error("envelope of {size} bytes exceeds maximum frame size {max}")]
    PayloadTooLarge { size: usize, max: usize },

    /// The broadcast sentinel cannot originate traffic.
    #[error("broadcast address cannot be used as a source")]
    InvalidSource,

    /// A received frame could not be parsed.
    #[error("malformed envelope: {0}")]
    Malformed(Malformed),
}

/// Why a received frame was rejected as malformed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Malformed {
    #[error("frame of {0} bytes is shorter than the header")]
    Truncated(usize),

    #[error("declared payload length {declared} but {actual} bytes follow")]
    LengthMismatch { declared: usize, actual: usize },

    #[error("payload type {tag:#04x} must carry {expected} bytes, got {actual}")]
    WrongPayloadSize {
        tag: u8,
        expected: usize,
        actual: usize,
    },

    #[error("step word position disagrees with both state words")]
    InconsistentStep,

    #[error("source address is the broadcast sentinel")]
    BroadcastSource,
}

impl From<Malformed> for WireError {
    fn from(m: Malformed) -> Self {
        WireError::Malformed(m)
    }
}
