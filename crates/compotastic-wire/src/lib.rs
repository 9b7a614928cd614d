//! Compotastic Wire - step words and envelopes for the learning mesh
//!
//! This crate provides:
//! - A 32-bit step word packing one `(position, action, done, reward)` step
//! - An addressed, sequenced envelope sized for LoRa-class frame limits
//! - Wraparound-aware sequence numbers and per-channel sequence counters
//!
//! # Design Philosophy
//!
//! The radio mesh carries a few hundred bytes per frame at best, so a whole
//! transition travels as three 32-bit words behind a 13 byte header. Step
//! word decoding is total: every bit pattern is a valid step, which keeps
//! the decoder trivial but means corruption is only caught by the
//! envelope's position redundancy check.
//!
//! # Example
//!
//! ```rust
//! use compotastic_wire::{
//!     build_envelope, Envelope, GridPosition, NodeAddress, Payload, SequenceNumber, Transition,
//!     DEFAULT_MAX_FRAME_SIZE,
//! };
//!
//! let t = Transition::new(GridPosition::new(3, 4), 0, 5, GridPosition::new(3, 3), false);
//! let frame = build_envelope(
//!     NodeAddress::new(1),
//!     NodeAddress::BROADCAST,
//!     SequenceNumber::new(1),
//!     &t,
//!     DEFAULT_MAX_FRAME_SIZE,
//! )?;
//!
//! let env = Envelope::decode(&frame)?;
//! if let Payload::StateUpdate(update) = env.payload {
//!     assert_eq!(update.to_transition().unwrap(), t);
//! }
//! # Ok::<(), compotastic_wire::WireError>(())
//! ```

pub mod codec;
pub mod counter;
pub mod envelope;
pub mod error;
pub mod types;

// Re-export main types at crate root
pub use codec::{decode, encode, encode_transition, StepWord};
pub use counter::SequenceCounter;
pub use envelope::{
    build_envelope, Envelope, EnvelopeHeader, Payload, PayloadType, StateUpdate, HEADER_LEN,
    STATE_UPDATE_LEN,
};
pub use error::{Malformed, Result, WireError};
pub use types::{
    Channel, GridPosition, NodeAddress, SequenceNumber, Transition, ACTION_COUNT,
    DEFAULT_MAX_FRAME_SIZE, MAX_COORDINATE, PROTOCOL_VERSION,
};

// Compile-time check that a state update fits the default frame
const _: () = assert!(HEADER_LEN + STATE_UPDATE_LEN <= DEFAULT_MAX_FRAME_SIZE);
