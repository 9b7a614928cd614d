//! Addressed, sequenced envelope around a typed payload.
//!
//! Layout (little endian), 13 byte header:
//!
//! ```text
//! 0      1      2            6            10     12     13
//! +------+------+------------+------------+------+------+-----------//
//! | ver  | type |   source   |    dest    | seq  | len  | payload ...
//! +------+------+------------+------------+------+------+-----------//
//! ```
//!
//! The explicit length lets a receiver skip payload types (or versions) it
//! does not understand instead of misreading them.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::codec;
use crate::error::{Malformed, Result, WireError};
use crate::types::{Channel, NodeAddress, SequenceNumber, Transition, PROTOCOL_VERSION};

/// Size of the fixed envelope header
pub const HEADER_LEN: usize = 13;

/// Size of a state update payload: three 32-bit words
pub const STATE_UPDATE_LEN: usize = 12;

/// Payload types understood by this version of the protocol.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PayloadType {
    /// One environment transition
    StateUpdate = 0x01,
    /// Ask peers to re-share what they have learnt
    ModelRequest = 0x02,
}

impl PayloadType {
    pub fn from_u8(val: u8) -> Option<Self> {
        match val {
            0x01 => Some(PayloadType::StateUpdate),
            0x02 => Some(PayloadType::ModelRequest),
            _ => None,
        }
    }

    /// Fixed payload size for this type.
    pub const fn payload_len(self) -> usize {
        match self {
            PayloadType::StateUpdate => STATE_UPDATE_LEN,
            PayloadType::ModelRequest => 0,
        }
    }
}

/// Three-word state update payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StateUpdate {
    /// State word for `s`
    pub prior_state: u32,
    /// State word for `s'`
    pub next_state: u32,
    /// Step word: `s'` position, action, done, reward
    pub step: u32,
}

impl StateUpdate {
    /// Encode a transition into its three words.
    pub fn from_transition(transition: &Transition) -> Result<Self> {
        Ok(Self {
            prior_state: codec::encode_state(transition.from)?,
            next_state: codec::encode_state(transition.to)?,
            step: codec::encode_transition(transition)?,
        })
    }

    /// Rebuild `(s, a, r, s', done)`.
    ///
    /// The step word repeats a position; if it matches neither state word the
    /// payload was corrupted somewhere along the way.
    pub fn to_transition(&self) -> std::result::Result<Transition, Malformed> {
        let from = codec::decode_state(self.prior_state);
        let to = codec::decode_state(self.next_state);
        let step = codec::decode(self.step);

        if step.position != to && step.position != from {
            return Err(Malformed::InconsistentStep);
        }

        Ok(Transition {
            from,
            action: step.action,
            reward: step.reward,
            to,
            done: step.done,
        })
    }

    fn put(&self, buf: &mut BytesMut) {
        buf.put_u32_le(self.prior_state);
        buf.put_u32_le(self.next_state);
        buf.put_u32_le(self.step);
    }

    fn parse(mut body: &[u8]) -> Self {
        Self {
            prior_state: body.get_u32_le(),
            next_state: body.get_u32_le(),
            step: body.get_u32_le(),
        }
    }
}

/// Envelope payload, one variant per payload type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    StateUpdate(StateUpdate),
    ModelRequest,
    /// Unknown type or protocol version; carried opaquely and ignored.
    Unsupported { tag: u8, body: Bytes },
}

impl Payload {
    /// Wire tag for this payload.
    pub fn tag(&self) -> u8 {
        match self {
            Payload::StateUpdate(_) => PayloadType::StateUpdate as u8,
            Payload::ModelRequest => PayloadType::ModelRequest as u8,
            Payload::Unsupported { tag, .. } => *tag,
        }
    }

    /// Encoded payload length in bytes.
    pub fn len(&self) -> usize {
        match self {
            Payload::StateUpdate(_) => STATE_UPDATE_LEN,
            Payload::ModelRequest => 0,
            Payload::Unsupported { body, .. } => body.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Envelope header: addressing and sequencing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvelopeHeader {
    /// Protocol version
    pub version: u8,
    /// Originating node
    pub source: NodeAddress,
    /// Target node or [`NodeAddress::BROADCAST`]
    pub destination: NodeAddress,
    /// Sender's sequence number on this destination's channel
    pub sequence: SequenceNumber,
}

impl EnvelopeHeader {
    pub fn new(source: NodeAddress, destination: NodeAddress, sequence: SequenceNumber) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            source,
            destination,
            sequence,
        }
    }

    /// Channel this envelope travels on.
    pub fn channel(&self) -> Channel {
        Channel::for_destination(self.destination)
    }
}

/// Complete envelope with header and payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub hdr: EnvelopeHeader,
    pub payload: Payload,
}

impl Envelope {
    /// Wrap a transition.
    pub fn state_update(
        source: NodeAddress,
        destination: NodeAddress,
        sequence: SequenceNumber,
        transition: &Transition,
    ) -> Result<Self> {
        Ok(Self {
            hdr: EnvelopeHeader::new(source, destination, sequence),
            payload: Payload::StateUpdate(StateUpdate::from_transition(transition)?),
        })
    }

    /// A model request (empty payload).
    pub fn model_request(
        source: NodeAddress,
        destination: NodeAddress,
        sequence: SequenceNumber,
    ) -> Self {
        Self {
            hdr: EnvelopeHeader::new(source, destination, sequence),
            payload: Payload::ModelRequest,
        }
    }

    /// Serialized size in bytes.
    pub fn encoded_len(&self) -> usize {
        HEADER_LEN + self.payload.len()
    }

    /// Serialize, refusing frames larger than `max_frame_size`.
    pub fn encode(&self, max_frame_size: usize) -> Result<Bytes> {
        if self.hdr.source.is_broadcast() {
            return Err(WireError::InvalidSource);
        }

        let size = self.encoded_len();
        if size > max_frame_size || self.payload.len() > usize::from(u8::MAX) {
            return Err(WireError::PayloadTooLarge {
                size,
                max: max_frame_size,
            });
        }

        let mut buf = BytesMut::with_capacity(size);
        buf.put_u8(self.hdr.version);
        buf.put_u8(self.payload.tag());
        buf.put_u32_le(self.hdr.source.0);
        buf.put_u32_le(self.hdr.destination.0);
        buf.put_u16_le(self.hdr.sequence.0);
        buf.put_u8(self.payload.len() as u8);

        match &self.payload {
            Payload::StateUpdate(update) => update.put(&mut buf),
            Payload::ModelRequest => {}
            Payload::Unsupported { body, .. } => buf.put_slice(body),
        }

        Ok(buf.freeze())
    }

    /// Parse a received frame.
    ///
    /// Frames from an unknown version, or with an unknown payload type, decode
    /// to [`Payload::Unsupported`] as long as the declared length is
    /// consistent; anything that cannot be framed is [`WireError::Malformed`].
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_LEN {
            return Err(Malformed::Truncated(data.len()).into());
        }

        let mut cursor = data;
        let version = cursor.get_u8();
        let tag = cursor.get_u8();
        let source = NodeAddress(cursor.get_u32_le());
        let destination = NodeAddress(cursor.get_u32_le());
        let sequence = SequenceNumber(cursor.get_u16_le());
        let declared = usize::from(cursor.get_u8());

        if cursor.len() != declared {
            return Err(Malformed::LengthMismatch {
                declared,
                actual: cursor.len(),
            }
            .into());
        }
        let body = cursor;

        let hdr = EnvelopeHeader {
            version,
            source,
            destination,
            sequence,
        };

        let known = PayloadType::from_u8(tag).filter(|_| version == PROTOCOL_VERSION);
        let payload = match known {
            None => Payload::Unsupported {
                tag,
                body: Bytes::copy_from_slice(body),
            },
            Some(kind) => {
                if body.len() != kind.payload_len() {
                    return Err(Malformed::WrongPayloadSize {
                        tag,
                        expected: kind.payload_len(),
                        actual: body.len(),
                    }
                    .into());
                }
                if source.is_broadcast() {
                    return Err(Malformed::BroadcastSource.into());
                }
                match kind {
                    PayloadType::StateUpdate => Payload::StateUpdate(StateUpdate::parse(body)),
                    PayloadType::ModelRequest => Payload::ModelRequest,
                }
            }
        };

        Ok(Self { hdr, payload })
    }

    pub fn channel(&self) -> Channel {
        self.hdr.channel()
    }
}

/// Build the transmissible bytes for one transition.
pub fn build_envelope(
    source: NodeAddress,
    destination: NodeAddress,
    sequence: SequenceNumber,
    transition: &Transition,
    max_frame_size: usize,
) -> Result<Bytes> {
    Envelope::state_update(source, destination, sequence, transition)?.encode(max_frame_size)
}
