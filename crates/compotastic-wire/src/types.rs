//! Core types for the Compotastic wire protocol

use std::cmp::Ordering;

use crate::error::{Result, WireError};

/// Protocol version written into every envelope
pub const PROTOCOL_VERSION: u8 = 1;

/// Default maximum frame size (Meshtastic data payload limit)
pub const DEFAULT_MAX_FRAME_SIZE: usize = 237;

/// Largest grid coordinate representable in a step word
pub const MAX_COORDINATE: u16 = 1023;

/// Number of actions representable in a step word
pub const ACTION_COUNT: usize = 8;

/// Address of a mesh participant.
///
/// Meshtastic node numbers are 32 bits wide. Zero is reserved as the
/// broadcast destination and never identifies a sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NodeAddress(pub u32);

impl NodeAddress {
    /// Broadcast sentinel (destination only)
    pub const BROADCAST: Self = Self(0);

    /// Create an address from a raw node number.
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Check whether this is the broadcast sentinel.
    pub const fn is_broadcast(&self) -> bool {
        self.0 == Self::BROADCAST.0
    }
}

impl std::fmt::Display for NodeAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_broadcast() {
            write!(f, "!broadcast")
        } else {
            write!(f, "!{:08x}", self.0)
        }
    }
}

/// 16-bit wrapping sequence number.
///
/// Ordering uses serial-number arithmetic: `a` is newer than `b` when the
/// forward distance from `b` to `a` is less than half the number space.
/// There is deliberately no `Ord` impl.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SequenceNumber(pub u16);

impl SequenceNumber {
    /// Half of the sequence space; distances at or beyond this are "behind".
    pub const HALF_RANGE: u16 = 1 << 15;

    pub const fn new(raw: u16) -> Self {
        Self(raw)
    }

    /// Next sequence number, wrapping at `u16::MAX`.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }

    /// Forward distance from `earlier` to `self`, modulo 2^16.
    pub const fn distance_from(self, earlier: Self) -> u16 {
        self.0.wrapping_sub(earlier.0)
    }

    /// Wraparound-aware "is newer than".
    pub fn is_newer_than(self, other: Self) -> bool {
        let d = self.distance_from(other);
        d != 0 && d < Self::HALF_RANGE
    }

    /// Wraparound-aware comparison.
    pub fn serial_cmp(self, other: Self) -> Ordering {
        if self == other {
            Ordering::Equal
        } else if self.is_newer_than(other) {
            Ordering::Greater
        } else {
            Ordering::Less
        }
    }
}

impl std::fmt::Display for SequenceNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Destination class an envelope travels on.
///
/// Senders keep one counter per channel, and receivers deduplicate per
/// `(source, channel)` so broadcast and direct streams never collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Channel {
    /// Sent to the broadcast sentinel
    Broadcast,
    /// Sent to one node
    Direct(NodeAddress),
}

impl Channel {
    /// Channel a destination address belongs to.
    pub fn for_destination(destination: NodeAddress) -> Self {
        if destination.is_broadcast() {
            Channel::Broadcast
        } else {
            Channel::Direct(destination)
        }
    }
}

/// A cell of the learning environment's grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GridPosition {
    pub x: u16,
    pub y: u16,
}

impl GridPosition {
    pub const ORIGIN: Self = Self { x: 0, y: 0 };

    pub const fn new(x: u16, y: u16) -> Self {
        Self { x, y }
    }

    /// Offset by a signed delta, `None` if the result leaves the word's range.
    pub fn translated(&self, dx: i32, dy: i32) -> Option<Self> {
        let x = i32::from(self.x) + dx;
        let y = i32::from(self.y) + dy;
        let max = i32::from(MAX_COORDINATE);
        if (0..=max).contains(&x) && (0..=max).contains(&y) {
            Some(Self::new(x as u16, y as u16))
        } else {
            None
        }
    }
}

impl std::fmt::Display for GridPosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// One environment step: `(s, a, r, s', done)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Transition {
    /// Pre-step position `s`
    pub from: GridPosition,
    /// Action index `a`
    pub action: u8,
    /// Reward `r`
    pub reward: i16,
    /// Post-step position `s'`
    pub to: GridPosition,
    /// Episode ended on this step
    pub done: bool,
}

impl Transition {
    pub fn new(from: GridPosition, action: u8, reward: i16, to: GridPosition, done: bool) -> Self {
        Self {
            from,
            action,
            reward,
            to,
            done,
        }
    }

    /// Check every field against its step-word range.
    pub fn validate(&self) -> Result<()> {
        check_coordinate("from.x", self.from.x)?;
        check_coordinate("from.y", self.from.y)?;
        check_coordinate("to.x", self.to.x)?;
        check_coordinate("to.y", self.to.y)?;
        check_range("action", i64::from(self.action), 0, ACTION_COUNT as i64 - 1)?;
        check_range("reward", i64::from(self.reward), -128, 127)?;
        Ok(())
    }
}

pub(crate) fn check_coordinate(field: &'static str, value: u16) -> Result<()> {
    check_range(field, i64::from(value), 0, i64::from(MAX_COORDINATE))
}

pub(crate) fn check_range(field: &'static str, value: i64, min: i64, max: i64) -> Result<()> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(WireError::FieldOutOfRange {
            field,
            value,
            min,
            max,
        })
    }
}
