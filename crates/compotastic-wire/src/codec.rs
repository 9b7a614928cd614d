//! Step word codec.
//!
//! A step word packs one environment transition into 32 bits:
//!
//! ```text
//! bit  31        24 23 22  20 19        10 9          0
//!     +------------+--+------+------------+------------+
//!     |   reward   |dn|action|   grid y   |   grid x   |
//!     +------------+--+------+------------+------------+
//! ```
//!
//! Reward is stored as 8-bit two's complement. Every 32-bit pattern decodes
//! to a valid [`StepWord`], so decoding cannot fail and cannot detect
//! corruption either.

use crate::error::Result;
use crate::types::{check_coordinate, check_range, GridPosition, Transition, ACTION_COUNT};

const X_SHIFT: u32 = 0;
const Y_SHIFT: u32 = 10;
const ACTION_SHIFT: u32 = 20;
const DONE_SHIFT: u32 = 23;
const REWARD_SHIFT: u32 = 24;

const COORD_MASK: u32 = 0x3ff;
const ACTION_MASK: u32 = 0x7;
const REWARD_MASK: u32 = 0xff;

/// Decoded contents of a step word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StepWord {
    pub position: GridPosition,
    pub action: u8,
    pub done: bool,
    pub reward: i16,
}

impl StepWord {
    /// Pack into a word, validating every field.
    pub fn encode(&self) -> Result<u32> {
        encode(
            self.position.x,
            self.position.y,
            self.action,
            self.done,
            self.reward,
        )
    }
}

/// Pack the five fields into a step word.
///
/// Fails with [`WireError::FieldOutOfRange`](crate::WireError::FieldOutOfRange)
/// if any field does not fit.
pub fn encode(grid_x: u16, grid_y: u16, action: u8, done: bool, reward: i16) -> Result<u32> {
    check_coordinate("grid_x", grid_x)?;
    check_coordinate("grid_y", grid_y)?;
    check_range("action", i64::from(action), 0, ACTION_COUNT as i64 - 1)?;
    check_range("reward", i64::from(reward), -128, 127)?;

    let reward_bits = (reward as i8 as u8) as u32;
    Ok((u32::from(grid_x) << X_SHIFT)
        | (u32::from(grid_y) << Y_SHIFT)
        | (u32::from(action) << ACTION_SHIFT)
        | (u32::from(done) << DONE_SHIFT)
        | (reward_bits << REWARD_SHIFT))
}

/// Unpack a step word. Total: every bit pattern is valid.
pub fn decode(word: u32) -> StepWord {
    let x = ((word >> X_SHIFT) & COORD_MASK) as u16;
    let y = ((word >> Y_SHIFT) & COORD_MASK) as u16;
    let action = ((word >> ACTION_SHIFT) & ACTION_MASK) as u8;
    let done = (word >> DONE_SHIFT) & 1 == 1;
    let raw_reward = ((word >> REWARD_SHIFT) & REWARD_MASK) as u8;

    StepWord {
        position: GridPosition::new(x, y),
        action,
        done,
        reward: i16::from(raw_reward as i8),
    }
}

/// Word carrying a bare position (action, done and reward zero).
pub fn encode_state(position: GridPosition) -> Result<u32> {
    encode(position.x, position.y, 0, false, 0)
}

/// Position carried by a state word.
pub fn decode_state(word: u32) -> GridPosition {
    decode(word).position
}

/// Step word for a transition: post-step position, action, done, reward.
pub fn encode_transition(transition: &Transition) -> Result<u32> {
    transition.validate()?;
    encode(
        transition.to.x,
        transition.to.y,
        transition.action,
        transition.done,
        transition.reward,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::WireError;
    use proptest::prelude::*;

    #[test]
    fn upper_boundary_round_trips() {
        let word = encode(1023, 1023, 7, true, 127).unwrap();
        let step = decode(word);
        assert_eq!(step.position, GridPosition::new(1023, 1023));
        assert_eq!(step.action, 7);
        assert!(step.done);
        assert_eq!(step.reward, 127);
    }

    #[test]
    fn lower_boundary_round_trips() {
        let word = encode(0, 0, 0, false, -128).unwrap();
        assert_eq!(word, 0x8000_0000);
        let step = decode(word);
        assert_eq!(step.position, GridPosition::ORIGIN);
        assert_eq!(step.action, 0);
        assert!(!step.done);
        assert_eq!(step.reward, -128);
    }

    #[test]
    fn out_of_range_fields_rejected() {
        assert!(matches!(
            encode(1024, 0, 0, false, 0),
            Err(WireError::FieldOutOfRange { field: "grid_x", value: 1024, .. })
        ));
        assert!(matches!(
            encode(0, 1024, 0, false, 0),
            Err(WireError::FieldOutOfRange { field: "grid_y", .. })
        ));
        assert!(matches!(
            encode(0, 0, 8, false, 0),
            Err(WireError::FieldOutOfRange { field: "action", value: 8, .. })
        ));
        assert!(matches!(
            encode(0, 0, 0, false, 128),
            Err(WireError::FieldOutOfRange { field: "reward", value: 128, .. })
        ));
        assert!(matches!(
            encode(0, 0, 0, false, -129),
            Err(WireError::FieldOutOfRange { field: "reward", .. })
        ));
    }

    #[test]
    fn layout_is_bit_exact() {
        // x=3, y=4, action=0, done=0, reward=5
        let word = encode(3, 4, 0, false, 5).unwrap();
        assert_eq!(word, 3 | (4 << 10) | (5 << 24));

        // done bit and negative reward
        let word = encode(0, 0, 2, true, -1).unwrap();
        assert_eq!(word, (2 << 20) | (1 << 23) | (0xff << 24));
    }

    #[test]
    fn decode_is_total() {
        for word in [0u32, u32::MAX, 0xdead_beef, 0x0080_0000] {
            let step = decode(word);
            assert!(step.position.x <= 1023);
            assert!(step.position.y <= 1023);
            assert!(step.action <= 7);
            assert!((-128..=127).contains(&step.reward));
            assert_eq!(step.encode().unwrap(), word);
        }
    }

    #[test]
    fn transition_word_carries_post_step_position() {
        let t = Transition::new(GridPosition::new(3, 4), 0, 5, GridPosition::new(3, 3), false);
        let step = decode(encode_transition(&t).unwrap());
        assert_eq!(step.position, t.to);
        assert_eq!(step.reward, 5);
    }

    #[test]
    fn state_word_has_no_step_fields() {
        let word = encode_state(GridPosition::new(12, 900)).unwrap();
        assert_eq!(word >> 20, 0);
        assert_eq!(decode_state(word), GridPosition::new(12, 900));
    }

    proptest! {
        #[test]
        fn round_trip(
            x in 0u16..=1023,
            y in 0u16..=1023,
            action in 0u8..=7,
            done in any::<bool>(),
            reward in -128i16..=127,
        ) {
            let step = decode(encode(x, y, action, done, reward).unwrap());
            prop_assert_eq!(step, StepWord {
                position: GridPosition::new(x, y),
                action,
                done,
                reward,
            });
        }

        #[test]
        fn every_word_re_encodes(word in any::<u32>()) {
            prop_assert_eq!(decode(word).encode().unwrap(), word);
        }
    }
}
