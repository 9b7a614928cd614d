//! Grid world that produces transitions for the mesh.
//!
//! The grid's outer ring is impassable. Nodes move one cell at a time,
//! collect the reward of the cell they step onto, and may stop, work or call
//! for help in place.

use std::collections::HashMap;

use compotastic_wire::{GridPosition, Transition, MAX_COORDINATE};
use tracing::debug;

use crate::error::{LearningError, Result};

/// Actions available to an agent on the grid.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    MoveForward = 0,
    MoveBackward = 1,
    MoveLeft = 2,
    MoveRight = 3,
    DoWork = 4,
    Stop = 5,
    CallForHelp = 6,
}

impl Action {
    pub const ALL: [Action; 7] = [
        Action::MoveForward,
        Action::MoveBackward,
        Action::MoveLeft,
        Action::MoveRight,
        Action::DoWork,
        Action::Stop,
        Action::CallForHelp,
    ];

    pub fn from_u8(val: u8) -> Option<Self> {
        match val {
            0 => Some(Action::MoveForward),
            1 => Some(Action::MoveBackward),
            2 => Some(Action::MoveLeft),
            3 => Some(Action::MoveRight),
            4 => Some(Action::DoWork),
            5 => Some(Action::Stop),
            6 => Some(Action::CallForHelp),
            _ => None,
        }
    }

    /// Grid offset for movement actions. Forward is toward y = 0.
    pub fn delta(self) -> Option<(i32, i32)> {
        match self {
            Action::MoveForward => Some((0, -1)),
            Action::MoveBackward => Some((0, 1)),
            Action::MoveLeft => Some((-1, 0)),
            Action::MoveRight => Some((1, 0)),
            _ => None,
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Action::MoveForward => "MOVE_FORWARD",
            Action::MoveBackward => "MOVE_BACKWARD",
            Action::MoveLeft => "MOVE_LEFT",
            Action::MoveRight => "MOVE_RIGHT",
            Action::DoWork => "DO_WORK",
            Action::Stop => "STOP",
            Action::CallForHelp => "CALL_FOR_HELP",
        };
        f.write_str(name)
    }
}

/// Producer of `(s, a, r, s', done)` tuples.
pub trait Environment {
    /// Where the agent currently is.
    fn position(&self) -> GridPosition;

    /// Actions worth taking from the current position.
    fn available_actions(&self) -> Vec<u8>;

    /// Take one step.
    fn step(&mut self, action: u8) -> Result<Transition>;

    /// Start a new episode.
    fn reset(&mut self);
}

/// Rectangular grid with an impassable border and reward tiles.
#[derive(Debug, Clone)]
pub struct GridWorld {
    width: u16,
    height: u16,
    rewards: HashMap<GridPosition, i8>,
    start: GridPosition,
    position: GridPosition,
}

impl GridWorld {
    pub fn new(width: u16, height: u16, start: GridPosition) -> Result<Self> {
        let max = MAX_COORDINATE + 1;
        if width < 3 || height < 3 || width > max || height > max {
            return Err(LearningError::InvalidGrid { width, height });
        }
        let world = Self {
            width,
            height,
            rewards: HashMap::new(),
            start,
            position: start,
        };
        if !world.is_passable(start) {
            return Err(LearningError::Impassable(start));
        }
        Ok(world)
    }

    /// Add a reward tile.
    #[must_use]
    pub fn with_reward(mut self, at: GridPosition, value: i8) -> Self {
        self.set_reward(at, value);
        self
    }

    pub fn set_reward(&mut self, at: GridPosition, value: i8) {
        if value == 0 {
            self.rewards.remove(&at);
        } else {
            self.rewards.insert(at, value);
        }
    }

    pub fn reward_at(&self, at: GridPosition) -> i16 {
        self.rewards.get(&at).copied().map_or(0, i16::from)
    }

    pub fn width(&self) -> u16 {
        self.width
    }

    pub fn height(&self) -> u16 {
        self.height
    }

    /// Inside the grid and off the border.
    pub fn is_passable(&self, at: GridPosition) -> bool {
        at.x > 0 && at.y > 0 && at.x < self.width - 1 && at.y < self.height - 1
    }

    fn target(&self, action: Action) -> Option<GridPosition> {
        let (dx, dy) = action.delta()?;
        self.position
            .translated(dx, dy)
            .filter(|p| self.is_passable(*p))
    }
}

impl Environment for GridWorld {
    fn position(&self) -> GridPosition {
        self.position
    }

    fn available_actions(&self) -> Vec<u8> {
        Action::ALL
            .iter()
            .filter(|a| a.delta().is_none() || self.target(**a).is_some())
            .map(|a| *a as u8)
            .collect()
    }

    fn step(&mut self, action: u8) -> Result<Transition> {
        let resolved = Action::from_u8(action).ok_or(LearningError::UnknownAction(action))?;
        let from = self.position;

        let (to, reward, done) = match resolved {
            Action::MoveForward | Action::MoveBackward | Action::MoveLeft | Action::MoveRight => {
                match self.target(resolved) {
                    Some(to) => (to, self.reward_at(to), false),
                    None => {
                        debug!("{} blocked at {}", resolved, from);
                        (from, -1, false)
                    }
                }
            }
            Action::DoWork => (from, self.reward_at(from), false),
            Action::Stop => (from, 0, true),
            Action::CallForHelp => {
                debug!("Assistance requested at {}", from);
                (from, -1, false)
            }
        };

        self.position = to;
        Ok(Transition::new(from, action, reward, to, done))
    }

    fn reset(&mut self) {
        self.position = self.start;
    }
}
