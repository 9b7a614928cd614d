//! Value table state.

use std::collections::HashMap;

use compotastic_wire::{GridPosition, ACTION_COUNT};

/// Per-action values for one state.
pub type ActionValues = [f64; ACTION_COUNT];

/// Storage the merge engine writes into.
///
/// `get` on an unvisited state returns zeros without creating it; `set`
/// creates the row on first write.
pub trait ValueStore {
    fn get(&self, state: GridPosition) -> ActionValues;
    fn set(&mut self, state: GridPosition, action: u8, value: f64);
}

/// In-memory value table.
///
/// Rows are created lazily and live as long as the node.
#[derive(Debug, Default, Clone)]
pub struct ValueTable {
    rows: HashMap<GridPosition, ActionValues>,
}

impl ValueTable {
    pub fn new() -> Self {
        Self {
            rows: HashMap::new(),
        }
    }

    /// Q(s, a), zero if never written.
    pub fn value(&self, state: GridPosition, action: u8) -> f64 {
        self.rows
            .get(&state)
            .and_then(|row| row.get(usize::from(action)))
            .copied()
            .unwrap_or(0.0)
    }

    /// max over a of Q(s, a), zero for unvisited states.
    pub fn max_value(&self, state: GridPosition) -> f64 {
        self.rows
            .get(&state)
            .map_or(0.0, |row| row.iter().copied().fold(f64::NEG_INFINITY, f64::max))
    }

    /// Best action among `available`, first one wins ties.
    pub fn best_of(&self, state: GridPosition, available: &[u8]) -> Option<u8> {
        let mut best: Option<(u8, f64)> = None;
        for &a in available {
            let v = self.value(state, a);
            match best {
                Some((_, bv)) if v <= bv => {}
                _ => best = Some((a, v)),
            }
        }
        best.map(|(a, _)| a)
    }

    /// Greedy action for a visited state.
    pub fn greedy_action(&self, state: GridPosition) -> Option<u8> {
        let row = self.rows.get(&state)?;
        let all: Vec<u8> = (0..row.len() as u8).collect();
        self.best_of(state, &all)
    }

    /// Number of visited states.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn contains(&self, state: &GridPosition) -> bool {
        self.rows.contains_key(state)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&GridPosition, &ActionValues)> {
        self.rows.iter()
    }
}

impl ValueStore for ValueTable {
    fn get(&self, state: GridPosition) -> ActionValues {
        self.rows.get(&state).copied().unwrap_or([0.0; ACTION_COUNT])
    }

    fn set(&mut self, state: GridPosition, action: u8, value: f64) {
        let row = self.rows.entry(state).or_insert([0.0; ACTION_COUNT]);
        if let Some(slot) = row.get_mut(usize::from(action)) {
            *slot = value;
        }
    }
}
