//! Compotastic Dedup - replay filtering for an unreliable mesh
//!
//! The radio mesh delivers frames unordered, duplicated and sometimes very
//! late. Every receiver keeps a small replay window per sender stream so a
//! transition is merged at most once.
//!
//! # Design
//!
//! Each stream (source address plus broadcast/direct channel) keeps the
//! highest accepted sequence number and a ring of the `window` most recent
//! numbers. Comparisons use serial-number arithmetic, so `0` after `65535`
//! is newer. Numbers further behind than the window are rejected as stale
//! without further inspection.
//!
//! # Memory
//!
//! Records cost `window` slots each and the registry never holds more than
//! `capacity` of them. Idle records are evicted after `idle_timeout`, which
//! also lets a rebooted sender whose counter restarted be heard again.

mod config;
mod registry;
mod window;

pub use config::{DedupConfig, DedupError};
pub use registry::{DedupRegistry, DedupStats, StreamKey};
pub use window::{DedupWindow, Verdict};
