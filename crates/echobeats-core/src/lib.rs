//! Echobeats Core - Types, lane patterns, stabilizer policy, and error handling

pub mod error;
pub mod pattern;
pub mod stabilizer;
pub mod types;

pub use error::{Error, Result};
pub use pattern::{LanePattern, Slot, DEFAULT_OFFSETS};
pub use stabilizer::{coherence_score, StabilizerPolicy};
pub use types::*;
