//! Confession game state.

pub mod lock;
pub mod store;

pub use store::{normalize_handle, ConfessionRecord, GameStore, GuessOutcome};
