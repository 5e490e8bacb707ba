//! Confessor library root.

pub mod bot;
pub mod cli;
pub mod config;
pub mod error;
pub mod game;
pub mod keys;
pub mod logging;
pub mod transport;

pub use bot::{StreamSupervisor, SupervisorExit};
pub use cli::Commands;
pub use config::{load_settings, Credentials, Settings};
pub use error::{Error, Result};
pub use game::{ConfessionRecord, GameStore, GuessOutcome};
pub use transport::Transport;
