//! Error types for Confessor.

use thiserror::Error;

use crate::transport::TransportError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Game error: {0}")]
    Game(String),

    #[error("Background task failed: {0}")]
    Task(String),
}

impl Error {
    pub fn persistence(e: impl std::fmt::Display) -> Self {
        Error::Persistence(e.to_string())
    }
}
