//! Server error types.

use std::path::PathBuf;

use bastion_core::error::GameError;
use thiserror::Error;

/// Errors raised by the session host.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Socket or file failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Config or catalog file could not be parsed.
    #[error("Invalid config {path}: {message}")]
    Config {
        /// File that failed.
        path: PathBuf,
        /// Parser message.
        message: String,
    },

    /// The simulation reported a broken invariant.
    #[error("Simulation error: {0}")]
    Game(#[from] GameError),

    /// The host event loop is gone.
    #[error("Session host has shut down")]
    HostClosed,
}

/// Result type for server operations.
pub type Result<T> = std::result::Result<T, ServerError>;
