//! Error types for the headless driver.

use std::path::PathBuf;

use bastion_core::components::ConnectionId;
use bastion_core::error::GameError;
use thiserror::Error;

/// Result type alias for driver operations.
pub type Result<T> = std::result::Result<T, ScriptError>;

/// Failures while running a script or a command stream.
#[derive(Debug, Error)]
pub enum ScriptError {
    /// Reading input or writing output failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A command or script was not valid JSON.
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// A script file could not be parsed.
    #[error("Invalid script {path}: {message}")]
    Script {
        /// Script file.
        path: PathBuf,
        /// Parser message.
        message: String,
    },

    /// The session reported a hard failure.
    #[error("Game error: {0}")]
    Game(#[from] GameError),

    /// The command names a connection that is not connected.
    #[error("Connection {0} is not connected")]
    UnknownConnection(ConnectionId),

    /// The command reuses a live connection id.
    #[error("Connection {0} is already connected")]
    AlreadyConnected(ConnectionId),
}
