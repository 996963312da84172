//! Error types for the authoritative model.
//!
//! Two families live here. [`GameError`] covers hard failures: broken
//! invariants, unknown entities, codec and configuration problems.
//! [`RejectReason`] covers requests that failed server-side validation;
//! those are logged and dropped, never propagated as errors.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::components::{BuyableId, ConnectionId, EntityId, EntityKind};
use crate::replication::{FieldId, FieldType};

/// Result type alias using [`GameError`].
pub type Result<T> = std::result::Result<T, GameError>;

/// Top-level error type for all hard failures.
#[derive(Debug, Error)]
pub enum GameError {
    /// Invalid entity reference.
    #[error("Entity not found: {0}")]
    EntityNotFound(EntityId),

    /// No player is associated with the connection.
    #[error("Unknown connection: {0}")]
    UnknownConnection(ConnectionId),

    /// A replicated field was written by a caller without authority.
    #[error("Caller has no authority to set {field:?} on {entity}")]
    NotAuthoritative {
        /// Target entity.
        entity: EntityId,
        /// Field that was written.
        field: FieldId,
    },

    /// The entity kind does not carry the field.
    #[error("{kind:?} entities do not carry field {field:?}")]
    FieldNotCarried {
        /// Field that was written.
        field: FieldId,
        /// Kind of the target entity.
        kind: EntityKind,
    },

    /// The value does not match the field's declared type.
    #[error("Field {field:?} expects a {expected:?} value")]
    FieldTypeMismatch {
        /// Field that was written.
        field: FieldId,
        /// Declared value type.
        expected: FieldType,
    },

    /// The ownership hierarchy or lifecycle ordering was violated.
    #[error("Invariant violated: {0}")]
    InvariantViolation(String),

    /// The catalog has no template with this id.
    #[error("Unknown buyable: {0}")]
    UnknownBuyable(BuyableId),

    /// Data file parsing error.
    #[error("Failed to parse data file '{path}': {message}")]
    DataParseError {
        /// Path to the file that failed to parse.
        path: String,
        /// Error message.
        message: String,
    },

    /// Wire encoding or decoding failed.
    #[error("Codec error: {0}")]
    Codec(String),

    /// Invalid game state.
    #[error("Invalid game state: {0}")]
    InvalidState(String),
}

/// Why the server refused a client request.
///
/// Rejections are expected during normal play. They are logged at the
/// server and only reach the client when acknowledgements are enabled.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum RejectReason {
    /// The session has already ended.
    #[error("game is over")]
    GameOver,

    /// The connection has no player entity.
    #[error("connection {0} has no player")]
    UnknownPlayer(ConnectionId),

    /// The catalog id is not registered.
    #[error("unknown buyable {0}")]
    UnknownBuyable(BuyableId),

    /// The player cannot pay the price.
    #[error("insufficient gold: need {required}, have {available}")]
    InsufficientGold {
        /// Price of the request.
        required: u32,
        /// Current balance.
        available: u32,
    },

    /// The referenced entity does not exist.
    #[error("entity {0} does not exist")]
    EntityNotFound(EntityId),

    /// The referenced entity is owned by someone else.
    #[error("entity {0} is not owned by the requester")]
    NotOwner(EntityId),

    /// The chosen base is missing, dead, or belongs to someone else.
    #[error("base {0} is not available for placement")]
    BaseUnavailable(EntityId),

    /// The placement point lies outside the base's range.
    #[error("placement is outside the base range")]
    OutOfRange,

    /// The entity does not train units.
    #[error("entity {0} is not a unit spawner")]
    NotASpawner(EntityId),

    /// The training queue is at capacity.
    #[error("training queue is full")]
    QueueFull,

    /// The entity is not a unit.
    #[error("entity {0} is not a unit")]
    NotAUnit(EntityId),

    /// The target cannot be attacked.
    #[error("entity {0} cannot be targeted")]
    NotTargetable(EntityId),

    /// The navigation collaborator found no point near the destination.
    #[error("no navigable point near destination")]
    NoNavigablePoint,

    /// The display name failed the format check.
    #[error("invalid display name: {0}")]
    InvalidName(String),
}

/// Outcome of a request that reached the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestOutcome {
    /// The request was applied.
    Accepted,
    /// The request failed validation and was dropped.
    Rejected(RejectReason),
}

impl RequestOutcome {
    /// Whether the request was applied.
    #[must_use]
    pub const fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted)
    }
}

impl From<RejectReason> for RequestOutcome {
    fn from(reason: RejectReason) -> Self {
        Self::Rejected(reason)
    }
}
