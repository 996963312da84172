//! Named operations exchanged between clients and the server.
//!
//! [`Request`]s flow client to server and are always re-validated there.
//! [`ServerMessage`]s flow server to clients, addressed by an
//! [`Envelope`] either to every observer or to one connection. The byte
//! encoding is bincode and is considered opaque.

use serde::{Deserialize, Serialize};

use crate::components::{BuyableId, ConnectionId, EntityId, EntityKind, Transform};
use crate::error::{GameError, RejectReason, Result};
use crate::math::{fixed_serde, Fixed, Vec2Fixed};
use crate::replication::{ChangeRecord, FieldId, FieldValue};

/// A client-initiated operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Request {
    /// Rename the requester's player.
    SetDisplayName {
        /// Proposed name.
        name: String,
    },
    /// Buy a template and place it next to one of the requester's bases.
    PlaceBuilding {
        /// Catalog id.
        buyable: BuyableId,
        /// Base the new structure belongs to.
        base: EntityId,
        /// Requested position.
        position: Vec2Fixed,
        /// Requested heading in degrees.
        #[serde(with = "fixed_serde")]
        heading: Fixed,
    },
    /// Queue one unit at a spawner.
    TrainUnit {
        /// Spawner building.
        spawner: EntityId,
    },
    /// Order a unit to move. Clears its target.
    MoveUnit {
        /// Unit to move.
        unit: EntityId,
        /// Requested destination.
        destination: Vec2Fixed,
    },
    /// Order a unit to attack.
    SetTarget {
        /// Attacking unit.
        unit: EntityId,
        /// Entity to attack.
        target: EntityId,
    },
    /// Leave the session; treated like a disconnect.
    LeaveGame,
}

impl Request {
    /// Short operation name for logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::SetDisplayName { .. } => "set_display_name",
            Self::PlaceBuilding { .. } => "place_building",
            Self::TrainUnit { .. } => "train_unit",
            Self::MoveUnit { .. } => "move_unit",
            Self::SetTarget { .. } => "set_target",
            Self::LeaveGame => "leave_game",
        }
    }
}

/// A server-initiated message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServerMessage {
    /// A new entity exists, with its full field set.
    Spawned {
        /// New entity.
        entity: EntityId,
        /// Entity kind.
        kind: EntityKind,
        /// Owning connection, if any.
        owner: Option<ConnectionId>,
        /// Template it was built from.
        template: Option<BuyableId>,
        /// Initial placement.
        transform: Transform,
        /// Initial field values.
        fields: Vec<(FieldId, FieldValue)>,
    },
    /// The receiving connection may issue commands for this entity.
    AuthorityGranted {
        /// Owned entity.
        entity: EntityId,
    },
    /// A replicated field changed.
    FieldChanged(ChangeRecord),
    /// An entity was removed.
    Despawned {
        /// Removed entity.
        entity: EntityId,
    },
    /// A player was renamed.
    NameChanged {
        /// Player entity.
        player: EntityId,
        /// Previous name.
        old: String,
        /// New name.
        new: String,
    },
    /// The session ended.
    GameOver {
        /// Winner announcement text.
        winner: String,
    },
    /// A request from the receiving connection was refused.
    RequestRejected {
        /// Refused operation name.
        request: String,
        /// Why it was refused.
        reason: RejectReason,
    },
}

/// Delivery scope of a server message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Target {
    /// Every observing connection.
    All,
    /// One connection.
    Connection(ConnectionId),
}

impl Target {
    /// Whether a message with this target reaches `connection`.
    #[must_use]
    pub fn includes(self, connection: ConnectionId) -> bool {
        match self {
            Self::All => true,
            Self::Connection(c) => c == connection,
        }
    }
}

/// An addressed server message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Who receives it.
    pub target: Target,
    /// Payload.
    pub message: ServerMessage,
}

/// Encode a server message for the wire.
pub fn encode_message(message: &ServerMessage) -> Result<Vec<u8>> {
    bincode::serialize(message).map_err(|e| GameError::Codec(e.to_string()))
}

/// Decode a server message from the wire.
pub fn decode_message(bytes: &[u8]) -> Result<ServerMessage> {
    bincode::deserialize(bytes).map_err(|e| GameError::Codec(e.to_string()))
}

/// Encode a request for the wire.
pub fn encode_request(request: &Request) -> Result<Vec<u8>> {
    bincode::serialize(request).map_err(|e| GameError::Codec(e.to_string()))
}

/// Decode a request from the wire.
pub fn decode_request(bytes: &[u8]) -> Result<Request> {
    bincode::deserialize(bytes).map_err(|e| GameError::Codec(e.to_string()))
}
