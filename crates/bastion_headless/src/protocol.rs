//! JSON protocol for the headless driver.
//!
//! The driver communicates via JSON lines (one JSON object per line):
//!
//! **Input (stdin):** Commands from the controller
//! **Output (stdout):** Responses and state
//!
//! # Example Session
//!
//! ```text
//! <- {"type":"ready","version":"1.0","tick":0}
//! -> {"cmd":"connect"}
//! <- {"type":"connected","connection":1,"player":1}
//! -> {"cmd":"request","connection":1,"request":{"op":"set_display_name","name":"Ada"}}
//! <- {"type":"outcome","connection":1,"op":"set_display_name","accepted":true}
//! -> {"cmd":"tick","count":20}
//! <- {"type":"ticked","tick":20}
//! -> {"cmd":"query","connection":1}
//! <- {"type":"state","tick":20,"connection":1,"entities":[...],...}
//! ```
//!
//! Positions are plain numbers on the wire and converted to fixed-point
//! on arrival, saturating at the fixed-point range.

use bastion_core::components::{BuyableId, EntityId, EntityKind};
use bastion_core::math::{Fixed, Vec2Fixed};
use bastion_core::protocol::Request;
use serde::{Deserialize, Serialize};

// ============================================================================
// Input Commands (Controller -> Driver)
// ============================================================================

/// Commands accepted by the driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum Command {
    /// Connect a client. The next free id is used when omitted.
    Connect {
        #[serde(default)]
        connection: Option<u32>,
    },

    /// Drop a client's connection.
    Disconnect { connection: u32 },

    /// Send a request from a client through its replica.
    Request { connection: u32, request: RequestSpec },

    /// Advance the server by N ticks (default: 1).
    Tick {
        #[serde(default = "default_tick_count")]
        count: u32,
    },

    /// Report state: the server's view, or one replica's.
    Query {
        #[serde(default)]
        connection: Option<u32>,
    },

    /// Report the server state hash.
    Hash,

    /// Stop reading commands.
    Quit,
}

fn default_tick_count() -> u32 {
    1
}

/// A request in controller-friendly form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum RequestSpec {
    SetDisplayName {
        name: String,
    },
    PlaceBuilding {
        buyable: u32,
        base: u64,
        x: f64,
        y: f64,
        #[serde(default)]
        heading: f64,
    },
    TrainUnit {
        spawner: u64,
    },
    MoveUnit {
        unit: u64,
        x: f64,
        y: f64,
    },
    SetTarget {
        unit: u64,
        target: u64,
    },
    LeaveGame,
}

impl RequestSpec {
    /// Convert to the wire request.
    #[must_use]
    pub fn to_request(&self) -> Request {
        match self {
            Self::SetDisplayName { name } => Request::SetDisplayName { name: name.clone() },
            Self::PlaceBuilding {
                buyable,
                base,
                x,
                y,
                heading,
            } => Request::PlaceBuilding {
                buyable: BuyableId(*buyable),
                base: EntityId(*base),
                position: point(*x, *y),
                heading: Fixed::saturating_from_num(*heading),
            },
            Self::TrainUnit { spawner } => Request::TrainUnit {
                spawner: EntityId(*spawner),
            },
            Self::MoveUnit { unit, x, y } => Request::MoveUnit {
                unit: EntityId(*unit),
                destination: point(*x, *y),
            },
            Self::SetTarget { unit, target } => Request::SetTarget {
                unit: EntityId(*unit),
                target: EntityId(*target),
            },
            Self::LeaveGame => Request::LeaveGame,
        }
    }
}

fn point(x: f64, y: f64) -> Vec2Fixed {
    Vec2Fixed::new(Fixed::saturating_from_num(x), Fixed::saturating_from_num(y))
}

// ============================================================================
// Output Responses (Driver -> Controller)
// ============================================================================

/// Responses written by the driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    /// Driver is ready to accept commands.
    Ready { version: String, tick: u64 },

    /// A client joined.
    Connected { connection: u32, player: u64 },

    /// A client left.
    Disconnected { connection: u32 },

    /// Result of a request.
    Outcome {
        connection: u32,
        op: String,
        accepted: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },

    /// Ticks were run.
    Ticked { tick: u64 },

    /// State snapshot.
    State(StateReport),

    /// State hash for determinism verification.
    StateHash { tick: u64, hash: u64 },

    /// The session ended.
    GameOver { tick: u64, winner: String },

    /// Error processing a command.
    Error {
        message: String,
        cmd: Option<String>,
    },

    /// Goodbye message before shutdown.
    Bye,
}

/// State as seen by the server or one replica.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateReport {
    pub tick: u64,
    /// Replica viewpoint; `None` for the server.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection: Option<u32>,
    pub entities: Vec<EntityState>,
    /// Gold of the viewing connection (server view: omitted).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gold: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub winner: Option<String>,
    pub hash: u64,
}

/// One entity in a state report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityState {
    pub id: u64,
    pub kind: EntityKindName,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<u32>,
    pub x: f64,
    pub y: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub health: Option<u32>,
    /// Whether the viewing connection may command it.
    #[serde(default)]
    pub authority: bool,
}

/// Entity kind on the JSON wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKindName {
    Player,
    Base,
    Building,
    Unit,
}

impl From<EntityKind> for EntityKindName {
    fn from(kind: EntityKind) -> Self {
        match kind {
            EntityKind::Player => Self::Player,
            EntityKind::Base => Self::Base,
            EntityKind::Building => Self::Building,
            EntityKind::Unit => Self::Unit,
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

impl Response {
    /// Create a ready response.
    pub fn ready(tick: u64) -> Self {
        Self::Ready {
            version: "1.0".to_string(),
            tick,
        }
    }

    /// Create an error response.
    pub fn error(message: impl Into<String>, cmd: Option<&str>) -> Self {
        Self::Error {
            message: message.into(),
            cmd: cmd.map(String::from),
        }
    }

    /// Serialize to JSON line (with newline).
    pub fn to_json_line(&self) -> String {
        let mut json = serde_json::to_string(self).unwrap_or_else(|e| {
            format!(r#"{{"type":"error","message":"Serialization failed: {e}"}}"#)
        });
        json.push('\n');
        json
    }
}

impl Command {
    /// Parse from a JSON line.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Get command name for responses.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Connect { .. } => "connect",
            Self::Disconnect { .. } => "disconnect",
            Self::Request { .. } => "request",
            Self::Tick { .. } => "tick",
            Self::Query { .. } => "query",
            Self::Hash => "hash",
            Self::Quit => "quit",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tick_command() {
        let cmd = Command::from_json(r#"{"cmd":"tick","count":60}"#).unwrap();
        assert_eq!(cmd, Command::Tick { count: 60 });
    }

    #[test]
    fn test_default_tick_count() {
        let cmd = Command::from_json(r#"{"cmd":"tick"}"#).unwrap();
        assert_eq!(cmd, Command::Tick { count: 1 });
    }

    #[test]
    fn test_parse_request_command() {
        let json = r#"{"cmd":"request","connection":2,"request":{"op":"move_unit","unit":7,"x":10.5,"y":-3}}"#;
        let Command::Request { connection, request } = Command::from_json(json).unwrap() else {
            panic!("not a request");
        };
        assert_eq!(connection, 2);
        assert_eq!(
            request.to_request(),
            Request::MoveUnit {
                unit: EntityId(7),
                destination: Vec2Fixed::new(Fixed::from_num(10.5), Fixed::from_num(-3)),
            }
        );
    }

    #[test]
    fn test_heading_defaults_to_zero() {
        let json = r#"{"op":"place_building","buyable":1,"base":2,"x":0,"y":0}"#;
        let spec: RequestSpec = serde_json::from_str(json).unwrap();
        assert!(matches!(
            spec.to_request(),
            Request::PlaceBuilding { heading, .. } if heading == Fixed::ZERO
        ));
    }

    #[test]
    fn test_serialize_state_response() {
        let resp = Response::State(StateReport {
            tick: 100,
            connection: None,
            entities: vec![EntityState {
                id: 3,
                kind: EntityKindName::Base,
                owner: Some(1),
                x: 0.0,
                y: 0.0,
                health: Some(400),
                authority: false,
            }],
            gold: None,
            winner: None,
            hash: 12345,
        });
        let json = resp.to_json_line();
        assert!(json.contains(r#""type":"state""#));
        assert!(json.contains(r#""kind":"base""#));
        assert!(!json.contains("gold"));
        assert!(json.ends_with('\n'));
    }

    #[test]
    fn test_unknown_command_fails() {
        assert!(Command::from_json(r#"{"cmd":"spawn"}"#).is_err());
    }
}
