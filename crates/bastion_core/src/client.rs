//! Client-side view of a session.
//!
//! A [`ClientSession`] applies server messages to a shadow copy of the
//! world and forwards the local player's requests. It never decides
//! anything: gold, health and ownership only change when the server says
//! so.

use std::collections::{BTreeMap, BTreeSet};

use crate::components::{BuyableId, ConnectionId, EntityId, EntityKind, Transform};
use crate::error::{GameError, RejectReason, Result};
use crate::protocol::{Request, ServerMessage};
use crate::replication::{FieldId, FieldValue, ReplicaEvent, ShadowFields};
use crate::router::{Role, Router, Transport};

/// Registry entry as the client saw it spawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteEntity {
    /// Kind.
    pub kind: EntityKind,
    /// Owning connection.
    pub owner: Option<ConnectionId>,
    /// Template it was built from.
    pub template: Option<BuyableId>,
    /// Placement at spawn time.
    pub transform: Transform,
}

/// Something the presentation layer may want to react to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// An entity appeared.
    Spawned {
        /// New entity.
        entity: EntityId,
        /// Kind.
        kind: EntityKind,
    },
    /// The local player may now command this entity.
    AuthorityGranted {
        /// Owned entity.
        entity: EntityId,
    },
    /// A replicated field hook fired.
    Field(ReplicaEvent),
    /// An entity disappeared.
    Despawned {
        /// Removed entity.
        entity: EntityId,
    },
    /// The session ended.
    GameOver {
        /// Winner announcement.
        winner: String,
    },
    /// The server refused one of our requests.
    Rejected {
        /// Operation name.
        request: String,
        /// Why.
        reason: RejectReason,
    },
}

/// One connection's replica of the session.
#[derive(Debug, Clone)]
pub struct ClientSession {
    router: Router,
    connection: ConnectionId,
    shadow: ShadowFields,
    entities: BTreeMap<EntityId, RemoteEntity>,
    authority: BTreeSet<EntityId>,
    winner: Option<String>,
    events: Vec<ClientEvent>,
}

impl ClientSession {
    /// Create a replica for a client or host role.
    pub fn new(role: Role) -> Result<Self> {
        let connection = role.local_connection().ok_or_else(|| {
            GameError::InvalidState("a dedicated server keeps no client replica".to_string())
        })?;
        Ok(Self {
            router: Router::new(role),
            connection,
            shadow: ShadowFields::new(),
            entities: BTreeMap::new(),
            authority: BTreeSet::new(),
            winner: None,
            events: Vec::new(),
        })
    }

    /// Local connection.
    #[must_use]
    pub const fn connection(&self) -> ConnectionId {
        self.connection
    }

    /// Role this replica runs in.
    #[must_use]
    pub const fn role(&self) -> Role {
        self.router.role()
    }

    /// Forward a request to the server.
    pub fn submit<T: Transport>(&self, request: Request, transport: &mut T) -> Result<()> {
        self.router.submit(request, transport)
    }

    /// Apply one message from the server.
    pub fn on_message(&mut self, message: ServerMessage) {
        match message {
            ServerMessage::Spawned {
                entity,
                kind,
                owner,
                template,
                transform,
                fields,
            } => {
                self.entities.insert(
                    entity,
                    RemoteEntity {
                        kind,
                        owner,
                        template,
                        transform,
                    },
                );
                self.shadow.insert(entity, kind, fields);
                self.events.push(ClientEvent::Spawned { entity, kind });
            }
            ServerMessage::AuthorityGranted { entity } => {
                if self.authority.insert(entity) {
                    self.events.push(ClientEvent::AuthorityGranted { entity });
                }
            }
            ServerMessage::FieldChanged(record) => {
                if let Some(event) = self.shadow.apply(&record) {
                    self.events.push(ClientEvent::Field(event));
                }
            }
            ServerMessage::Despawned { entity } => {
                if self.entities.remove(&entity).is_some() {
                    self.shadow.remove(entity);
                    self.authority.remove(&entity);
                    self.events.push(ClientEvent::Despawned { entity });
                }
            }
            ServerMessage::NameChanged { old, new, .. } => {
                tracing::info!("Player Name changed from \"{old}\" to \"{new}\"");
            }
            ServerMessage::GameOver { winner } => {
                tracing::info!("Game over: {winner} wins");
                self.winner = Some(winner.clone());
                self.events.push(ClientEvent::GameOver { winner });
            }
            ServerMessage::RequestRejected { request, reason } => {
                tracing::warn!("Server rejected {request}: {reason}");
                self.events.push(ClientEvent::Rejected { request, reason });
            }
        }
    }

    /// Apply a batch of messages in order.
    pub fn apply_all(&mut self, messages: impl IntoIterator<Item = ServerMessage>) {
        for message in messages {
            self.on_message(message);
        }
    }

    /// Override a field locally. Never sent to the server and overwritten
    /// by the next authoritative update.
    pub fn set_local(&mut self, entity: EntityId, field: FieldId, value: FieldValue) -> bool {
        self.shadow.set_local(entity, field, value)
    }

    /// Current value of a field as this client sees it.
    #[must_use]
    pub fn field(&self, entity: EntityId, field: FieldId) -> Option<&FieldValue> {
        self.shadow.get(entity, field)
    }

    /// Last value the server sent for a field.
    #[must_use]
    pub fn authoritative(&self, entity: EntityId, field: FieldId) -> Option<&FieldValue> {
        self.shadow.authoritative(entity, field)
    }

    /// Known entity.
    #[must_use]
    pub fn entity(&self, entity: EntityId) -> Option<&RemoteEntity> {
        self.entities.get(&entity)
    }

    /// Number of known entities.
    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// Known entities of a kind, in id order.
    #[must_use]
    pub fn entities_of(&self, kind: EntityKind) -> Vec<EntityId> {
        self.entities
            .iter()
            .filter(|(_, e)| e.kind == kind)
            .map(|(id, _)| *id)
            .collect()
    }

    /// Whether the local player may command `entity`.
    #[must_use]
    pub fn has_authority(&self, entity: EntityId) -> bool {
        self.authority.contains(&entity)
    }

    /// Entities the local player may command, in id order.
    pub fn owned(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.authority.iter().copied()
    }

    /// The local player's entity.
    #[must_use]
    pub fn local_player(&self) -> Option<EntityId> {
        self.entities
            .iter()
            .find(|(_, e)| e.kind == EntityKind::Player && e.owner == Some(self.connection))
            .map(|(id, _)| *id)
    }

    /// The local player's gold, as last replicated.
    #[must_use]
    pub fn gold(&self) -> Option<u32> {
        self.field(self.local_player()?, FieldId::Gold)
            .and_then(FieldValue::as_count)
    }

    /// Display name of a player entity.
    #[must_use]
    pub fn display_name(&self, player: EntityId) -> Option<&str> {
        self.field(player, FieldId::DisplayName)
            .and_then(FieldValue::as_text)
    }

    /// Winner announcement, once received.
    #[must_use]
    pub fn winner(&self) -> Option<&str> {
        self.winner.as_deref()
    }

    /// Take events gathered since the last drain.
    pub fn drain_events(&mut self) -> Vec<ClientEvent> {
        std::mem::take(&mut self.events)
    }
}
