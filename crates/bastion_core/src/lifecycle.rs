//! Entity lifecycle and authority.
//!
//! The [`EntityRegistry`] allocates entity ids, records owners, keeps the
//! observer set, and decides who hears about each spawn and despawn.
//! Subscriptions belong to a watcher entity and disappear with it, so no
//! caller has to remember to unsubscribe.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::components::{BuyableId, ConnectionId, EntityId, EntityKind, Transform};
use crate::error::{GameError, Result};

/// Parameters for spawning an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpawnParams {
    /// Entity kind.
    pub kind: EntityKind,
    /// Catalog template, if built from one.
    pub template: Option<BuyableId>,
    /// Initial placement.
    pub transform: Transform,
    /// Connection granted authority, or `None` for server-owned.
    pub owner: Option<ConnectionId>,
}

/// Registry entry for a live entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRecord {
    /// Identity.
    pub id: EntityId,
    /// Kind.
    pub kind: EntityKind,
    /// Owning connection.
    pub owner: Option<ConnectionId>,
    /// Template it was built from.
    pub template: Option<BuyableId>,
    /// Current placement.
    pub transform: Transform,
}

/// A spawn or despawn, as seen by subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LifecycleEvent {
    /// The entity now exists.
    Spawned {
        /// New entity.
        entity: EntityId,
        /// Kind.
        kind: EntityKind,
        /// Owner.
        owner: Option<ConnectionId>,
    },
    /// The entity no longer exists.
    Despawned {
        /// Removed entity.
        entity: EntityId,
        /// Kind.
        kind: EntityKind,
        /// Owner.
        owner: Option<ConnectionId>,
    },
}

impl LifecycleEvent {
    /// Entity the event is about.
    #[must_use]
    pub const fn entity(&self) -> EntityId {
        match self {
            Self::Spawned { entity, .. } | Self::Despawned { entity, .. } => *entity,
        }
    }

    /// Kind of that entity.
    #[must_use]
    pub const fn kind(&self) -> EntityKind {
        match self {
            Self::Spawned { kind, .. } | Self::Despawned { kind, .. } => *kind,
        }
    }

    /// Owner of that entity.
    #[must_use]
    pub const fn owner(&self) -> Option<ConnectionId> {
        match self {
            Self::Spawned { owner, .. } | Self::Despawned { owner, .. } => *owner,
        }
    }
}

/// A lifecycle event plus the watchers that must process it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    /// What happened.
    pub event: LifecycleEvent,
    /// Watchers subscribed to this owner and kind, in id order.
    pub subscribers: Vec<EntityId>,
}

#[derive(Debug, Clone)]
struct Subscription {
    owner: Option<ConnectionId>,
    kinds: Vec<EntityKind>,
}

/// Authoritative set of live entities.
#[derive(Debug, Clone)]
pub struct EntityRegistry {
    entities: BTreeMap<EntityId, EntityRecord>,
    next_id: u64,
    observers: BTreeSet<ConnectionId>,
    subscriptions: BTreeMap<EntityId, Subscription>,
}

impl Default for EntityRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityRegistry {
    /// Create an empty registry. Ids start at 1.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entities: BTreeMap::new(),
            next_id: 1,
            observers: BTreeSet::new(),
            subscriptions: BTreeMap::new(),
        }
    }

    /// Allocate and register a new entity.
    pub fn spawn(&mut self, params: SpawnParams) -> Notice {
        let id = EntityId(self.next_id);
        self.next_id += 1;

        self.entities.insert(
            id,
            EntityRecord {
                id,
                kind: params.kind,
                owner: params.owner,
                template: params.template,
                transform: params.transform,
            },
        );

        #[cfg(debug_assertions)]
        tracing::debug!("Spawned {:?} {id} owned by {:?}", params.kind, params.owner);

        self.notice(LifecycleEvent::Spawned {
            entity: id,
            kind: params.kind,
            owner: params.owner,
        })
    }

    /// Remove an entity. A second call for the same id is a no-op.
    ///
    /// Any subscription held by the entity is dropped with it.
    pub fn despawn(&mut self, id: EntityId) -> Option<(EntityRecord, Notice)> {
        let record = self.entities.remove(&id)?;
        self.subscriptions.remove(&id);

        #[cfg(debug_assertions)]
        tracing::debug!("Despawned {:?} {id}", record.kind);

        let notice = self.notice(LifecycleEvent::Despawned {
            entity: id,
            kind: record.kind,
            owner: record.owner,
        });
        Some((record, notice))
    }

    /// Subscribe a live watcher to spawn/despawn events of `kinds` that
    /// share its owner.
    pub fn subscribe(&mut self, watcher: EntityId, kinds: &[EntityKind]) -> Result<()> {
        let record = self
            .entities
            .get(&watcher)
            .ok_or(GameError::EntityNotFound(watcher))?;
        let owner = record.owner;

        let entry = self.subscriptions.entry(watcher).or_insert(Subscription {
            owner,
            kinds: Vec::new(),
        });
        for kind in kinds {
            if !entry.kinds.contains(kind) {
                entry.kinds.push(*kind);
            }
        }
        Ok(())
    }

    /// Whether a watcher currently holds a subscription.
    #[must_use]
    pub fn is_subscribed(&self, watcher: EntityId) -> bool {
        self.subscriptions.contains_key(&watcher)
    }

    fn notice(&self, event: LifecycleEvent) -> Notice {
        let subscribers = self
            .subscriptions
            .iter()
            .filter(|(watcher, sub)| {
                **watcher != event.entity()
                    && sub.owner.is_some()
                    && sub.owner == event.owner()
                    && sub.kinds.contains(&event.kind())
            })
            .map(|(watcher, _)| *watcher)
            .collect();
        Notice { event, subscribers }
    }

    /// Start sending replicated state to a connection.
    pub fn add_observer(&mut self, connection: ConnectionId) -> bool {
        self.observers.insert(connection)
    }

    /// Stop sending replicated state to a connection.
    pub fn remove_observer(&mut self, connection: ConnectionId) -> bool {
        self.observers.remove(&connection)
    }

    /// Connections currently observing, in id order.
    pub fn observers(&self) -> impl Iterator<Item = ConnectionId> + '_ {
        self.observers.iter().copied()
    }

    /// Look up a live entity.
    #[must_use]
    pub fn get(&self, id: EntityId) -> Option<&EntityRecord> {
        self.entities.get(&id)
    }

    /// Look up a live entity, failing with [`GameError::EntityNotFound`].
    pub fn require(&self, id: EntityId) -> Result<&EntityRecord> {
        self.get(id).ok_or(GameError::EntityNotFound(id))
    }

    /// Whether the entity is alive.
    #[must_use]
    pub fn is_alive(&self, id: EntityId) -> bool {
        self.entities.contains_key(&id)
    }

    /// Move a live entity.
    pub fn set_transform(&mut self, id: EntityId, transform: Transform) -> Result<()> {
        let record = self
            .entities
            .get_mut(&id)
            .ok_or(GameError::EntityNotFound(id))?;
        record.transform = transform;
        Ok(())
    }

    /// Live entity ids in ascending order.
    #[must_use]
    pub fn sorted_ids(&self) -> Vec<EntityId> {
        self.entities.keys().copied().collect()
    }

    /// Iterate live entities in id order.
    pub fn iter(&self) -> impl Iterator<Item = &EntityRecord> {
        self.entities.values()
    }

    /// Number of live entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Whether no entity is alive.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Next id that will be allocated.
    #[must_use]
    pub const fn next_id(&self) -> u64 {
        self.next_id
    }
}
