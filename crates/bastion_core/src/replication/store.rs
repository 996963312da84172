//! Server-side authoritative field storage.

use std::collections::{BTreeMap, HashMap};

use crate::components::{ConnectionId, EntityId, EntityKind};
use crate::error::{GameError, Result};

use super::field::{descriptor, ChangeRecord, FieldId, FieldValue, ReplicaEvent};

/// Who is attempting a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Caller {
    /// The authoritative server.
    Server,
    /// A client connection. Never allowed to write.
    Client(ConnectionId),
}

#[derive(Debug, Clone)]
struct Slot {
    value: FieldValue,
    seq: u64,
}

#[derive(Debug, Clone)]
struct EntityFields {
    kind: EntityKind,
    slots: BTreeMap<FieldId, Slot>,
}

/// Authoritative field values for every live entity.
///
/// Only [`Caller::Server`] may write. Each effective write returns a
/// [`ChangeRecord`] for the caller to queue to observers, and runs the
/// field's change hook so the server's own presentation layer sees the
/// same [`ReplicaEvent`]s as clients do.
#[derive(Debug, Clone, Default)]
pub struct FieldStore {
    entities: HashMap<EntityId, EntityFields>,
    events: Vec<ReplicaEvent>,
}

impl FieldStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking an entity with its initial values.
    ///
    /// Initial values do not produce change records or hook events; they
    /// reach observers inside the spawn announcement.
    pub fn register(
        &mut self,
        entity: EntityId,
        kind: EntityKind,
        initial: Vec<(FieldId, FieldValue)>,
    ) -> Result<()> {
        if self.entities.contains_key(&entity) {
            return Err(GameError::InvariantViolation(format!(
                "fields for {entity} registered twice"
            )));
        }

        let mut slots = BTreeMap::new();
        for (field, value) in initial {
            check_field(field, kind, &value)?;
            slots.insert(field, Slot { value, seq: 0 });
        }
        self.entities.insert(entity, EntityFields { kind, slots });
        Ok(())
    }

    /// Stop tracking an entity. Returns whether it was tracked.
    pub fn unregister(&mut self, entity: EntityId) -> bool {
        self.entities.remove(&entity).is_some()
    }

    /// Write a field.
    ///
    /// Returns `Ok(None)` when the new value equals the current one.
    pub fn set(
        &mut self,
        caller: Caller,
        entity: EntityId,
        field: FieldId,
        value: FieldValue,
    ) -> Result<Option<ChangeRecord>> {
        if let Caller::Client(connection) = caller {
            tracing::warn!(
                "Ignoring write of {field:?} on {entity} from client connection {connection}"
            );
            return Err(GameError::NotAuthoritative { entity, field });
        }

        let fields = self
            .entities
            .get_mut(&entity)
            .ok_or(GameError::EntityNotFound(entity))?;
        check_field(field, fields.kind, &value)?;

        let slot = fields.slots.get_mut(&field).ok_or_else(|| {
            GameError::InvariantViolation(format!("{field:?} on {entity} was never initialized"))
        })?;
        if slot.value == value {
            return Ok(None);
        }

        let old = std::mem::replace(&mut slot.value, value.clone());
        slot.seq += 1;

        if let Some(event) = descriptor(field).fire(entity, &old, &value) {
            self.events.push(event);
        }

        Ok(Some(ChangeRecord {
            entity,
            field,
            seq: slot.seq,
            old,
            new: value,
        }))
    }

    /// Current value of a field.
    #[must_use]
    pub fn get(&self, entity: EntityId, field: FieldId) -> Option<&FieldValue> {
        self.entities
            .get(&entity)
            .and_then(|fields| fields.slots.get(&field))
            .map(|slot| &slot.value)
    }

    /// Current value of a count field.
    #[must_use]
    pub fn count(&self, entity: EntityId, field: FieldId) -> Option<u32> {
        self.get(entity, field).and_then(FieldValue::as_count)
    }

    /// Current value of a text field.
    #[must_use]
    pub fn text(&self, entity: EntityId, field: FieldId) -> Option<&str> {
        self.get(entity, field).and_then(FieldValue::as_text)
    }

    /// Whether the entity is tracked.
    #[must_use]
    pub fn contains(&self, entity: EntityId) -> bool {
        self.entities.contains_key(&entity)
    }

    /// All current values of an entity, in field order.
    #[must_use]
    pub fn snapshot(&self, entity: EntityId) -> Vec<(FieldId, FieldValue)> {
        self.entities
            .get(&entity)
            .map(|fields| {
                fields
                    .slots
                    .iter()
                    .map(|(field, slot)| (*field, slot.value.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Take the hook events produced since the last drain.
    pub fn drain_events(&mut self) -> Vec<ReplicaEvent> {
        std::mem::take(&mut self.events)
    }
}

fn check_field(field: FieldId, kind: EntityKind, value: &FieldValue) -> Result<()> {
    let desc = descriptor(field);
    if !desc.is_carried_by(kind) {
        return Err(GameError::FieldNotCarried { field, kind });
    }
    if value.field_type() != desc.value_type {
        return Err(GameError::FieldTypeMismatch {
            field,
            expected: desc.value_type,
        });
    }
    Ok(())
}
