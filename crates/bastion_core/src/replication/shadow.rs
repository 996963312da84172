//! Client-side shadow copy of replicated fields.

use std::collections::{BTreeMap, HashMap};

use crate::components::{EntityId, EntityKind};

use super::field::{descriptor, ChangeRecord, FieldId, FieldValue, ReplicaEvent};

#[derive(Debug, Clone)]
struct ShadowSlot {
    authoritative: FieldValue,
    local: Option<FieldValue>,
    seq: u64,
}

#[derive(Debug, Clone)]
struct ShadowEntity {
    kind: EntityKind,
    slots: BTreeMap<FieldId, ShadowSlot>,
}

/// A replica's view of server-owned fields.
///
/// Server records always win: applying one replaces the authoritative
/// value and discards any local override on that field. Local overrides
/// exist only for client-side prediction or UI previews.
#[derive(Debug, Clone, Default)]
pub struct ShadowFields {
    entities: HashMap<EntityId, ShadowEntity>,
}

impl ShadowFields {
    /// Create an empty shadow.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start shadowing an entity announced by the server.
    pub fn insert(&mut self, entity: EntityId, kind: EntityKind, fields: Vec<(FieldId, FieldValue)>) {
        let slots = fields
            .into_iter()
            .map(|(field, value)| {
                (
                    field,
                    ShadowSlot {
                        authoritative: value,
                        local: None,
                        seq: 0,
                    },
                )
            })
            .collect();
        self.entities.insert(entity, ShadowEntity { kind, slots });
    }

    /// Stop shadowing an entity.
    pub fn remove(&mut self, entity: EntityId) -> bool {
        self.entities.remove(&entity).is_some()
    }

    /// Apply a server change record, running the field's hook.
    ///
    /// Records older than what the shadow already holds are ignored.
    pub fn apply(&mut self, record: &ChangeRecord) -> Option<ReplicaEvent> {
        let Some(entity) = self.entities.get_mut(&record.entity) else {
            tracing::debug!("Change for unknown entity {} ignored", record.entity);
            return None;
        };
        if !descriptor(record.field).is_carried_by(entity.kind) {
            tracing::warn!(
                "{:?} entity {} does not carry {:?}",
                entity.kind,
                record.entity,
                record.field
            );
            return None;
        }

        let slot = entity.slots.entry(record.field).or_insert_with(|| ShadowSlot {
            authoritative: record.old.clone(),
            local: None,
            seq: 0,
        });
        if record.seq <= slot.seq {
            tracing::debug!(
                "Stale change {} for {:?} on {} ignored",
                record.seq,
                record.field,
                record.entity
            );
            return None;
        }

        slot.authoritative = record.new.clone();
        slot.local = None;
        slot.seq = record.seq;

        descriptor(record.field).fire(record.entity, &record.old, &record.new)
    }

    /// Change the local copy only. Nothing is sent to the server and the
    /// next record for this field overwrites it.
    ///
    /// Returns `false` if the entity or field is not shadowed.
    pub fn set_local(&mut self, entity: EntityId, field: FieldId, value: FieldValue) -> bool {
        match self
            .entities
            .get_mut(&entity)
            .and_then(|e| e.slots.get_mut(&field))
        {
            Some(slot) => {
                slot.local = Some(value);
                true
            }
            None => false,
        }
    }

    /// Value as displayed on this replica: the local override if any,
    /// otherwise the last server value.
    #[must_use]
    pub fn get(&self, entity: EntityId, field: FieldId) -> Option<&FieldValue> {
        let slot = self.entities.get(&entity)?.slots.get(&field)?;
        Some(slot.local.as_ref().unwrap_or(&slot.authoritative))
    }

    /// Last value received from the server, ignoring local overrides.
    #[must_use]
    pub fn authoritative(&self, entity: EntityId, field: FieldId) -> Option<&FieldValue> {
        self.entities
            .get(&entity)?
            .slots
            .get(&field)
            .map(|slot| &slot.authoritative)
    }

    /// Kind of a shadowed entity.
    #[must_use]
    pub fn kind(&self, entity: EntityId) -> Option<EntityKind> {
        self.entities.get(&entity).map(|e| e.kind)
    }

    /// Whether the entity is shadowed.
    #[must_use]
    pub fn contains(&self, entity: EntityId) -> bool {
        self.entities.contains_key(&entity)
    }
}
