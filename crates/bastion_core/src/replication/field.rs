//! Field identifiers, values and the static descriptor table.

use serde::{Deserialize, Serialize};

use crate::components::{EntityId, EntityKind, TeamColor};
use crate::math::Vec2Fixed;

/// Every replicated field in the game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FieldId {
    /// Player gold balance.
    Gold,
    /// Player display name.
    DisplayName,
    /// Player team color.
    TeamColor,
    /// Current hit points.
    Health,
    /// Units waiting in a spawner's queue.
    TrainingQueue,
    /// Ticks spent on the unit currently in training.
    TrainingProgress,
    /// Unit position.
    Position,
    /// Unit movement destination.
    Destination,
    /// Unit attack target.
    Target,
}

impl FieldId {
    /// All fields, in descriptor order.
    pub const ALL: [Self; 9] = [
        Self::Gold,
        Self::DisplayName,
        Self::TeamColor,
        Self::Health,
        Self::TrainingQueue,
        Self::TrainingProgress,
        Self::Position,
        Self::Destination,
        Self::Target,
    ];
}

/// Declared value type of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldType {
    /// Non-negative integer.
    Count,
    /// UTF-8 string.
    Text,
    /// RGB color.
    Color,
    /// Ground-plane point.
    Point,
    /// Optional ground-plane point.
    OptionalPoint,
    /// Optional entity reference.
    OptionalEntity,
}

/// A field value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldValue {
    /// Non-negative integer.
    Count(u32),
    /// UTF-8 string.
    Text(String),
    /// RGB color.
    Color(TeamColor),
    /// Ground-plane point.
    Point(Vec2Fixed),
    /// Optional ground-plane point.
    OptionalPoint(Option<Vec2Fixed>),
    /// Optional entity reference.
    OptionalEntity(Option<EntityId>),
}

impl FieldValue {
    /// The value's type tag.
    #[must_use]
    pub const fn field_type(&self) -> FieldType {
        match self {
            Self::Count(_) => FieldType::Count,
            Self::Text(_) => FieldType::Text,
            Self::Color(_) => FieldType::Color,
            Self::Point(_) => FieldType::Point,
            Self::OptionalPoint(_) => FieldType::OptionalPoint,
            Self::OptionalEntity(_) => FieldType::OptionalEntity,
        }
    }

    /// Integer payload, if this is a count.
    #[must_use]
    pub const fn as_count(&self) -> Option<u32> {
        match self {
            Self::Count(n) => Some(*n),
            _ => None,
        }
    }

    /// String payload, if this is text.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Point payload; `None` for absent optional points and other types.
    #[must_use]
    pub const fn as_point(&self) -> Option<Vec2Fixed> {
        match self {
            Self::Point(p) | Self::OptionalPoint(Some(p)) => Some(*p),
            _ => None,
        }
    }

    /// Entity payload, if this is a present entity reference.
    #[must_use]
    pub const fn as_entity(&self) -> Option<EntityId> {
        match self {
            Self::OptionalEntity(e) => *e,
            _ => None,
        }
    }
}

/// Something local code on a replica should react to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReplicaEvent {
    /// A player's gold changed.
    GoldChanged {
        /// Player entity.
        player: EntityId,
        /// New balance.
        gold: u32,
    },
    /// A player's display name changed.
    NameChanged {
        /// Player entity.
        player: EntityId,
        /// Previous name.
        old: String,
        /// New name.
        new: String,
    },
    /// A player's color changed.
    ColorChanged {
        /// Player entity.
        player: EntityId,
        /// New color.
        color: TeamColor,
    },
    /// An entity took damage or healed.
    HealthChanged {
        /// Damaged entity.
        entity: EntityId,
        /// Previous hit points.
        old: u32,
        /// Current hit points.
        new: u32,
    },
    /// A spawner's queue length changed.
    QueueChanged {
        /// Spawner building.
        spawner: EntityId,
        /// Units now queued.
        queued: u32,
    },
    /// A unit acquired or dropped a target.
    TargetChanged {
        /// Attacking unit.
        unit: EntityId,
        /// New target.
        target: Option<EntityId>,
    },
}

/// Change hook run on every replica with `(entity, previous, current)`.
pub type ChangeHook = fn(EntityId, &FieldValue, &FieldValue) -> Option<ReplicaEvent>;

/// Static description of one field.
#[derive(Debug, Clone, Copy)]
pub struct FieldDescriptor {
    /// Field identity.
    pub id: FieldId,
    /// Declared value type.
    pub value_type: FieldType,
    /// Entity kinds that carry this field.
    pub carried_by: &'static [EntityKind],
    /// Hook invoked after an effective change.
    pub hook: Option<ChangeHook>,
}

impl FieldDescriptor {
    /// Whether `kind` carries this field.
    #[must_use]
    pub fn is_carried_by(&self, kind: EntityKind) -> bool {
        self.carried_by.contains(&kind)
    }

    /// Run the hook, if any.
    #[must_use]
    pub fn fire(&self, entity: EntityId, old: &FieldValue, new: &FieldValue) -> Option<ReplicaEvent> {
        self.hook.and_then(|hook| hook(entity, old, new))
    }
}

const PLAYER: &[EntityKind] = &[EntityKind::Player];
const DAMAGEABLE: &[EntityKind] = &[EntityKind::Base, EntityKind::Building, EntityKind::Unit];
const BUILDING: &[EntityKind] = &[EntityKind::Building];
const UNIT: &[EntityKind] = &[EntityKind::Unit];

static DESCRIPTORS: [FieldDescriptor; 9] = [
    FieldDescriptor {
        id: FieldId::Gold,
        value_type: FieldType::Count,
        carried_by: PLAYER,
        hook: Some(on_gold),
    },
    FieldDescriptor {
        id: FieldId::DisplayName,
        value_type: FieldType::Text,
        carried_by: PLAYER,
        hook: Some(on_display_name),
    },
    FieldDescriptor {
        id: FieldId::TeamColor,
        value_type: FieldType::Color,
        carried_by: PLAYER,
        hook: Some(on_team_color),
    },
    FieldDescriptor {
        id: FieldId::Health,
        value_type: FieldType::Count,
        carried_by: DAMAGEABLE,
        hook: Some(on_health),
    },
    FieldDescriptor {
        id: FieldId::TrainingQueue,
        value_type: FieldType::Count,
        carried_by: BUILDING,
        hook: Some(on_training_queue),
    },
    FieldDescriptor {
        id: FieldId::TrainingProgress,
        value_type: FieldType::Count,
        carried_by: BUILDING,
        hook: None,
    },
    FieldDescriptor {
        id: FieldId::Position,
        value_type: FieldType::Point,
        carried_by: UNIT,
        hook: None,
    },
    FieldDescriptor {
        id: FieldId::Destination,
        value_type: FieldType::OptionalPoint,
        carried_by: UNIT,
        hook: None,
    },
    FieldDescriptor {
        id: FieldId::Target,
        value_type: FieldType::OptionalEntity,
        carried_by: UNIT,
        hook: Some(on_target),
    },
];

/// Descriptor for a field.
#[must_use]
pub fn descriptor(field: FieldId) -> &'static FieldDescriptor {
    // Table order matches the enum declaration order.
    &DESCRIPTORS[field as usize]
}

fn on_gold(player: EntityId, _old: &FieldValue, new: &FieldValue) -> Option<ReplicaEvent> {
    Some(ReplicaEvent::GoldChanged {
        player,
        gold: new.as_count()?,
    })
}

fn on_display_name(player: EntityId, old: &FieldValue, new: &FieldValue) -> Option<ReplicaEvent> {
    Some(ReplicaEvent::NameChanged {
        player,
        old: old.as_text()?.to_string(),
        new: new.as_text()?.to_string(),
    })
}

fn on_team_color(player: EntityId, _old: &FieldValue, new: &FieldValue) -> Option<ReplicaEvent> {
    match new {
        FieldValue::Color(color) => Some(ReplicaEvent::ColorChanged {
            player,
            color: *color,
        }),
        _ => None,
    }
}

fn on_health(entity: EntityId, old: &FieldValue, new: &FieldValue) -> Option<ReplicaEvent> {
    Some(ReplicaEvent::HealthChanged {
        entity,
        old: old.as_count()?,
        new: new.as_count()?,
    })
}

fn on_training_queue(spawner: EntityId, _old: &FieldValue, new: &FieldValue) -> Option<ReplicaEvent> {
    Some(ReplicaEvent::QueueChanged {
        spawner,
        queued: new.as_count()?,
    })
}

fn on_target(unit: EntityId, _old: &FieldValue, new: &FieldValue) -> Option<ReplicaEvent> {
    match new {
        FieldValue::OptionalEntity(target) => Some(ReplicaEvent::TargetChanged {
            unit,
            target: *target,
        }),
        _ => None,
    }
}

/// One effective change to a field, as produced on the server.
///
/// `seq` counts changes of this field on this entity, starting at 1, so a
/// replica can tell whether a record is newer than what it already holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRecord {
    /// Entity the field belongs to.
    pub entity: EntityId,
    /// Changed field.
    pub field: FieldId,
    /// Per-(entity, field) sequence number.
    pub seq: u64,
    /// Value before the change.
    pub old: FieldValue,
    /// Value after the change.
    pub new: FieldValue,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_table_matches_ids() {
        for field in FieldId::ALL {
            assert_eq!(descriptor(field).id, field);
        }
    }

    #[test]
    fn test_only_units_carry_movement_fields() {
        let position = descriptor(FieldId::Position);
        assert!(position.is_carried_by(EntityKind::Unit));
        assert!(!position.is_carried_by(EntityKind::Building));
        assert!(!descriptor(FieldId::Gold).is_carried_by(EntityKind::Unit));
    }

    #[test]
    fn test_name_hook_reports_old_and_new() {
        let event = descriptor(FieldId::DisplayName).fire(
            EntityId(1),
            &FieldValue::Text("Alpha".into()),
            &FieldValue::Text("Bravo".into()),
        );
        assert_eq!(
            event,
            Some(ReplicaEvent::NameChanged {
                player: EntityId(1),
                old: "Alpha".into(),
                new: "Bravo".into(),
            })
        );
    }

    #[test]
    fn test_fields_without_hooks_stay_quiet() {
        let event = descriptor(FieldId::Position).fire(
            EntityId(1),
            &FieldValue::Point(Vec2Fixed::ZERO),
            &FieldValue::Point(Vec2Fixed::from_ints(1, 1)),
        );
        assert!(event.is_none());
    }
}
