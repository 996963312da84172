//! Ownership hierarchy: player → bases → buildings, and player → units.
//!
//! The tracker only changes in response to lifecycle notifications. Every
//! handler validates first and mutates second, so a rejected notification
//! leaves the hierarchy exactly as it was.
//!
//! Buildings name their base explicitly. When no base is given the
//! player's *selected* base is used: the most recently registered base
//! that is still standing.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::components::{ConnectionId, EntityId, EntityKind};
use crate::error::{GameError, Result};
use crate::lifecycle::LifecycleEvent;

#[derive(Debug, Clone, PartialEq, Eq)]
struct BaseEntry {
    base: EntityId,
    buildings: BTreeSet<EntityId>,
}

/// Everything one player owns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Holdings {
    player: EntityId,
    // Registration order; the last entry is the selected base.
    bases: Vec<BaseEntry>,
    units: BTreeSet<EntityId>,
}

impl Holdings {
    fn new(player: EntityId) -> Self {
        Self {
            player,
            bases: Vec::new(),
            units: BTreeSet::new(),
        }
    }

    /// Player entity.
    #[must_use]
    pub const fn player(&self) -> EntityId {
        self.player
    }

    /// Standing bases in registration order.
    #[must_use]
    pub fn bases(&self) -> Vec<EntityId> {
        self.bases.iter().map(|b| b.base).collect()
    }

    /// Owned units in id order.
    #[must_use]
    pub fn units(&self) -> Vec<EntityId> {
        self.units.iter().copied().collect()
    }

    /// Base that receives buildings placed without an explicit base.
    #[must_use]
    pub fn selected_base(&self) -> Option<EntityId> {
        self.bases.last().map(|b| b.base)
    }

    fn base(&self, base: EntityId) -> Option<&BaseEntry> {
        self.bases.iter().find(|b| b.base == base)
    }

    fn base_mut(&mut self, base: EntityId) -> Option<&mut BaseEntry> {
        self.bases.iter_mut().find(|b| b.base == base)
    }
}

/// Per-player containment graph.
#[derive(Debug, Clone, Default)]
pub struct OwnershipTracker {
    players: BTreeMap<ConnectionId, Holdings>,
    building_base: HashMap<EntityId, EntityId>,
}

impl OwnershipTracker {
    /// Create an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a player.
    pub fn add_player(&mut self, connection: ConnectionId, player: EntityId) -> Result<()> {
        if self.players.contains_key(&connection) {
            return Err(GameError::InvariantViolation(format!(
                "connection {connection} already has a player"
            )));
        }
        self.players.insert(connection, Holdings::new(player));
        Ok(())
    }

    /// Stop tracking a player, returning whatever it still held.
    pub fn remove_player(&mut self, connection: ConnectionId) -> Option<Holdings> {
        let holdings = self.players.remove(&connection)?;
        for entry in &holdings.bases {
            for building in &entry.buildings {
                self.building_base.remove(building);
            }
        }
        Some(holdings)
    }

    /// Apply one lifecycle notification for `connection`'s player.
    ///
    /// `parent` names the base of a spawned building; other events ignore
    /// it.
    pub fn apply(
        &mut self,
        connection: ConnectionId,
        event: &LifecycleEvent,
        parent: Option<EntityId>,
    ) -> Result<()> {
        match (*event, event.kind()) {
            (LifecycleEvent::Spawned { entity, .. }, EntityKind::Base) => {
                self.register_base(connection, entity)
            }
            (LifecycleEvent::Spawned { entity, .. }, EntityKind::Building) => self
                .register_building(connection, entity, parent)
                .map(|_| ()),
            (LifecycleEvent::Spawned { entity, .. }, EntityKind::Unit) => {
                self.register_unit(connection, entity)
            }
            (LifecycleEvent::Despawned { entity, .. }, EntityKind::Base) => {
                self.forget_base(connection, entity);
                Ok(())
            }
            (LifecycleEvent::Despawned { entity, .. }, EntityKind::Building) => {
                self.forget_building(entity);
                Ok(())
            }
            (LifecycleEvent::Despawned { entity, .. }, EntityKind::Unit) => {
                if let Some(holdings) = self.players.get_mut(&connection) {
                    holdings.units.remove(&entity);
                }
                Ok(())
            }
            (_, EntityKind::Player) => Ok(()),
        }?;

        #[cfg(feature = "debug-validation")]
        self.assert_consistent();

        Ok(())
    }

    /// Register a new base and make it the selected one.
    pub fn register_base(&mut self, connection: ConnectionId, base: EntityId) -> Result<()> {
        let holdings = self.holdings_mut(connection)?;
        if holdings.base(base).is_some() {
            return Err(GameError::InvariantViolation(format!(
                "base {base} registered twice"
            )));
        }
        holdings.bases.push(BaseEntry {
            base,
            buildings: BTreeSet::new(),
        });
        Ok(())
    }

    /// Attribute a new building to `base`, or to the selected base when
    /// none is given. Returns the base it was attributed to.
    pub fn register_building(
        &mut self,
        connection: ConnectionId,
        building: EntityId,
        base: Option<EntityId>,
    ) -> Result<EntityId> {
        let base = self.resolve_base(connection, base)?;
        if self.building_base.contains_key(&building) {
            return Err(GameError::InvariantViolation(format!(
                "building {building} registered twice"
            )));
        }

        let holdings = self.holdings_mut(connection)?;
        let entry = holdings.base_mut(base).ok_or_else(|| {
            GameError::InvariantViolation(format!("base {base} vanished during attribution"))
        })?;
        entry.buildings.insert(building);
        self.building_base.insert(building, base);
        Ok(base)
    }

    /// Find the base a new building would be attributed to.
    pub fn resolve_base(&self, connection: ConnectionId, base: Option<EntityId>) -> Result<EntityId> {
        let holdings = self.holdings(connection)?;
        match base {
            Some(base) if holdings.base(base).is_some() => Ok(base),
            Some(base) => Err(GameError::InvariantViolation(format!(
                "building spawned for base {base}, which connection {connection} does not hold"
            ))),
            None => holdings.selected_base().ok_or_else(|| {
                GameError::InvariantViolation(format!(
                    "building spawned for connection {connection} with no selected base"
                ))
            }),
        }
    }

    /// Start tracking a unit.
    pub fn register_unit(&mut self, connection: ConnectionId, unit: EntityId) -> Result<()> {
        self.holdings_mut(connection)?.units.insert(unit);
        Ok(())
    }

    /// First step of a cascade: take the base out of the active set so
    /// nothing new can be attributed to it, and hand back its buildings.
    ///
    /// Returns `None` when the base is not active (already torn down).
    pub fn begin_teardown(&mut self, connection: ConnectionId, base: EntityId) -> Option<Vec<EntityId>> {
        let holdings = self.players.get_mut(&connection)?;
        let index = holdings.bases.iter().position(|b| b.base == base)?;
        let entry = holdings.bases.remove(index);
        Some(entry.buildings.into_iter().collect())
    }

    fn forget_base(&mut self, connection: ConnectionId, base: EntityId) {
        if let Some(orphans) = self.begin_teardown(connection, base) {
            // Despawned without a cascade; its buildings lose their parent.
            for building in orphans {
                self.building_base.remove(&building);
            }
        }
    }

    fn forget_building(&mut self, building: EntityId) {
        let Some(base) = self.building_base.remove(&building) else {
            return;
        };
        for holdings in self.players.values_mut() {
            if let Some(entry) = holdings.base_mut(base) {
                entry.buildings.remove(&building);
                return;
            }
        }
    }

    fn holdings(&self, connection: ConnectionId) -> Result<&Holdings> {
        self.players
            .get(&connection)
            .ok_or(GameError::UnknownConnection(connection))
    }

    fn holdings_mut(&mut self, connection: ConnectionId) -> Result<&mut Holdings> {
        self.players
            .get_mut(&connection)
            .ok_or(GameError::UnknownConnection(connection))
    }

    /// Holdings of a player.
    #[must_use]
    pub fn get(&self, connection: ConnectionId) -> Option<&Holdings> {
        self.players.get(&connection)
    }

    /// Number of standing bases a player holds.
    #[must_use]
    pub fn base_count(&self, connection: ConnectionId) -> usize {
        self.players.get(&connection).map_or(0, |h| h.bases.len())
    }

    /// Whether `base` is an active base of `connection`.
    #[must_use]
    pub fn holds_base(&self, connection: ConnectionId, base: EntityId) -> bool {
        self.players
            .get(&connection)
            .is_some_and(|h| h.base(base).is_some())
    }

    /// Buildings attributed to an active base, in id order.
    #[must_use]
    pub fn buildings_of(&self, base: EntityId) -> Vec<EntityId> {
        self.players
            .values()
            .find_map(|h| h.base(base))
            .map(|entry| entry.buildings.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Base a building is attributed to.
    #[must_use]
    pub fn base_of(&self, building: EntityId) -> Option<EntityId> {
        self.building_base.get(&building).copied()
    }

    /// Tracked connections.
    pub fn connections(&self) -> impl Iterator<Item = ConnectionId> + '_ {
        self.players.keys().copied()
    }

    #[cfg(feature = "debug-validation")]
    fn assert_consistent(&self) {
        for (building, base) in &self.building_base {
            let held = self
                .players
                .values()
                .any(|h| h.base(*base).is_some_and(|e| e.buildings.contains(building)));
            assert!(held, "building {building} points at missing base {base}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const P1: ConnectionId = ConnectionId(1);

    fn spawned(entity: u64, kind: EntityKind) -> LifecycleEvent {
        LifecycleEvent::Spawned {
            entity: EntityId(entity),
            kind,
            owner: Some(P1),
        }
    }

    fn despawned(entity: u64, kind: EntityKind) -> LifecycleEvent {
        LifecycleEvent::Despawned {
            entity: EntityId(entity),
            kind,
            owner: Some(P1),
        }
    }

    fn tracker_with_base() -> OwnershipTracker {
        let mut tracker = OwnershipTracker::new();
        tracker.add_player(P1, EntityId(1)).unwrap();
        tracker.apply(P1, &spawned(2, EntityKind::Base), None).unwrap();
        tracker
    }

    #[test]
    fn test_building_goes_to_explicit_base() {
        let mut tracker = tracker_with_base();
        tracker.apply(P1, &spawned(3, EntityKind::Base), None).unwrap();

        tracker
            .apply(P1, &spawned(4, EntityKind::Building), Some(EntityId(2)))
            .unwrap();

        assert_eq!(tracker.buildings_of(EntityId(2)), vec![EntityId(4)]);
        assert!(tracker.buildings_of(EntityId(3)).is_empty());
        assert_eq!(tracker.base_of(EntityId(4)), Some(EntityId(2)));
    }

    #[test]
    fn test_building_without_base_uses_latest() {
        let mut tracker = tracker_with_base();
        tracker.apply(P1, &spawned(3, EntityKind::Base), None).unwrap();
        tracker.apply(P1, &spawned(4, EntityKind::Building), None).unwrap();
        assert_eq!(tracker.base_of(EntityId(4)), Some(EntityId(3)));
    }

    #[test]
    fn test_building_with_no_base_is_rejected_unchanged() {
        let mut tracker = OwnershipTracker::new();
        tracker.add_player(P1, EntityId(1)).unwrap();

        let result = tracker.apply(P1, &spawned(4, EntityKind::Building), None);

        assert!(matches!(result, Err(GameError::InvariantViolation(_))));
        assert_eq!(tracker.base_of(EntityId(4)), None);
        assert_eq!(tracker.base_count(P1), 0);
    }

    #[test]
    fn test_building_for_foreign_base_is_rejected() {
        let mut tracker = tracker_with_base();
        tracker.add_player(ConnectionId(2), EntityId(10)).unwrap();

        let result = tracker.register_building(ConnectionId(2), EntityId(11), Some(EntityId(2)));

        assert!(result.is_err());
        assert!(tracker.buildings_of(EntityId(2)).is_empty());
    }

    #[test]
    fn test_teardown_removes_base_first() {
        let mut tracker = tracker_with_base();
        tracker.apply(P1, &spawned(3, EntityKind::Building), None).unwrap();
        tracker.apply(P1, &spawned(4, EntityKind::Building), None).unwrap();

        let buildings = tracker.begin_teardown(P1, EntityId(2)).unwrap();

        assert_eq!(buildings, vec![EntityId(3), EntityId(4)]);
        assert_eq!(tracker.base_count(P1), 0);
        assert!(tracker.begin_teardown(P1, EntityId(2)).is_none());

        // Buildings despawning afterwards are handled quietly.
        tracker.apply(P1, &despawned(3, EntityKind::Building), None).unwrap();
        tracker.apply(P1, &despawned(4, EntityKind::Building), None).unwrap();
        tracker.apply(P1, &despawned(2, EntityKind::Base), None).unwrap();
        assert_eq!(tracker.base_of(EntityId(3)), None);
    }

    #[test]
    fn test_building_despawn_updates_its_base() {
        let mut tracker = tracker_with_base();
        tracker.apply(P1, &spawned(3, EntityKind::Building), None).unwrap();
        tracker.apply(P1, &despawned(3, EntityKind::Building), None).unwrap();
        assert!(tracker.buildings_of(EntityId(2)).is_empty());
    }

    #[test]
    fn test_units_are_tracked() {
        let mut tracker = tracker_with_base();
        tracker.apply(P1, &spawned(5, EntityKind::Unit), None).unwrap();
        tracker.apply(P1, &spawned(6, EntityKind::Unit), None).unwrap();
        tracker.apply(P1, &despawned(5, EntityKind::Unit), None).unwrap();
        assert_eq!(tracker.get(P1).unwrap().units(), vec![EntityId(6)]);
    }

    #[test]
    fn test_unknown_connection() {
        let mut tracker = OwnershipTracker::new();
        let result = tracker.apply(P1, &spawned(2, EntityKind::Base), None);
        assert!(matches!(result, Err(GameError::UnknownConnection(P1))));
    }
}
