//! Unit weapons and engagement rules.

use serde::{Deserialize, Serialize};

use crate::components::EntityKind;
use crate::data::UnitData;
use crate::math::{fixed_serde, Fixed, Vec2Fixed};

/// Attack capability of a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Weapon {
    /// Damage per shot.
    pub damage: u32,
    /// Firing distance.
    #[serde(with = "fixed_serde")]
    pub range: Fixed,
    /// Ticks between shots.
    pub fire_interval: u32,
    cooldown: u32,
}

impl Weapon {
    /// Create a ready weapon.
    #[must_use]
    pub const fn new(damage: u32, range: Fixed, fire_interval: u32) -> Self {
        Self {
            damage,
            range,
            fire_interval,
            cooldown: 0,
        }
    }

    /// Weapon described by a unit template.
    #[must_use]
    pub fn from_unit(unit: &UnitData) -> Self {
        Self::new(unit.damage, unit.attack_range, unit.fire_interval_ticks)
    }

    /// Whether a target at `target` is close enough to shoot from `from`.
    #[must_use]
    pub fn in_range(&self, from: Vec2Fixed, target: Vec2Fixed) -> bool {
        from.distance_squared(target) <= self.range.saturating_mul(self.range)
    }

    /// Tick down the cooldown.
    pub fn tick(&mut self) {
        self.cooldown = self.cooldown.saturating_sub(1);
    }

    /// Fire if ready. Returns the damage dealt by this shot.
    pub fn try_fire(&mut self) -> Option<u32> {
        if self.cooldown > 0 {
            return None;
        }
        self.cooldown = self.fire_interval;
        Some(self.damage)
    }
}

/// Whether entities of this kind can be attacked.
#[must_use]
pub const fn is_targetable(kind: EntityKind) -> bool {
    kind.is_damageable()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fire_respects_interval() {
        let mut weapon = Weapon::new(10, Fixed::from_num(5), 3);
        assert_eq!(weapon.try_fire(), Some(10));
        assert_eq!(weapon.try_fire(), None);
        weapon.tick();
        weapon.tick();
        assert_eq!(weapon.try_fire(), None);
        weapon.tick();
        assert_eq!(weapon.try_fire(), Some(10));
    }

    #[test]
    fn test_range_is_inclusive() {
        let weapon = Weapon::new(10, Fixed::from_num(5), 20);
        assert!(weapon.in_range(Vec2Fixed::ZERO, Vec2Fixed::from_ints(3, 4)));
        assert!(!weapon.in_range(Vec2Fixed::ZERO, Vec2Fixed::from_ints(4, 4)));
    }

    #[test]
    fn test_players_are_not_targetable() {
        assert!(!is_targetable(EntityKind::Player));
        assert!(is_targetable(EntityKind::Building));
    }
}
