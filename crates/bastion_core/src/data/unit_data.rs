//! Unit template data.

use serde::{Deserialize, Serialize};

use crate::math::{fixed_serde, Fixed};

/// Data-driven unit definition, referenced by spawner buildings.
///
/// # Example RON
///
/// ```ron
/// UnitData(
///     id: "tank",
///     name: "Tank",
///     health: 100,
///     training_cost: 100,
///     speed: 1073741824,         // Fixed-point for 0.25
///     attack_range: 21474836480, // Fixed-point for 5.0
///     damage: 10,
///     fire_interval_ticks: 20,
/// )
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitData {
    /// Unique string identifier.
    pub id: String,

    /// Display name.
    pub name: String,

    /// Maximum health points.
    pub health: u32,

    /// Gold charged when the unit is queued.
    pub training_cost: u32,

    /// Movement per tick (fixed-point).
    #[serde(with = "fixed_serde")]
    pub speed: Fixed,

    /// Distance at which the unit stops chasing and fires (fixed-point).
    #[serde(with = "fixed_serde")]
    pub attack_range: Fixed,

    /// Damage per shot.
    pub damage: u32,

    /// Ticks between shots.
    pub fire_interval_ticks: u32,
}
