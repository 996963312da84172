//! Buyable template data.

use serde::{Deserialize, Serialize};

use crate::math::{fixed_serde, Fixed};

/// Behavior attached to a buyable template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BuyableKindData {
    /// A base: owns buildings and anchors placement.
    Base {
        /// Placement radius around the base (fixed-point).
        #[serde(with = "fixed_serde")]
        range: Fixed,
    },
    /// A building that trains units.
    UnitSpawner {
        /// Id of the [`UnitData`](super::UnitData) it trains.
        unit: String,
        /// Maximum number of queued units.
        max_queue: u8,
        /// Ticks to train one unit.
        training_ticks: u32,
        /// Distance from the spawner where fresh units gather (fixed-point).
        #[serde(with = "fixed_serde")]
        spawn_range: Fixed,
    },
    /// A building that periodically pays its owner.
    GoldMine {
        /// Gold added per payout.
        amount: u32,
        /// Ticks between payouts.
        interval_ticks: u32,
    },
    /// A building with no behavior beyond hit points.
    Structure,
}

/// Data-driven buyable definition.
///
/// # Example RON
///
/// ```ron
/// BuyableData(
///     id: 1,
///     name: "Barracks",
///     price: 300,
///     health: 100,
///     kind: UnitSpawner(
///         unit: "tank",
///         max_queue: 5,
///         training_ticks: 100,
///         spawn_range: 30064771072,  // Fixed-point for 7.0
///     ),
/// )
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuyableData {
    /// Catalog id. Signed so that bad data can be reported instead of
    /// failing to parse.
    pub id: i64,

    /// Display name.
    pub name: String,

    /// Gold price.
    pub price: u32,

    /// Maximum health points.
    pub health: u32,

    /// Template behavior.
    pub kind: BuyableKindData,
}

impl BuyableData {
    /// Whether this template spawns a base.
    #[must_use]
    pub const fn is_base(&self) -> bool {
        matches!(self.kind, BuyableKindData::Base { .. })
    }
}
