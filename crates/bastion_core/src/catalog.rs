//! Buyable catalog.
//!
//! Immutable table mapping [`BuyableId`]s to spawnable templates. Built
//! once at startup from [`CatalogData`]; bad entries are reported as
//! [`CatalogIssue`]s and discarded while the rest of the load continues.

use std::collections::{BTreeMap, HashMap};

use thiserror::Error;

use crate::components::BuyableId;
use crate::data::{BuyableData, BuyableKindData, CatalogData, UnitData};
use crate::error::{GameError, Result};
use crate::math::Fixed;

/// RON source of the built-in catalog.
pub const DEFAULT_CATALOG_RON: &str = include_str!("../data/catalog.ron");

/// Spawner settings resolved against the unit table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnerSpec {
    /// Unit trained by the spawner.
    pub unit: UnitData,
    /// Maximum queued units.
    pub max_queue: u8,
    /// Ticks per unit.
    pub training_ticks: u32,
    /// Gather distance for fresh units.
    pub spawn_range: Fixed,
}

/// Resolved template behavior.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuyableKind {
    /// Spawns a base with the given placement range.
    Base {
        /// Placement radius.
        range: Fixed,
    },
    /// Spawns a unit-training building.
    UnitSpawner(SpawnerSpec),
    /// Spawns a building that pays its owner periodically.
    GoldMine {
        /// Gold per payout.
        amount: u32,
        /// Ticks between payouts.
        interval_ticks: u32,
    },
    /// Spawns an inert building.
    Structure,
}

/// A validated catalog entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Buyable {
    /// Catalog id.
    pub id: BuyableId,
    /// Display name.
    pub name: String,
    /// Gold price.
    pub price: u32,
    /// Maximum health.
    pub max_health: u32,
    /// Behavior.
    pub kind: BuyableKind,
}

impl Buyable {
    /// Whether placing this template creates a base.
    #[must_use]
    pub const fn is_base(&self) -> bool {
        matches!(self.kind, BuyableKind::Base { .. })
    }
}

/// A catalog entry that was discarded during load.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogIssue {
    /// Id below zero.
    #[error("buyable '{name}' has negative id {id}")]
    NegativeId {
        /// Entry name.
        name: String,
        /// Offending id.
        id: i64,
    },
    /// Id that does not fit the catalog id type.
    #[error("buyable '{name}' has out-of-range id {id}")]
    IdOutOfRange {
        /// Entry name.
        name: String,
        /// Offending id.
        id: i64,
    },
    /// Second entry sharing an id; the first one wins.
    #[error("buyable '{discarded}' reuses id {id} already taken by '{kept}'")]
    DuplicateId {
        /// Shared id.
        id: i64,
        /// Entry that stays registered.
        kept: String,
        /// Entry that was dropped.
        discarded: String,
    },
    /// Spawner naming a unit that is not in the unit table.
    #[error("buyable '{buyable}' trains unknown unit '{unit}'")]
    UnknownUnit {
        /// Spawner name.
        buyable: String,
        /// Missing unit id.
        unit: String,
    },
    /// Two units sharing an id; the first one wins.
    #[error("unit id '{0}' is declared more than once")]
    DuplicateUnit(String),
}

/// The startup-loaded buyable table.
#[derive(Debug, Clone, Default)]
pub struct BuyableCatalog {
    entries: BTreeMap<BuyableId, Buyable>,
}

impl BuyableCatalog {
    /// Build a catalog from parsed data, logging and returning every
    /// discarded entry.
    pub fn from_data(data: CatalogData) -> (Self, Vec<CatalogIssue>) {
        let mut issues = Vec::new();

        let mut units: HashMap<String, UnitData> = HashMap::new();
        for unit in data.units {
            if units.contains_key(&unit.id) {
                issues.push(CatalogIssue::DuplicateUnit(unit.id));
                continue;
            }
            units.insert(unit.id.clone(), unit);
        }

        let mut entries = BTreeMap::new();
        for entry in data.buyables {
            match resolve_entry(entry, &units, &entries) {
                Ok(buyable) => {
                    entries.insert(buyable.id, buyable);
                }
                Err(issue) => issues.push(issue),
            }
        }

        for issue in &issues {
            tracing::warn!("Discarding catalog entry: {issue}");
        }

        (Self { entries }, issues)
    }

    /// Parse and build a catalog from RON source.
    pub fn from_ron_str(source: &str) -> Result<(Self, Vec<CatalogIssue>)> {
        let data = CatalogData::from_ron_str(source).map_err(|e| GameError::DataParseError {
            path: "<catalog>".to_string(),
            message: e.to_string(),
        })?;
        Ok(Self::from_data(data))
    }

    /// The built-in catalog.
    pub fn standard() -> Result<Self> {
        Self::from_ron_str(DEFAULT_CATALOG_RON).map(|(catalog, _)| catalog)
    }

    /// Look up a template.
    #[must_use]
    pub fn get(&self, id: BuyableId) -> Option<&Buyable> {
        self.entries.get(&id)
    }

    /// Look up a template, failing with [`GameError::UnknownBuyable`].
    pub fn require(&self, id: BuyableId) -> Result<&Buyable> {
        self.get(id).ok_or(GameError::UnknownBuyable(id))
    }

    /// The base template every player starts with: the lowest-id base.
    #[must_use]
    pub fn starting_base(&self) -> Option<&Buyable> {
        self.entries.values().find(|b| b.is_base())
    }

    /// All entries in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Buyable> {
        self.entries.values()
    }

    /// Number of registered templates.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the catalog is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn resolve_entry(
    entry: BuyableData,
    units: &HashMap<String, UnitData>,
    registered: &BTreeMap<BuyableId, Buyable>,
) -> std::result::Result<Buyable, CatalogIssue> {
    if entry.id < 0 {
        return Err(CatalogIssue::NegativeId {
            name: entry.name,
            id: entry.id,
        });
    }
    let id = u32::try_from(entry.id)
        .map(BuyableId)
        .map_err(|_| CatalogIssue::IdOutOfRange {
            name: entry.name.clone(),
            id: entry.id,
        })?;
    if let Some(existing) = registered.get(&id) {
        return Err(CatalogIssue::DuplicateId {
            id: entry.id,
            kept: existing.name.clone(),
            discarded: entry.name,
        });
    }

    let kind = match entry.kind {
        BuyableKindData::Base { range } => BuyableKind::Base { range },
        BuyableKindData::UnitSpawner {
            unit,
            max_queue,
            training_ticks,
            spawn_range,
        } => {
            let Some(unit) = units.get(&unit) else {
                return Err(CatalogIssue::UnknownUnit {
                    buyable: entry.name,
                    unit,
                });
            };
            BuyableKind::UnitSpawner(SpawnerSpec {
                unit: unit.clone(),
                max_queue,
                training_ticks: training_ticks.max(1),
                spawn_range,
            })
        }
        BuyableKindData::GoldMine {
            amount,
            interval_ticks,
        } => BuyableKind::GoldMine {
            amount,
            interval_ticks: interval_ticks.max(1),
        },
        BuyableKindData::Structure => BuyableKind::Structure,
    };

    Ok(Buyable {
        id,
        name: entry.name,
        price: entry.price,
        max_health: entry.health,
        kind,
    })
}
