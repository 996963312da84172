//! Top-level catalog file layout.

use serde::{Deserialize, Serialize};

use super::buyable_data::BuyableData;
use super::unit_data::UnitData;

/// Everything a catalog file declares.
///
/// # Example RON
///
/// ```ron
/// CatalogData(
///     buyables: [...],
///     units: [...],
/// )
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogData {
    /// Purchasable templates.
    pub buyables: Vec<BuyableData>,

    /// Unit templates trained by spawners.
    #[serde(default)]
    pub units: Vec<UnitData>,
}

impl CatalogData {
    /// Parse catalog data from a RON string.
    pub fn from_ron_str(source: &str) -> Result<Self, ron::error::SpannedError> {
        ron::from_str(source)
    }
}
