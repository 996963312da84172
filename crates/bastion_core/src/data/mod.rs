//! Data structures for the buyable catalog.
//!
//! Pure data deserialized from RON files. Validation (duplicate and
//! negative ids) happens when the data is handed to
//! [`BuyableCatalog`](crate::catalog::BuyableCatalog).
//!
//! **Note:** This module contains no IO - it only defines data types.

mod buyable_data;
mod catalog_data;
mod unit_data;

pub use buyable_data::{BuyableData, BuyableKindData};
pub use catalog_data::CatalogData;
pub use unit_data::UnitData;
