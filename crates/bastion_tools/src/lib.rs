//! # Bastion Development Tools
//!
//! Command-line tools for development:
//! - Catalog validation
//! - Simulation config validation

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod validate;

pub use validate::{validate_catalog, validate_config, CatalogSummary, ValidationError};
