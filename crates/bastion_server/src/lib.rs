//! # Bastion Dedicated Server
//!
//! Headless session host for multiplayer games.
//!
//! Runs one authoritative [`Simulation`] without rendering. Connections
//! are admitted by the [`lobby`], their requests are applied strictly in
//! arrival order by the [`network::SessionHost`], and every resulting
//! server message is encoded once and pushed to each peer's outbound
//! channel.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod error;
pub mod lobby;
pub mod network;

use std::path::{Path, PathBuf};
use std::time::Duration;

use bastion_core::catalog::BuyableCatalog;
use bastion_core::config::SimulationConfig;
use bastion_core::simulation::{Simulation, TICK_RATE};
use serde::{Deserialize, Serialize};

pub use error::{Result, ServerError};

/// Server configuration.
///
/// # Example RON
///
/// ```ron
/// ServerConfig(
///     port: 7777,
///     max_players: 4,
///     catalog_path: Some("assets/catalog.ron"),
///     simulation: SimulationConfig(starting_gold: 800),
/// )
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Port to listen on.
    pub port: u16,
    /// Maximum players per game.
    pub max_players: u8,
    /// Tick rate (should match client).
    pub tick_rate: u32,
    /// Buyable catalog file. The built-in catalog is used when unset.
    pub catalog_path: Option<PathBuf>,
    /// Gameplay settings.
    pub simulation: SimulationConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 7777,
            max_players: 8,
            tick_rate: TICK_RATE,
            catalog_path: None,
            simulation: SimulationConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Parse a config from RON; missing fields fall back to defaults.
    pub fn from_ron_str(source: &str) -> Result<Self> {
        ron::from_str(source).map_err(|e| ServerError::Config {
            path: PathBuf::from("<inline>"),
            message: e.to_string(),
        })
    }

    /// Load a config file.
    pub fn load(path: &Path) -> Result<Self> {
        let source = std::fs::read_to_string(path)?;
        ron::from_str(&source).map_err(|e| ServerError::Config {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Time between simulation ticks.
    #[must_use]
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(1000 / u64::from(self.tick_rate.max(1)))
    }

    /// Load the buyable catalog. Issues are logged by the catalog and
    /// the offending entries skipped.
    pub fn load_catalog(&self) -> Result<BuyableCatalog> {
        let Some(path) = &self.catalog_path else {
            return Ok(BuyableCatalog::standard()?);
        };
        let source = std::fs::read_to_string(path)?;
        let (catalog, issues) =
            BuyableCatalog::from_ron_str(&source).map_err(|e| ServerError::Config {
                path: path.clone(),
                message: e.to_string(),
            })?;
        tracing::info!(
            "Loaded {} buyables from {} ({} skipped)",
            catalog.len(),
            path.display(),
            issues.len()
        );
        Ok(catalog)
    }

    /// Fresh simulation for one session.
    pub fn build_simulation(&self) -> Result<Simulation> {
        Ok(Simulation::new(self.simulation.clone(), self.load_catalog()?))
    }
}
