//! Data validation utilities.
//!
//! Loads catalog and config files the same way the server does and
//! reports anything the server would silently skip or refuse.

use std::path::{Path, PathBuf};

use bastion_core::catalog::{BuyableCatalog, BuyableKind, CatalogIssue};
use bastion_core::config::SimulationConfig;
use bastion_core::error::GameError;
use thiserror::Error;

/// Why a data file failed validation.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// The file could not be read.
    #[error("Failed to read {}: {source}", path.display())]
    Io {
        /// File that failed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid RON for its format.
    #[error("{}: {source}", path.display())]
    Parse {
        /// File that failed.
        path: PathBuf,
        /// Parser error.
        #[source]
        source: GameError,
    },

    /// Entries the loader would discard.
    #[error("{}: {} catalog entries would be discarded", path.display(), issues.len())]
    Issues {
        /// Catalog file.
        path: PathBuf,
        /// Every discarded entry.
        issues: Vec<CatalogIssue>,
    },

    /// A loadable file whose contents cannot run a session.
    #[error("{}: {message}", path.display())]
    Invalid {
        /// File that failed.
        path: PathBuf,
        /// What is wrong.
        message: String,
    },
}

/// Counts of a valid catalog's templates by behavior.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CatalogSummary {
    /// Base templates.
    pub bases: usize,
    /// Unit spawners.
    pub spawners: usize,
    /// Gold mines.
    pub mines: usize,
    /// Inert structures.
    pub structures: usize,
}

impl CatalogSummary {
    /// Total templates.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.bases + self.spawners + self.mines + self.structures
    }
}

/// Validate a buyable catalog file.
pub fn validate_catalog(path: &Path) -> Result<CatalogSummary, ValidationError> {
    let source = read(path)?;
    validate_catalog_str(&source, path)
}

/// Validate catalog RON; `path` is used for messages only.
pub fn validate_catalog_str(source: &str, path: &Path) -> Result<CatalogSummary, ValidationError> {
    let (catalog, issues) =
        BuyableCatalog::from_ron_str(source).map_err(|source| ValidationError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
    if !issues.is_empty() {
        return Err(ValidationError::Issues {
            path: path.to_path_buf(),
            issues,
        });
    }
    if catalog.starting_base().is_none() {
        return Err(invalid(path, "no base template to start players with"));
    }

    let mut summary = CatalogSummary::default();
    for buyable in catalog.iter() {
        match &buyable.kind {
            BuyableKind::Base { .. } => summary.bases += 1,
            BuyableKind::UnitSpawner(spec) => {
                if spec.max_queue == 0 {
                    return Err(invalid(
                        path,
                        &format!("spawner '{}' cannot queue any units", buyable.name),
                    ));
                }
                if spec.training_ticks == 0 {
                    return Err(invalid(
                        path,
                        &format!("spawner '{}' trains in zero ticks", buyable.name),
                    ));
                }
                summary.spawners += 1;
            }
            BuyableKind::GoldMine { interval_ticks, .. } => {
                if *interval_ticks == 0 {
                    return Err(invalid(
                        path,
                        &format!("gold mine '{}' pays every zero ticks", buyable.name),
                    ));
                }
                summary.mines += 1;
            }
            BuyableKind::Structure => summary.structures += 1,
        }
        if buyable.max_health == 0 {
            return Err(invalid(
                path,
                &format!("'{}' has zero health", buyable.name),
            ));
        }
    }
    Ok(summary)
}

/// Validate a simulation config file.
pub fn validate_config(path: &Path) -> Result<SimulationConfig, ValidationError> {
    let source = read(path)?;
    let config = SimulationConfig::from_ron_str(&source).map_err(|source| ValidationError::Parse {
        path: path.to_path_buf(),
        source,
    })?;

    if config.max_name_len == 0 {
        return Err(invalid(path, "max_name_len must allow at least one character"));
    }
    if config.spawn_points.is_empty() {
        return Err(invalid(path, "no spawn points"));
    }
    let extent = config.map_half_extent;
    if let Some((x, y)) = config
        .spawn_points
        .iter()
        .find(|(x, y)| x.abs() > extent || y.abs() > extent)
    {
        return Err(invalid(
            path,
            &format!("spawn point ({x}, {y}) lies outside the map (half extent {extent})"),
        ));
    }
    Ok(config)
}

fn read(path: &Path) -> Result<String, ValidationError> {
    std::fs::read_to_string(path).map_err(|source| ValidationError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn invalid(path: &Path, message: &str) -> ValidationError {
    ValidationError::Invalid {
        path: path.to_path_buf(),
        message: message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bastion_core::catalog::DEFAULT_CATALOG_RON;
    use std::io::Write;

    fn write_temp(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{contents}").unwrap();
        file
    }

    #[test]
    fn test_builtin_catalog_is_valid() {
        let summary = validate_catalog_str(DEFAULT_CATALOG_RON, Path::new("catalog.ron")).unwrap();
        assert_eq!(summary.bases, 1);
        assert_eq!(summary.spawners, 1);
        assert_eq!(summary.mines, 1);
        assert_eq!(summary.structures, 1);
        assert_eq!(summary.total(), 4);
    }

    #[test]
    fn test_catalog_file() {
        let file = write_temp(DEFAULT_CATALOG_RON);
        assert!(validate_catalog(file.path()).is_ok());
    }

    #[test]
    fn test_duplicate_id_reported() {
        let file = write_temp(
            r#"(buyables: [
                (id: 0, name: "Keep", price: 100, health: 50, kind: Base(range: 42949672960)),
                (id: 0, name: "Tower", price: 100, health: 50, kind: Structure),
            ])"#,
        );
        let err = validate_catalog(file.path()).unwrap_err();
        assert!(matches!(
            err,
            ValidationError::Issues { ref issues, .. }
                if matches!(issues[..], [CatalogIssue::DuplicateId { .. }])
        ));
    }

    #[test]
    fn test_catalog_without_base() {
        let file = write_temp(r#"(buyables: [(id: 3, name: "Wall", price: 50, health: 50, kind: Structure)])"#);
        assert!(matches!(
            validate_catalog(file.path()),
            Err(ValidationError::Invalid { .. })
        ));
    }

    #[test]
    fn test_unreadable_catalog() {
        assert!(matches!(
            validate_catalog(Path::new("/nonexistent/catalog.ron")),
            Err(ValidationError::Io { .. })
        ));
    }

    #[test]
    fn test_malformed_catalog() {
        let file = write_temp("(buyables: [");
        assert!(matches!(
            validate_catalog(file.path()),
            Err(ValidationError::Parse { .. })
        ));
    }

    #[test]
    fn test_config_defaults_are_valid() {
        let file = write_temp("(starting_gold: 800)");
        let config = validate_config(file.path()).unwrap();
        assert_eq!(config.starting_gold, 800);
    }

    #[test]
    fn test_spawn_point_off_map() {
        let file = write_temp("(map_half_extent: 50, spawn_points: [(0, 0), (70, 0)])");
        let err = validate_config(file.path()).unwrap_err();
        assert!(err.to_string().contains("(70, 0)"));
    }
}
