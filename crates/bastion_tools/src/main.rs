//! Bastion - Development Tools

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bastion_tools::{validate_catalog, validate_config, ValidationError};

#[derive(Parser)]
#[command(name = "bastion-tools")]
#[command(about = "Development tools for Bastion")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a buyable catalog file
    ValidateCatalog {
        /// Path to the catalog (RON)
        path: PathBuf,
    },
    /// Validate a simulation config file
    ValidateConfig {
        /// Path to the config (RON)
        path: PathBuf,
    },
}

fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::ValidateCatalog { path } => {
            tracing::info!("Validating catalog: {}", path.display());
            validate_catalog(&path).map(|summary| {
                tracing::info!(
                    "Validation passed: {} buyables ({} bases, {} spawners, {} mines, {} structures)",
                    summary.total(),
                    summary.bases,
                    summary.spawners,
                    summary.mines,
                    summary.structures
                );
            })
        }
        Commands::ValidateConfig { path } => {
            tracing::info!("Validating config: {}", path.display());
            validate_config(&path).map(|config| {
                tracing::info!(
                    "Validation passed: {} spawn points, {} starting gold",
                    config.spawn_points.len(),
                    config.starting_gold
                );
            })
        }
    };

    if let Err(e) = result {
        tracing::error!("Validation failed: {e}");
        if let ValidationError::Issues { issues, .. } = &e {
            for issue in issues {
                tracing::error!("  {issue}");
            }
        }
        std::process::exit(1);
    }
}
