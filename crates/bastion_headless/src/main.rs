//! Headless Bastion session driver.
//!
//! This binary runs a server and its client replicas without any network,
//! controlled via JSON on stdin/stdout or by script files.
//!
//! # Usage
//!
//! ```bash
//! # Interactive mode - read commands from stdin
//! cargo run -p bastion_headless
//!
//! # Run one script and print its transcript
//! cargo run -p bastion_headless -- run --script scripts/duel.json
//!
//! # Run scripts in parallel
//! cargo run -p bastion_headless -- batch scripts/a.json scripts/b.json --output results.json
//!
//! # Check a script is reproducible
//! cargo run -p bastion_headless -- verify scripts/duel.json --runs 8
//! ```

use std::io::{self, Write};
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use bastion_headless::{
    batch::{run_batch, verify_determinism},
    driver::{run_lines, Driver},
    script::{load_script, run_script},
    Result,
};

#[derive(Parser)]
#[command(name = "bastion_headless")]
#[command(about = "Headless Bastion session driver for scripted tests and CI")]
#[command(version)]
struct Cli {
    /// Enable verbose logging to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Read commands from stdin, or run a script file
    Run {
        /// Script file to run instead of stdin
        #[arg(short, long)]
        script: Option<PathBuf>,
    },

    /// Run script files in parallel
    Batch {
        /// Script files
        #[arg(required = true)]
        scripts: Vec<PathBuf>,

        /// Write results as JSON
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Run a script several times and compare final hashes
    Verify {
        /// Script file
        script: PathBuf,

        /// Number of runs
        #[arg(short, long, default_value = "5")]
        runs: u32,
    },
}

fn main() {
    let cli = Cli::parse();

    // Logs go to stderr; stdout is for the protocol
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .with(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let result = match cli.command {
        Some(Commands::Run { script }) => cmd_run(script),
        Some(Commands::Batch { scripts, output }) => cmd_batch(&scripts, output),
        Some(Commands::Verify { script, runs }) => cmd_verify(script, runs),
        None => cmd_run(None),
    };

    if let Err(e) = result {
        tracing::error!("{e}");
        std::process::exit(1);
    }
}

fn cmd_run(script: Option<PathBuf>) -> Result<()> {
    let Some(path) = script else {
        tracing::info!("Starting interactive session");
        let mut driver = Driver::standard()?;
        return run_lines(&mut driver, io::stdin().lock(), io::stdout().lock());
    };

    let (run, transcript) = run_script(load_script(&path)?)?;
    let mut stdout = io::stdout().lock();
    for response in transcript {
        stdout.write_all(response.to_json_line().as_bytes())?;
    }
    stdout.flush()?;

    tracing::info!(
        "{}: {} ticks, hash {:016x}, {} accepted, {} rejected, converged: {}",
        path.display(),
        run.ticks,
        run.hash,
        run.accepted,
        run.rejected,
        run.converged
    );
    Ok(())
}

fn cmd_batch(scripts: &[PathBuf], output: Option<PathBuf>) -> Result<()> {
    let results = run_batch(scripts);

    for entry in &results.runs {
        println!(
            "{:<40} ticks={:<6} hash={:016x} winner={}",
            entry.path.display(),
            entry.run.ticks,
            entry.run.hash,
            entry.run.winner.as_deref().unwrap_or("-")
        );
    }
    for error in &results.errors {
        println!("{:<40} FAILED: {}", error.path.display(), error.message);
    }

    if let Some(path) = output {
        results.save(&path)?;
        tracing::info!("Results written to {}", path.display());
    }

    let diverged = results.diverged().count();
    if diverged > 0 || !results.errors.is_empty() {
        tracing::error!(
            "{diverged} scripts diverged, {} failed",
            results.errors.len()
        );
        std::process::exit(1);
    }
    Ok(())
}

fn cmd_verify(script: PathBuf, runs: u32) -> Result<()> {
    let commands = load_script(&script)?;
    if verify_determinism(&commands, runs)? {
        println!("✓ {} is deterministic over {runs} runs", script.display());
        Ok(())
    } else {
        println!("✗ {} produced differing hashes", script.display());
        std::process::exit(1);
    }
}
