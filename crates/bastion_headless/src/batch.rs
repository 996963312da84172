//! Batch script runner.
//!
//! Runs many scripts in parallel using rayon. Each script gets its own
//! session, so runs share nothing.

use std::path::{Path, PathBuf};
use std::time::Instant;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::Result;
use crate::protocol::Command;
use crate::script::{load_script, run_script, ScriptRun};

/// One finished script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchEntry {
    /// Script file.
    pub path: PathBuf,
    /// Its summary.
    pub run: ScriptRun,
}

/// Error during batch run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchError {
    /// Script file.
    pub path: PathBuf,
    /// Error message
    pub message: String,
}

/// Results of a batch run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResults {
    /// Finished scripts, in input order.
    pub runs: Vec<BatchEntry>,
    /// Scripts that failed to load or run.
    pub errors: Vec<BatchError>,
    /// Wall clock time.
    pub duration_seconds: f64,
}

impl BatchResults {
    /// Save results to JSON file
    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(path, json)
    }

    /// Load results from JSON file
    pub fn load(path: &Path) -> std::io::Result<Self> {
        let json = std::fs::read_to_string(path)?;
        serde_json::from_str(&json).map_err(std::io::Error::other)
    }

    /// Runs whose replicas ended out of sync.
    pub fn diverged(&self) -> impl Iterator<Item = &BatchEntry> {
        self.runs.iter().filter(|e| !e.run.converged)
    }
}

/// Run every script file in parallel.
pub fn run_batch(paths: &[PathBuf]) -> BatchResults {
    let start = Instant::now();
    info!("Running {} scripts", paths.len());

    let results: Vec<std::result::Result<BatchEntry, BatchError>> = paths
        .par_iter()
        .map(|path| {
            load_script(path)
                .and_then(run_script)
                .map(|(run, _)| BatchEntry {
                    path: path.clone(),
                    run,
                })
                .map_err(|e| {
                    warn!("Script {} failed: {e}", path.display());
                    BatchError {
                        path: path.clone(),
                        message: e.to_string(),
                    }
                })
        })
        .collect();

    let mut runs = Vec::new();
    let mut errors = Vec::new();
    for result in results {
        match result {
            Ok(entry) => runs.push(entry),
            Err(error) => errors.push(error),
        }
    }

    let duration_seconds = start.elapsed().as_secs_f64();
    info!(
        "Batch complete: {} scripts in {:.1}s ({} failed)",
        runs.len(),
        duration_seconds,
        errors.len()
    );

    BatchResults {
        runs,
        errors,
        duration_seconds,
    }
}

/// Run the same script several times in parallel and compare the final
/// hashes.
pub fn verify_determinism(commands: &[Command], runs: u32) -> Result<bool> {
    let hashes = (0..runs.max(1))
        .into_par_iter()
        .map(|_| run_script(commands.to_vec()).map(|(run, _)| run.hash))
        .collect::<Result<Vec<u64>>>()?;
    Ok(hashes.windows(2).all(|pair| pair[0] == pair[1]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::parse_script;

    const SKIRMISH: &str = r#"[
        {"cmd": "connect"},
        {"cmd": "connect"},
        {"cmd": "connect"},
        {"cmd": "tick", "count": 30},
        {"cmd": "disconnect", "connection": 3},
        {"cmd": "tick", "count": 30}
    ]"#;

    fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn test_run_batch_collects_runs_and_errors() {
        let dir = tempfile::tempdir().unwrap();
        let paths = vec![
            write_script(dir.path(), "a.json", SKIRMISH),
            write_script(dir.path(), "broken.json", "{"),
            write_script(dir.path(), "b.json", SKIRMISH),
        ];

        let results = run_batch(&paths);

        assert_eq!(results.runs.len(), 2);
        assert_eq!(results.errors.len(), 1);
        assert_eq!(results.errors[0].path, paths[1]);
        assert_eq!(results.runs[0].run, results.runs[1].run);
        assert_eq!(results.diverged().count(), 0);
    }

    #[test]
    fn test_missing_script_is_error() {
        let results = run_batch(&[PathBuf::from("/nonexistent/script.json")]);
        assert!(results.runs.is_empty());
        assert_eq!(results.errors.len(), 1);
    }

    #[test]
    fn test_verify_determinism() {
        let commands = parse_script(SKIRMISH).unwrap();
        assert!(verify_determinism(&commands, 4).unwrap());
    }

    #[test]
    fn test_batch_results_save_load() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(dir.path(), "a.json", SKIRMISH);
        let results = run_batch(&[script]);

        let path = dir.path().join("results.json");
        results.save(&path).unwrap();
        let loaded = BatchResults::load(&path).unwrap();

        assert_eq!(loaded.runs, results.runs);
        assert_eq!(loaded.runs[0].run.ticks, 60);
    }
}
