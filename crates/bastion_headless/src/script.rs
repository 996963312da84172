//! Script files: a JSON array of driver commands.
//!
//! ```json
//! [
//!   {"cmd": "connect"},
//!   {"cmd": "connect"},
//!   {"cmd": "request", "connection": 1, "request": {"op": "set_display_name", "name": "Ada"}},
//!   {"cmd": "tick", "count": 200},
//!   {"cmd": "hash"}
//! ]
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::driver::Driver;
use crate::error::{Result, ScriptError};
use crate::protocol::{Command, Response};

/// Summary of one scripted session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptRun {
    /// Final server tick.
    pub ticks: u64,
    /// Final server state hash.
    pub hash: u64,
    /// Winner announcement, if the session ended.
    pub winner: Option<String>,
    /// Requests applied.
    pub accepted: u32,
    /// Requests refused by validation.
    pub rejected: u32,
    /// Commands that failed outright.
    pub errors: u32,
    /// Whether every replica matched the server at the end.
    pub converged: bool,
}

/// Parse a script from JSON text.
pub fn parse_script(source: &str) -> Result<Vec<Command>> {
    Ok(serde_json::from_str(source)?)
}

/// Load a script file.
pub fn load_script(path: &Path) -> Result<Vec<Command>> {
    let source = std::fs::read_to_string(path)?;
    serde_json::from_str(&source).map_err(|e| ScriptError::Script {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// Run a script against a fresh standard session.
///
/// Returns the summary and every response in order. Execution stops at
/// the first `quit`.
pub fn run_script(commands: Vec<Command>) -> Result<(ScriptRun, Vec<Response>)> {
    let mut driver = Driver::standard()?;
    let mut summary = ScriptRun::default();
    let mut transcript = Vec::new();

    for command in commands {
        let quit = matches!(command, Command::Quit);
        for response in driver.execute(command) {
            match &response {
                Response::Outcome { accepted: true, .. } => summary.accepted += 1,
                Response::Outcome { accepted: false, .. } => summary.rejected += 1,
                Response::Error { .. } => summary.errors += 1,
                _ => {}
            }
            transcript.push(response);
        }
        if quit {
            break;
        }
    }

    let session = driver.session();
    summary.ticks = session.simulation().get_tick();
    summary.hash = session.hash();
    summary.winner = session.simulation().winner_text().map(String::from);
    summary.converged = session.divergences().is_empty();
    Ok((summary, transcript))
}
