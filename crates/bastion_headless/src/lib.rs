//! Headless session driver for scripted testing and CI verification.
//!
//! This crate runs one authoritative server and any number of client
//! replicas in a single process, wired through an in-memory transport
//! that still encodes every message. It is controlled by JSON commands,
//! which enables:
//!
//! - **Replication checks**: compare each replica with the server
//! - **CI verification**: scripted sessions with reproducible hashes
//! - **Batch runs**: many independent scripts in parallel
//!
//! # Protocol
//!
//! Communication uses JSON lines (one JSON object per line):
//!
//! - **stdin**: Commands (connect, request, tick, query, ...)
//! - **stdout**: Responses and state (JSON)
//! - **stderr**: Logs (human-readable)
//!
//! See [`protocol`] module for the full command/response format.
//!
//! # Example
//!
//! ```bash
//! # Run interactively
//! echo '{"cmd":"connect"}' | cargo run -p bastion_headless
//!
//! # Run a script
//! cargo run -p bastion_headless -- run --script duel.json
//!
//! # Run many scripts in parallel
//! cargo run -p bastion_headless -- batch duel.json rush.json --output results.json
//! ```

pub mod batch;
pub mod driver;
pub mod error;
pub mod protocol;
pub mod script;
pub mod session;

pub use batch::{run_batch, BatchResults};
pub use driver::{run_lines, Driver};
pub use error::{Result, ScriptError};
pub use protocol::{Command, RequestSpec, Response};
pub use script::{load_script, run_script, ScriptRun};
pub use session::LocalSession;
