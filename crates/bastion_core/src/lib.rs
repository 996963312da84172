//! # Bastion Core
//!
//! Authoritative state replication and ownership model for Bastion.
//!
//! This crate contains **only** deterministic session logic:
//! - No rendering
//! - No IO
//! - No system randomness
//! - No floating-point math (uses fixed-point)
//!
//! The server runs a [`simulation::Simulation`]; every client (and the
//! host's local player) keeps a [`client::ClientSession`] replica. The two
//! only talk through [`protocol`] messages routed by [`router`].
//!
//! ## Crate Structure
//!
//! - [`replication`] - Server-owned fields, change records, client shadows
//! - [`router`] - Role-aware request forwarding and broadcast delivery
//! - [`lifecycle`] - Entity registry, authority and spawn subscriptions
//! - [`hierarchy`] - Player → base → building ownership bookkeeping
//! - [`session`] - Active roster and game-over detection
//! - [`simulation`] - Authoritative server world
//! - [`client`] - Client replica
//! - [`catalog`] - Purchasable templates loaded from RON
//! - [`math`] - Fixed-point math utilities

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod catalog;
pub mod client;
pub mod combat;
pub mod components;
pub mod config;
pub mod data;
pub mod economy;
pub mod error;
pub mod hierarchy;
pub mod lifecycle;
pub mod math;
pub mod navigation;
pub mod production;
pub mod protocol;
pub mod replication;
pub mod router;
pub mod session;
pub mod simulation;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::catalog::{Buyable, BuyableCatalog, BuyableKind};
    pub use crate::client::{ClientEvent, ClientSession};
    pub use crate::components::*;
    pub use crate::config::SimulationConfig;
    pub use crate::error::{GameError, RejectReason, RequestOutcome, Result};
    pub use crate::math::{Fixed, Vec2Fixed};
    pub use crate::protocol::{Envelope, Request, ServerMessage, Target};
    pub use crate::replication::{ChangeRecord, FieldId, FieldValue, ReplicaEvent};
    pub use crate::router::{Outbox, Role, Router, Transport};
    pub use crate::session::SessionState;
    pub use crate::simulation::{Simulation, TickEvents, TICK_RATE};
}
