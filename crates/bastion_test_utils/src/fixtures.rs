//! Test fixtures and helpers.
//!
//! Pre-built sessions and an in-memory replica network
//! for consistent testing.

use std::collections::BTreeMap;

use bastion_core::catalog::BuyableKind;
use bastion_core::client::ClientSession;
use bastion_core::components::{BuyableId, ConnectionId, EntityId};
use bastion_core::data::UnitData;
use bastion_core::error::{RequestOutcome, Result};
use bastion_core::math::{Fixed, Vec2Fixed};
use bastion_core::protocol::Request;
use bastion_core::router::Role;
use bastion_core::simulation::Simulation;
use fixed::types::I32F32;

/// Headquarters in the built-in catalog.
pub const HEADQUARTERS: BuyableId = BuyableId(0);
/// Barracks (unit spawner) in the built-in catalog.
pub const BARRACKS: BuyableId = BuyableId(1);
/// Gold mine in the built-in catalog.
pub const GOLD_MINE: BuyableId = BuyableId(2);
/// Wall in the built-in catalog.
pub const WALL: BuyableId = BuyableId(3);

/// Create a fixed-point number from an integer.
#[must_use]
pub fn fixed(n: i32) -> I32F32 {
    I32F32::from_num(n)
}

/// Create a fixed-point number from a float (for tests only).
///
/// Note: In real simulation code, never use floats.
/// This is only for convenient test setup.
#[must_use]
pub fn fixed_f(n: f64) -> I32F32 {
    I32F32::from_num(n)
}

/// Standard session with connections `1..=count` joined and the outbox
/// drained.
///
/// # Panics
///
/// Panics if the built-in catalog fails to load.
#[must_use]
pub fn session_with_players(count: u32) -> Simulation {
    let mut sim = Simulation::standard().expect("built-in catalog loads");
    for c in 1..=count {
        sim.connect(ConnectionId(c)).expect("fresh connection");
    }
    sim.drain_outbox();
    sim
}

/// First standing base of a connection.
///
/// # Panics
///
/// Panics if the connection holds no base.
#[must_use]
pub fn first_base(sim: &Simulation, connection: ConnectionId) -> EntityId {
    sim.tracker()
        .get(connection)
        .and_then(|h| h.bases().first().copied())
        .expect("connection holds a base")
}

/// Point offset from a live entity's position.
///
/// # Panics
///
/// Panics if the entity is gone.
#[must_use]
pub fn beside(sim: &Simulation, entity: EntityId, dx: i32, dy: i32) -> Vec2Fixed {
    sim.registry()
        .get(entity)
        .expect("entity is alive")
        .transform
        .position
        + Vec2Fixed::from_ints(dx, dy)
}

/// Ask to place `buyable` at `dx` east of the connection's first base.
///
/// # Panics
///
/// Panics on a hard simulation error.
pub fn place(sim: &mut Simulation, from: ConnectionId, buyable: BuyableId, dx: i32) -> RequestOutcome {
    let base = first_base(sim, from);
    let position = beside(sim, base, dx, 0);
    sim.handle_request(
        from,
        Request::PlaceBuilding {
            buyable,
            base,
            position,
            heading: Fixed::ZERO,
        },
    )
    .expect("no invariant violation")
}

/// Unit trained by the barracks.
///
/// # Panics
///
/// Panics if the catalog's barracks is not a spawner.
#[must_use]
pub fn tank(sim: &Simulation) -> UnitData {
    match sim.catalog().get(BARRACKS).map(|b| &b.kind) {
        Some(BuyableKind::UnitSpawner(spec)) => spec.unit.clone(),
        other => panic!("barracks is not a spawner: {other:?}"),
    }
}

/// Two players; player 1 has a barracks, a mine and a squad of three
/// tanks parked next to player 2's base and ordered to attack it.
///
/// # Panics
///
/// Panics if any setup step fails.
#[must_use]
pub fn skirmish() -> Simulation {
    let attacker = ConnectionId(1);
    let defender = ConnectionId(2);

    let mut sim = session_with_players(2);
    assert!(place(&mut sim, attacker, BARRACKS, 5).is_accepted());
    assert!(place(&mut sim, attacker, GOLD_MINE, -5).is_accepted());
    assert!(place(&mut sim, defender, WALL, 4).is_accepted());

    let target = first_base(&sim, defender);
    let unit = tank(&sim);
    for offset in 0..3 {
        let position = beside(&sim, target, 12, offset * 2);
        let id = sim
            .spawn_unit(attacker, &unit, position, None)
            .expect("unit spawns");
        let outcome = sim
            .handle_request(attacker, Request::SetTarget { unit: id, target })
            .expect("no invariant violation");
        assert!(outcome.is_accepted());
    }
    sim.drain_outbox();
    sim
}

/// Client replicas wired to one simulation through its outbox.
#[derive(Debug, Default)]
pub struct ReplicaNet {
    clients: BTreeMap<ConnectionId, ClientSession>,
}

impl ReplicaNet {
    /// Create an empty network.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Connect a new client and deliver its snapshot.
    pub fn join(&mut self, sim: &mut Simulation, connection: ConnectionId) -> Result<EntityId> {
        self.pump(sim);
        self.clients
            .insert(connection, ClientSession::new(Role::Client(connection))?);
        let player = sim.connect(connection)?;
        self.pump(sim);
        Ok(player)
    }

    /// Disconnect a client and deliver the teardown to the others.
    pub fn leave(&mut self, sim: &mut Simulation, connection: ConnectionId) -> Result<()> {
        sim.disconnect(connection)?;
        self.clients.remove(&connection);
        self.pump(sim);
        Ok(())
    }

    /// Deliver everything queued in the simulation's outbox.
    pub fn pump(&mut self, sim: &mut Simulation) {
        for envelope in sim.drain_outbox() {
            for (connection, client) in &mut self.clients {
                if envelope.target.includes(*connection) {
                    client.on_message(envelope.message.clone());
                }
            }
        }
    }

    /// One client's replica.
    #[must_use]
    pub fn client(&self, connection: ConnectionId) -> Option<&ClientSession> {
        self.clients.get(&connection)
    }

    /// Mutable access to one client's replica.
    pub fn client_mut(&mut self, connection: ConnectionId) -> Option<&mut ClientSession> {
        self.clients.get_mut(&connection)
    }

    /// Every difference between the server and the replicas.
    #[must_use]
    pub fn divergences(&self, sim: &Simulation) -> Vec<String> {
        let mut found = Vec::new();
        for (connection, client) in &self.clients {
            if client.entity_count() != sim.registry().len() {
                found.push(format!(
                    "connection {connection} knows {} entities, server has {}",
                    client.entity_count(),
                    sim.registry().len()
                ));
            }
            for record in sim.registry().iter() {
                for (field, value) in sim.fields().snapshot(record.id) {
                    let seen = client.authoritative(record.id, field);
                    if seen != Some(&value) {
                        found.push(format!(
                            "connection {connection} sees {field:?} of {} as {seen:?}, server has {value:?}",
                            record.id
                        ));
                    }
                }
            }
        }
        found
    }

    /// Assert every replica matches the server.
    ///
    /// # Panics
    ///
    /// Panics listing each divergence.
    pub fn assert_converged(&self, sim: &Simulation) {
        let found = self.divergences(sim);
        assert!(found.is_empty(), "replicas diverged:\n{}", found.join("\n"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_with_players() {
        let sim = session_with_players(3);
        assert_eq!(sim.session().active_count(), 3);
        assert!(sim.outbox().is_empty());
    }

    #[test]
    fn test_skirmish_setup() {
        let sim = skirmish();
        let holdings = sim.tracker().get(ConnectionId(1)).unwrap();
        assert_eq!(holdings.units().len(), 3);
        assert_eq!(sim.gold(ConnectionId(1)), Some(0));
    }

    #[test]
    fn test_replicas_converge_after_join() {
        let mut sim = Simulation::standard().unwrap();
        let mut net = ReplicaNet::new();
        net.join(&mut sim, ConnectionId(1)).unwrap();
        net.join(&mut sim, ConnectionId(2)).unwrap();
        net.assert_converged(&sim);
    }
}
