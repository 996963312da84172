//! One server and its client replicas in a single process.
//!
//! Every message crosses the same byte boundary a real network would:
//! requests are submitted through each replica's router and encoded,
//! server envelopes are encoded once and decoded by every receiving
//! replica. Nothing else is shared between the server and the replicas.

use std::collections::BTreeMap;

use bastion_core::client::ClientSession;
use bastion_core::components::{ConnectionId, EntityId};
use bastion_core::error::{GameError, RequestOutcome, Result as CoreResult};
use bastion_core::protocol::{
    decode_message, decode_request, encode_message, encode_request, Request, ServerMessage,
};
use bastion_core::router::{Role, Router, Transport};
use bastion_core::simulation::Simulation;

use crate::error::{Result, ScriptError};

/// Client-to-server half of the in-memory wire.
#[derive(Default)]
struct Uplink {
    sent: Vec<(ConnectionId, Vec<u8>)>,
}

impl Transport for Uplink {
    fn send_request_to_server(&mut self, from: ConnectionId, request: Request) -> CoreResult<()> {
        self.sent.push((from, encode_request(&request)?));
        Ok(())
    }

    fn broadcast_to_all(&mut self, _message: ServerMessage) -> CoreResult<()> {
        Err(GameError::InvalidState(
            "clients cannot broadcast".to_string(),
        ))
    }

    fn send_to_connection(&mut self, _connection: ConnectionId, _message: ServerMessage) -> CoreResult<()> {
        Err(GameError::InvalidState(
            "clients cannot address other connections".to_string(),
        ))
    }
}

/// Server-to-client half of the in-memory wire.
struct Downlink<'a> {
    replicas: &'a mut BTreeMap<ConnectionId, ClientSession>,
}

impl Transport for Downlink<'_> {
    fn send_request_to_server(&mut self, from: ConnectionId, _request: Request) -> CoreResult<()> {
        Err(GameError::InvalidState(format!(
            "request from connection {from} sent downstream"
        )))
    }

    fn broadcast_to_all(&mut self, message: ServerMessage) -> CoreResult<()> {
        let bytes = encode_message(&message)?;
        for replica in self.replicas.values_mut() {
            replica.on_message(decode_message(&bytes)?);
        }
        Ok(())
    }

    fn send_to_connection(&mut self, connection: ConnectionId, message: ServerMessage) -> CoreResult<()> {
        if let Some(replica) = self.replicas.get_mut(&connection) {
            replica.on_message(decode_message(&encode_message(&message)?)?);
        }
        Ok(())
    }
}

/// Server plus in-process client replicas.
#[derive(Debug)]
pub struct LocalSession {
    sim: Simulation,
    router: Router,
    replicas: BTreeMap<ConnectionId, ClientSession>,
    next_connection: u32,
}

impl LocalSession {
    /// Wrap a fresh simulation.
    #[must_use]
    pub fn new(sim: Simulation) -> Self {
        Self {
            sim,
            router: Router::new(Role::Server),
            replicas: BTreeMap::new(),
            next_connection: 1,
        }
    }

    /// Session over the built-in catalog and default settings.
    pub fn standard() -> Result<Self> {
        Ok(Self::new(Simulation::standard()?))
    }

    /// Connect a client replica. The next unused id is taken when
    /// `connection` is `None`.
    pub fn connect(&mut self, connection: Option<ConnectionId>) -> Result<(ConnectionId, EntityId)> {
        let connection = connection.unwrap_or(ConnectionId(self.next_connection));
        if self.replicas.contains_key(&connection) || self.sim.is_connected(connection) {
            return Err(ScriptError::AlreadyConnected(connection));
        }
        self.next_connection = self.next_connection.max(connection.0.saturating_add(1));

        // Anything still queued predates this replica.
        self.flush()?;
        self.replicas
            .insert(connection, ClientSession::new(Role::Client(connection))?);
        let player = self.sim.connect(connection)?;
        self.flush()?;
        Ok((connection, player))
    }

    /// Drop a client's connection.
    pub fn disconnect(&mut self, connection: ConnectionId) -> Result<()> {
        if self.replicas.remove(&connection).is_none() {
            return Err(ScriptError::UnknownConnection(connection));
        }
        self.sim.disconnect(connection)?;
        self.flush()
    }

    /// Submit a request through a replica and run it on the server.
    pub fn request(&mut self, from: ConnectionId, request: Request) -> Result<RequestOutcome> {
        let replica = self
            .replicas
            .get(&from)
            .ok_or(ScriptError::UnknownConnection(from))?;

        let mut uplink = Uplink::default();
        replica.submit(request, &mut uplink)?;

        let mut outcome = RequestOutcome::Accepted;
        for (sender, bytes) in uplink.sent {
            let admitted = self.router.accept(sender, decode_request(&bytes)?)?;
            outcome = self.sim.handle_request(admitted.from, admitted.request)?;
        }

        if !self.sim.is_connected(from) {
            self.replicas.remove(&from);
        }
        self.flush()?;
        Ok(outcome)
    }

    /// Run `count` server ticks, delivering after each.
    pub fn tick(&mut self, count: u32) -> Result<()> {
        for _ in 0..count {
            self.sim.tick()?;
            self.flush()?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        let mut downlink = Downlink {
            replicas: &mut self.replicas,
        };
        for envelope in self.sim.drain_outbox() {
            self.router.deliver(envelope, &mut downlink)?;
        }
        Ok(())
    }

    /// The authoritative simulation.
    #[must_use]
    pub const fn simulation(&self) -> &Simulation {
        &self.sim
    }

    /// One connection's replica.
    #[must_use]
    pub fn replica(&self, connection: ConnectionId) -> Option<&ClientSession> {
        self.replicas.get(&connection)
    }

    /// Connected replicas in id order.
    pub fn replicas(&self) -> impl Iterator<Item = (ConnectionId, &ClientSession)> {
        self.replicas.iter().map(|(c, r)| (*c, r))
    }

    /// Server state hash.
    #[must_use]
    pub fn hash(&self) -> u64 {
        self.sim.state_hash()
    }

    /// Every replicated value on which a replica disagrees with the server.
    #[must_use]
    pub fn divergences(&self) -> Vec<String> {
        let mut found = Vec::new();
        for (connection, replica) in &self.replicas {
            if replica.entity_count() != self.sim.registry().len() {
                found.push(format!(
                    "connection {connection} knows {} entities, server has {}",
                    replica.entity_count(),
                    self.sim.registry().len()
                ));
            }
            for record in self.sim.registry().iter() {
                for (field, value) in self.sim.fields().snapshot(record.id) {
                    if replica.authoritative(record.id, field) != Some(&value) {
                        found.push(format!(
                            "connection {connection} disagrees on {field:?} of {}",
                            record.id
                        ));
                    }
                }
            }
        }
        found
    }
}
