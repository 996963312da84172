//! Remote invocation routing.
//!
//! A machine runs in one [`Role`]. Requests submitted on a client or host
//! are always forwarded through the [`Transport`]; nothing executes as a
//! side effect of the submitting call, even on a host whose server lives
//! in the same process. Only an authoritative role may accept requests
//! for execution or emit broadcasts.

use crate::components::ConnectionId;
use crate::error::{GameError, Result};
use crate::protocol::{Envelope, Request, ServerMessage, Target};

/// Boundary to the transport/session layer.
pub trait Transport {
    /// Deliver a request to the authoritative server.
    fn send_request_to_server(&mut self, from: ConnectionId, request: Request) -> Result<()>;

    /// Deliver a message to every observer.
    fn broadcast_to_all(&mut self, message: ServerMessage) -> Result<()>;

    /// Deliver a message to one connection.
    fn send_to_connection(&mut self, connection: ConnectionId, message: ServerMessage) -> Result<()>;
}

/// What this machine is in the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Dedicated server with no local player.
    Server,
    /// Remote client.
    Client(ConnectionId),
    /// Server that also hosts a local player.
    Host(ConnectionId),
}

impl Role {
    /// Whether this machine holds server authority.
    #[must_use]
    pub const fn is_authoritative(self) -> bool {
        matches!(self, Self::Server | Self::Host(_))
    }

    /// Connection of the local player, if there is one.
    #[must_use]
    pub const fn local_connection(self) -> Option<ConnectionId> {
        match self {
            Self::Server => None,
            Self::Client(c) | Self::Host(c) => Some(c),
        }
    }
}

/// A request admitted for execution on the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Admitted {
    /// Requesting connection.
    pub from: ConnectionId,
    /// The request.
    pub request: Request,
}

/// Role-aware dispatcher for both directions.
#[derive(Debug, Clone, Copy)]
pub struct Router {
    role: Role,
}

impl Router {
    /// Create a router for a role.
    #[must_use]
    pub const fn new(role: Role) -> Self {
        Self { role }
    }

    /// This machine's role.
    #[must_use]
    pub const fn role(&self) -> Role {
        self.role
    }

    /// Issue a request from the local player. Always forwarded.
    pub fn submit<T: Transport>(&self, request: Request, transport: &mut T) -> Result<()> {
        let Some(local) = self.role.local_connection() else {
            return Err(GameError::InvalidState(
                "a dedicated server has no local player to issue requests".to_string(),
            ));
        };
        #[cfg(debug_assertions)]
        tracing::debug!("Forwarding {} from connection {local}", request.name());
        transport.send_request_to_server(local, request)
    }

    /// Admit a received request for execution on this machine.
    pub fn accept(&self, from: ConnectionId, request: Request) -> Result<Admitted> {
        if !self.role.is_authoritative() {
            return Err(GameError::InvalidState(format!(
                "{} from connection {from} reached a non-authoritative machine",
                request.name()
            )));
        }
        Ok(Admitted { from, request })
    }

    /// Push one server envelope through the transport.
    pub fn deliver<T: Transport>(&self, envelope: Envelope, transport: &mut T) -> Result<()> {
        if !self.role.is_authoritative() {
            return Err(GameError::InvalidState(
                "only the server may broadcast".to_string(),
            ));
        }
        match envelope.target {
            Target::All => transport.broadcast_to_all(envelope.message),
            Target::Connection(c) => transport.send_to_connection(c, envelope.message),
        }
    }
}

/// Ordered record of everything sent through it.
///
/// The simulation queues its outgoing messages here; hosts drain it once
/// per step and hand the envelopes to the real transport, preserving
/// production order.
#[derive(Debug, Clone, Default)]
pub struct Outbox {
    requests: Vec<(ConnectionId, Request)>,
    envelopes: Vec<Envelope>,
}

impl Outbox {
    /// Create an empty outbox.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a message for every observer.
    pub fn broadcast(&mut self, message: ServerMessage) {
        self.envelopes.push(Envelope {
            target: Target::All,
            message,
        });
    }

    /// Queue a message for one connection.
    pub fn send_to(&mut self, connection: ConnectionId, message: ServerMessage) {
        self.envelopes.push(Envelope {
            target: Target::Connection(connection),
            message,
        });
    }

    /// Take queued server messages in production order.
    pub fn drain(&mut self) -> Vec<Envelope> {
        std::mem::take(&mut self.envelopes)
    }

    /// Take forwarded requests in submission order.
    pub fn drain_requests(&mut self) -> Vec<(ConnectionId, Request)> {
        std::mem::take(&mut self.requests)
    }

    /// Queued server messages.
    #[must_use]
    pub fn envelopes(&self) -> &[Envelope] {
        &self.envelopes
    }

    /// Whether nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.envelopes.is_empty() && self.requests.is_empty()
    }
}

impl Transport for Outbox {
    fn send_request_to_server(&mut self, from: ConnectionId, request: Request) -> Result<()> {
        self.requests.push((from, request));
        Ok(())
    }

    fn broadcast_to_all(&mut self, message: ServerMessage) -> Result<()> {
        self.broadcast(message);
        Ok(())
    }

    fn send_to_connection(&mut self, connection: ConnectionId, message: ServerMessage) -> Result<()> {
        self.send_to(connection, message);
        Ok(())
    }
}
