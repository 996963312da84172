//! Connection admission.
//!
//! The lobby hands out connection ids and enforces the seat limit. Once
//! the session is over it refuses everyone.

use std::collections::BTreeSet;

use bastion_core::components::ConnectionId;
use thiserror::Error;

/// Why a connection was turned away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Refusal {
    /// Every seat is taken.
    #[error("Session is full ({max} players)")]
    Full {
        /// Seat limit.
        max: u8,
    },
    /// The session has ended.
    #[error("Session is over")]
    Closed,
}

/// Seat bookkeeping for one session.
#[derive(Debug, Clone)]
pub struct Lobby {
    max_players: u8,
    next_id: u32,
    seated: BTreeSet<ConnectionId>,
    closed: bool,
}

impl Lobby {
    /// Create a lobby with `max_players` seats. Ids start at 1.
    #[must_use]
    pub fn new(max_players: u8) -> Self {
        Self {
            max_players,
            next_id: 1,
            seated: BTreeSet::new(),
            closed: false,
        }
    }

    /// Seat a new connection.
    pub fn admit(&mut self) -> Result<ConnectionId, Refusal> {
        if self.closed {
            return Err(Refusal::Closed);
        }
        if self.seated.len() >= usize::from(self.max_players) {
            return Err(Refusal::Full {
                max: self.max_players,
            });
        }

        let connection = ConnectionId(self.next_id);
        self.next_id += 1;
        self.seated.insert(connection);
        tracing::info!(
            "Admitted connection {connection} ({}/{})",
            self.seated.len(),
            self.max_players
        );
        Ok(connection)
    }

    /// Free a seat. Returns whether the connection was seated.
    pub fn release(&mut self, connection: ConnectionId) -> bool {
        self.seated.remove(&connection)
    }

    /// Refuse all further admissions.
    pub fn close(&mut self) {
        if !self.closed {
            tracing::info!("Lobby closed");
            self.closed = true;
        }
    }

    /// Whether admissions are refused.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.closed
    }

    /// Seated connections in id order.
    pub fn seated(&self) -> impl Iterator<Item = ConnectionId> + '_ {
        self.seated.iter().copied()
    }

    /// Number of seated connections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.seated.len()
    }

    /// Whether nobody is seated.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.seated.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_sequential() {
        let mut lobby = Lobby::new(4);
        assert_eq!(lobby.admit(), Ok(ConnectionId(1)));
        assert_eq!(lobby.admit(), Ok(ConnectionId(2)));
    }

    #[test]
    fn test_full_lobby_refuses() {
        let mut lobby = Lobby::new(2);
        lobby.admit().unwrap();
        let second = lobby.admit().unwrap();
        assert_eq!(lobby.admit(), Err(Refusal::Full { max: 2 }));

        // A freed seat is reusable, but the id is not.
        assert!(lobby.release(second));
        assert_eq!(lobby.admit(), Ok(ConnectionId(3)));
    }

    #[test]
    fn test_closed_lobby_refuses() {
        let mut lobby = Lobby::new(8);
        lobby.close();
        assert_eq!(lobby.admit(), Err(Refusal::Closed));
        assert!(lobby.is_empty());
    }
}
