//! Session roster and game-over detection.
//!
//! One [`SessionCoordinator`] exists per session and is owned by that
//! session's [`Simulation`](crate::simulation::Simulation); nothing about
//! it is global, so any number of sessions can run side by side.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::components::ConnectionId;

/// Session phase. `GameOver` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SessionState {
    /// Players are still competing.
    #[default]
    Active,
    /// A winner has been decided.
    GameOver,
}

/// Result of a roster change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RosterChange {
    /// Nothing happened (unknown or already removed player).
    Unchanged,
    /// The player was removed and the game continues.
    Removed,
    /// The player was removed and exactly one player remains.
    GameOver {
        /// The last active player.
        winner: ConnectionId,
    },
}

/// Active-player roster.
#[derive(Debug, Clone, Default)]
pub struct SessionCoordinator {
    active: BTreeSet<ConnectionId>,
    state: SessionState,
    winner: Option<ConnectionId>,
}

impl SessionCoordinator {
    /// Create an empty, active session.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a player whose networked presence started.
    pub fn add_player(&mut self, connection: ConnectionId) -> bool {
        self.active.insert(connection)
    }

    /// Remove an eliminated player and evaluate the win condition.
    ///
    /// Removing a player twice is a no-op.
    pub fn remove_player(&mut self, connection: ConnectionId) -> RosterChange {
        if !self.active.remove(&connection) {
            return RosterChange::Unchanged;
        }
        match self.check_game_over() {
            Some(winner) => RosterChange::GameOver { winner },
            None => RosterChange::Removed,
        }
    }

    /// Move to `GameOver` if exactly one active player remains.
    ///
    /// Returns the winner only on the transition; once over, always
    /// `None`.
    pub fn check_game_over(&mut self) -> Option<ConnectionId> {
        if self.state == SessionState::GameOver || self.active.len() != 1 {
            return None;
        }
        let winner = self.active.iter().next().copied()?;
        self.state = SessionState::GameOver;
        self.winner = Some(winner);
        tracing::info!("Game over, connection {winner} wins");
        Some(winner)
    }

    /// Current phase.
    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Whether the session has ended.
    #[must_use]
    pub fn is_over(&self) -> bool {
        self.state == SessionState::GameOver
    }

    /// Winner, once decided.
    #[must_use]
    pub const fn winner(&self) -> Option<ConnectionId> {
        self.winner
    }

    /// Whether a connection is still competing.
    #[must_use]
    pub fn is_active(&self, connection: ConnectionId) -> bool {
        self.active.contains(&connection)
    }

    /// Active players in id order.
    pub fn active_players(&self) -> impl Iterator<Item = ConnectionId> + '_ {
        self.active.iter().copied()
    }

    /// Number of active players.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.active.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_game_over_fires_once() {
        let mut session = SessionCoordinator::new();
        for c in 1..=3 {
            session.add_player(ConnectionId(c));
        }

        assert_eq!(session.remove_player(ConnectionId(1)), RosterChange::Removed);
        assert_eq!(
            session.remove_player(ConnectionId(2)),
            RosterChange::GameOver {
                winner: ConnectionId(3)
            }
        );
        assert!(session.is_over());
        assert_eq!(session.check_game_over(), None);
        assert_eq!(session.remove_player(ConnectionId(3)), RosterChange::Removed);
        assert_eq!(session.state(), SessionState::GameOver);
    }

    #[test]
    fn test_double_removal_is_noop() {
        let mut session = SessionCoordinator::new();
        session.add_player(ConnectionId(1));
        session.add_player(ConnectionId(2));
        session.add_player(ConnectionId(3));
        assert_eq!(session.remove_player(ConnectionId(1)), RosterChange::Removed);
        assert_eq!(session.remove_player(ConnectionId(1)), RosterChange::Unchanged);
        assert_eq!(session.active_count(), 2);
    }

    #[test]
    fn test_lone_player_does_not_win_by_joining() {
        let mut session = SessionCoordinator::new();
        session.add_player(ConnectionId(1));
        assert_eq!(session.state(), SessionState::Active);
        assert_eq!(session.winner(), None);
    }

    #[test]
    fn test_independent_sessions() {
        let mut a = SessionCoordinator::new();
        let mut b = SessionCoordinator::new();
        a.add_player(ConnectionId(1));
        a.add_player(ConnectionId(2));
        b.add_player(ConnectionId(1));
        b.add_player(ConnectionId(2));

        a.remove_player(ConnectionId(1));
        assert!(a.is_over());
        assert!(!b.is_over());
    }
}
