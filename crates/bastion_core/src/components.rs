//! Identity and component definitions.
//!
//! Components are pure data with no behavior beyond small helpers.
//! Replicated values (gold, health, names) live in the
//! [`FieldStore`](crate::replication::FieldStore); the types here
//! describe what an entity *is*.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::math::{fixed_serde, Fixed, Vec2Fixed};

/// Unique identifier for networked entities.
///
/// Allocated by the lifecycle manager starting at 1 and never reused
/// within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(pub u64);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Stable identity of one client session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConnectionId(pub u32);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Catalog identifier of a purchasable template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BuyableId(pub u32);

impl fmt::Display for BuyableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What an entity is. Decides which replicated fields it carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntityKind {
    /// Per-connection aggregate holding gold and presentation.
    Player,
    /// Placement anchor that owns buildings.
    Base,
    /// Structure attributed to a base.
    Building,
    /// Mobile combatant owned directly by a player.
    Unit,
}

impl EntityKind {
    /// Whether damage can be dealt to this kind.
    #[must_use]
    pub const fn is_damageable(self) -> bool {
        !matches!(self, Self::Player)
    }
}

/// Position and orientation in world space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Transform {
    /// Position on the ground plane.
    pub position: Vec2Fixed,
    /// Heading in degrees.
    #[serde(with = "fixed_serde")]
    pub heading: Fixed,
}

impl Transform {
    /// Create a transform.
    #[must_use]
    pub const fn new(position: Vec2Fixed, heading: Fixed) -> Self {
        Self { position, heading }
    }

    /// Transform at a position with zero heading.
    #[must_use]
    pub const fn at(position: Vec2Fixed) -> Self {
        Self {
            position,
            heading: Fixed::ZERO,
        }
    }
}

/// Player color used by every replica to tint owned entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct TeamColor {
    /// Red channel.
    pub r: u8,
    /// Green channel.
    pub g: u8,
    /// Blue channel.
    pub b: u8,
}

impl TeamColor {
    /// Lowest channel value, so no team renders pitch black.
    pub const MIN_CHANNEL: u8 = 13;

    /// Derive a stable color from a connection id.
    #[must_use]
    pub fn for_connection(connection: ConnectionId) -> Self {
        // Knuth multiplicative hash spreads consecutive ids across the palette.
        let hash = connection.0.wrapping_add(1).wrapping_mul(2_654_435_761);
        let channel = |shift: u32| {
            let raw = (hash >> shift) as u8;
            raw.max(Self::MIN_CHANNEL)
        };
        Self {
            r: channel(24),
            g: channel(16),
            b: channel(8),
        }
    }
}

/// Health bookkeeping for damageable entities.
///
/// `current` is mirrored into the replicated `Health` field; `max` comes
/// from the template and never changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Health {
    /// Current health points.
    pub current: u32,
    /// Maximum health points.
    pub max: u32,
}

impl Health {
    /// Create new health component at full health.
    #[must_use]
    pub const fn new(max: u32) -> Self {
        Self { current: max, max }
    }

    /// Check if entity is dead (health == 0).
    #[must_use]
    pub const fn is_dead(&self) -> bool {
        self.current == 0
    }

    /// Apply damage, returning actual damage dealt.
    /// Uses saturating subtraction to prevent underflow.
    pub fn apply_damage(&mut self, amount: u32) -> u32 {
        let actual = amount.min(self.current);
        self.current = self.current.saturating_sub(actual);
        actual
    }
}
