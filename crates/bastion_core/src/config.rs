//! Session tuning loaded from RON.

use serde::{Deserialize, Serialize};

use crate::components::ConnectionId;
use crate::error::{GameError, Result};
use crate::math::{fixed_serde, Fixed, Vec2Fixed};

/// Gameplay settings shared by every component of one session.
///
/// # Example RON
///
/// ```ron
/// SimulationConfig(
///     starting_gold: 500,
///     spawn_points: [(-40, -40), (40, 40)],
///     acknowledge_rejections: true,
/// )
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Gold granted to each player on connect.
    pub starting_gold: u32,

    /// Half-extent of the square playable area, in world units.
    pub map_half_extent: i32,

    /// Starting base locations, handed out round-robin by connection id.
    pub spawn_points: Vec<(i32, i32)>,

    /// Longest accepted display name, in characters.
    pub max_name_len: usize,

    /// How far the navigation query may move a requested destination.
    #[serde(with = "fixed_serde")]
    pub nav_sample_distance: Fixed,

    /// Send a targeted `RequestRejected` to the requester when a request
    /// fails validation.
    pub acknowledge_rejections: bool,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            starting_gold: 500,
            map_half_extent: 100,
            spawn_points: vec![(-60, -60), (60, 60), (-60, 60), (60, -60)],
            max_name_len: 24,
            nav_sample_distance: Fixed::from_num(1),
            acknowledge_rejections: false,
        }
    }
}

impl SimulationConfig {
    /// Parse a config from RON; missing fields fall back to defaults.
    pub fn from_ron_str(source: &str) -> Result<Self> {
        ron::from_str(source).map_err(|e| GameError::DataParseError {
            path: "<simulation config>".to_string(),
            message: e.to_string(),
        })
    }

    /// Starting base location for a connection.
    #[must_use]
    pub fn spawn_point(&self, connection: ConnectionId) -> Vec2Fixed {
        if self.spawn_points.is_empty() {
            return Vec2Fixed::ZERO;
        }
        let index = connection.0 as usize % self.spawn_points.len();
        let (x, y) = self.spawn_points[index];
        Vec2Fixed::from_ints(x, y)
    }
}
