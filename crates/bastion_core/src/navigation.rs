//! Navigation boundary.
//!
//! Pathfinding is an external collaborator. The simulation only asks it
//! to snap a requested destination to the nearest walkable point.

use serde::{Deserialize, Serialize};

use crate::math::{fixed_serde, Fixed, Vec2Fixed};

/// Pure query against the walkable surface.
pub trait NavigationQuery {
    /// Nearest walkable point within `max_distance` of `point`, or `None`
    /// if there is none.
    fn sample_position(&self, point: Vec2Fixed, max_distance: Fixed) -> Option<Vec2Fixed>;
}

/// Circular blocked area.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Obstacle {
    /// Center.
    pub center: Vec2Fixed,
    /// Radius.
    #[serde(with = "fixed_serde")]
    pub radius: Fixed,
}

/// Square open map with optional circular obstacles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenField {
    /// Half the side length; the map spans `[-half_extent, half_extent]`.
    #[serde(with = "fixed_serde")]
    pub half_extent: Fixed,
    /// Blocked areas.
    pub obstacles: Vec<Obstacle>,
}

impl OpenField {
    /// Open map without obstacles.
    #[must_use]
    pub fn new(half_extent: i32) -> Self {
        Self {
            half_extent: Fixed::from_num(half_extent),
            obstacles: Vec::new(),
        }
    }

    /// Add an obstacle.
    #[must_use]
    pub fn with_obstacle(mut self, center: Vec2Fixed, radius: Fixed) -> Self {
        self.obstacles.push(Obstacle { center, radius });
        self
    }

    fn clamp(&self, point: Vec2Fixed) -> Vec2Fixed {
        let lo = -self.half_extent;
        let hi = self.half_extent;
        Vec2Fixed::new(point.x.clamp(lo, hi), point.y.clamp(lo, hi))
    }
}

impl NavigationQuery for OpenField {
    fn sample_position(&self, point: Vec2Fixed, max_distance: Fixed) -> Option<Vec2Fixed> {
        let mut candidate = self.clamp(point);

        if let Some(obstacle) = self
            .obstacles
            .iter()
            .find(|o| o.center.within(candidate, o.radius))
        {
            let away = candidate - obstacle.center;
            if away == Vec2Fixed::ZERO {
                return None;
            }
            candidate = self.clamp(obstacle.center + away.normalize().scale(obstacle.radius));
        }

        if candidate.distance_squared(point) > max_distance.saturating_mul(max_distance) {
            return None;
        }
        Some(candidate)
    }
}
