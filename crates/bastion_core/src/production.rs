//! Unit training at spawner buildings.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Errors that can occur when queueing production.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductionError {
    /// The production queue is full.
    QueueFull,
}

impl fmt::Display for ProductionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::QueueFull => write!(f, "Production queue is full"),
        }
    }
}

impl std::error::Error for ProductionError {}

/// A spawner's training queue.
///
/// Only counts are kept: every queued unit is the spawner's single unit
/// type, and the first one trains while the rest wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainingQueue {
    queued: u32,
    max_queue: u32,
    progress: u32,
    ticks_per_unit: u32,
    produced: u64,
}

impl TrainingQueue {
    /// Create an empty queue.
    #[must_use]
    pub fn new(max_queue: u8, ticks_per_unit: u32) -> Self {
        Self {
            queued: 0,
            max_queue: u32::from(max_queue),
            progress: 0,
            ticks_per_unit: ticks_per_unit.max(1),
            produced: 0,
        }
    }

    /// Check if the queue is full.
    #[must_use]
    pub const fn is_full(&self) -> bool {
        self.queued >= self.max_queue
    }

    /// Add one unit to the queue.
    pub fn add(&mut self) -> Result<(), ProductionError> {
        if self.is_full() {
            return Err(ProductionError::QueueFull);
        }
        self.queued += 1;
        Ok(())
    }

    /// Advance training by one tick. Returns true when a unit finishes.
    pub fn tick(&mut self) -> bool {
        if self.queued == 0 {
            return false;
        }
        self.progress += 1;
        if self.progress < self.ticks_per_unit {
            return false;
        }
        self.progress = 0;
        self.queued -= 1;
        self.produced += 1;
        true
    }

    /// Units waiting, including the one in training.
    #[must_use]
    pub const fn queued(&self) -> u32 {
        self.queued
    }

    /// Ticks spent on the current unit.
    #[must_use]
    pub const fn progress(&self) -> u32 {
        self.progress
    }

    /// Units finished so far.
    #[must_use]
    pub const fn produced(&self) -> u64 {
        self.produced
    }
}
