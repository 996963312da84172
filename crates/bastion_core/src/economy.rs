//! Gold economy.
//!
//! Balances are replicated `Gold` fields; [`Wallet`] is the arithmetic
//! the server applies to them. All math is integer and never goes below
//! zero.

use serde::{Deserialize, Serialize};

/// A gold balance with atomic check-and-deduct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Wallet {
    /// Current balance.
    pub gold: u32,
}

impl Wallet {
    /// Wrap a balance.
    #[must_use]
    pub const fn new(gold: u32) -> Self {
        Self { gold }
    }

    /// Check if the wallet can cover `amount`.
    #[must_use]
    pub const fn can_afford(&self, amount: u32) -> bool {
        self.gold >= amount
    }

    /// Spend gold if available.
    ///
    /// Returns true if the transaction succeeded; on failure the balance
    /// is untouched.
    pub fn spend(&mut self, amount: u32) -> bool {
        if self.can_afford(amount) {
            self.gold -= amount;
            true
        } else {
            false
        }
    }

    /// Add gold, saturating at `u32::MAX`. Returns the amount credited.
    pub fn deposit(&mut self, amount: u32) -> u32 {
        let before = self.gold;
        self.gold = self.gold.saturating_add(amount);
        self.gold - before
    }
}

/// Periodic income attached to a gold-mine building.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoldMine {
    /// Gold per payout.
    pub amount: u32,
    /// Ticks between payouts.
    pub interval_ticks: u32,
    elapsed: u32,
}

impl GoldMine {
    /// Create a mine that pays `amount` every `interval_ticks`.
    #[must_use]
    pub const fn new(amount: u32, interval_ticks: u32) -> Self {
        Self {
            amount,
            interval_ticks,
            elapsed: 0,
        }
    }

    /// Advance one tick; returns the payout when one is due.
    pub fn tick(&mut self) -> Option<u32> {
        self.elapsed += 1;
        if self.elapsed >= self.interval_ticks {
            self.elapsed = 0;
            Some(self.amount)
        } else {
            None
        }
    }
}
