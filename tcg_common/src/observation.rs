//! A single externally observed market price

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Last-sold price for a card as reported by a price source
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceObservation {
    pub price: f64,
    pub observed_at: DateTime<Utc>,
}

impl PriceObservation {
    pub fn new(price: f64, observed_at: DateTime<Utc>) -> Self {
        Self { price, observed_at }
    }

    /// Prices must be finite and non-negative to be merged into a ledger
    pub fn is_well_formed(&self) -> bool {
        self.price.is_finite() && self.price >= 0.0
    }

    /// True if this observation is strictly newer than `current`.
    ///
    /// Anything is newer than no observation at all.
    pub fn supersedes(&self, current: Option<&PriceObservation>) -> bool {
        current.map_or(true, |c| self.observed_at > c.observed_at)
    }
}
