//! Rebalance tracker: previous-period basket membership, turnover and the
//! transaction-cost multiplier.
//!
//! One tracker per backtest run. Periods must be fed in ascending order; the
//! state after each call is the basket pair just passed in.

use crate::domain::ranker::{Basket, Baskets};

#[derive(Debug, Clone, Default)]
pub struct RebalanceTracker {
    prev: Baskets,
}

impl RebalanceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Names newly added to either side relative to the previous call.
    /// Always 0 for `period_index == 0`. Replaces the stored baskets.
    pub fn turnover(&mut self, period_index: usize, new_long: &Basket, new_short: &Basket) -> usize {
        let turnover = if period_index == 0 {
            0
        } else {
            new_long.difference(&self.prev.long).count()
                + new_short.difference(&self.prev.short).count()
        };

        self.prev = Baskets {
            long: new_long.clone(),
            short: new_short.clone(),
        };
        turnover
    }

    pub fn previous(&self) -> &Baskets {
        &self.prev
    }
}

/// 1 - cost_rate * turnover.
pub fn cost_multiplier(cost_rate: f64, turnover: usize) -> f64 {
    1.0 - cost_rate * turnover as f64
}
