//! Return aggregator: turns one period's baskets into forward daily strategy
//! and benchmark returns.

use crate::domain::ranker::{Basket, Baskets};
use crate::domain::series::ReturnPoint;
use crate::domain::signal::SignalTable;
use chrono::NaiveDate;
use std::fmt;
use std::str::FromStr;

/// How short-basket members enter the daily strategy return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShortLeg {
    /// Short members contribute the negated return.
    #[default]
    Negate,
    /// Short members contribute nothing but still count in the denominator.
    Ignore,
}

impl FromStr for ShortLeg {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "negate" | "short" => Ok(ShortLeg::Negate),
            "ignore" | "none" => Ok(ShortLeg::Ignore),
            other => Err(format!("unknown short_leg '{}'", other)),
        }
    }
}

impl fmt::Display for ShortLeg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShortLeg::Negate => write!(f, "negate"),
            ShortLeg::Ignore => write!(f, "ignore"),
        }
    }
}

/// Strategy and benchmark values for every forward day of one period.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ForwardReturns {
    pub strategy: Vec<ReturnPoint>,
    pub benchmark: Vec<ReturnPoint>,
}

impl ForwardReturns {
    pub fn len(&self) -> usize {
        self.strategy.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategy.is_empty()
    }
}

/// Sum of basket contributions on `date` divided by the total basket size.
pub fn strategy_return(
    returns: &SignalTable,
    baskets: &Baskets,
    date: NaiveDate,
    short_leg: ShortLeg,
) -> f64 {
    let long_sum: f64 = baskets
        .long
        .iter()
        .filter_map(|code| returns.daily_return(code, date))
        .sum();

    let short_sum: f64 = match short_leg {
        ShortLeg::Negate => baskets
            .short
            .iter()
            .filter_map(|code| returns.daily_return(code, date))
            .map(|r| -r)
            .sum(),
        ShortLeg::Ignore => 0.0,
    };

    (long_sum + short_sum) / baskets.total_size().max(1) as f64
}

/// Equal-weight mean over `population` members with a return on `date`.
pub fn benchmark_return(returns: &SignalTable, population: &Basket, date: NaiveDate) -> Option<f64> {
    let mut sum = 0.0;
    let mut count = 0usize;
    for code in population {
        if let Some(r) = returns.daily_return(code, date) {
            sum += r;
            count += 1;
        }
    }
    (count > 0).then(|| sum / count as f64)
}

/// Builds the forward rows of one period. `cost_multiplier` scales only the
/// first day's strategy value.
pub fn aggregate_forward(
    returns: &SignalTable,
    baskets: &Baskets,
    population: &Basket,
    forward_dates: &[NaiveDate],
    cost_multiplier: f64,
    short_leg: ShortLeg,
) -> ForwardReturns {
    let mut out = ForwardReturns {
        strategy: Vec::with_capacity(forward_dates.len()),
        benchmark: Vec::with_capacity(forward_dates.len()),
    };

    for (i, &date) in forward_dates.iter().enumerate() {
        let mut value = strategy_return(returns, baskets, date, short_leg);
        if i == 0 {
            value *= cost_multiplier;
        }
        out.strategy.push(ReturnPoint {
            date,
            value: Some(value),
        });
        out.benchmark.push(ReturnPoint {
            date,
            value: benchmark_return(returns, population, date),
        });
    }

    out
}
