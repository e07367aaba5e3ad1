//! Per-period risk-free rates for the CAPM regression.

use crate::domain::calendar::{PeriodKey, RebalanceFrequency};
use chrono::NaiveDate;
use std::collections::BTreeMap;

/// Risk-free input to the analyzer. `AssumedZero` is an explicit state, carried
/// into the report, for runs without an observed rate.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum RiskFreeRate {
    Observed(BTreeMap<PeriodKey, f64>),
    #[default]
    AssumedZero,
}

impl RiskFreeRate {
    /// Converts annualized percent observations (e.g. 5.0 for 5%) into
    /// per-period rates: the last observation in each period, de-annualized as
    /// (1 + r/100)^(1/periods_per_year) - 1.
    pub fn from_annual_percent(
        observations: &[(NaiveDate, f64)],
        freq: RebalanceFrequency,
    ) -> RiskFreeRate {
        let mut sorted: Vec<(NaiveDate, f64)> = observations
            .iter()
            .copied()
            .filter(|(_, v)| v.is_finite())
            .collect();
        sorted.sort_by_key(|(d, _)| *d);

        let mut last: BTreeMap<PeriodKey, f64> = BTreeMap::new();
        for (date, pct) in sorted {
            last.insert(freq.key(date), pct);
        }

        if last.is_empty() {
            return RiskFreeRate::AssumedZero;
        }

        let per_year = freq.periods_per_year() as f64;
        RiskFreeRate::Observed(
            last.into_iter()
                .map(|(k, pct)| (k, (1.0 + pct / 100.0).powf(1.0 / per_year) - 1.0))
                .collect(),
        )
    }

    pub fn is_assumed_zero(&self) -> bool {
        matches!(self, RiskFreeRate::AssumedZero)
    }

    /// Rate for `key`, forward-filled from the latest earlier period. `None`
    /// before the first observation.
    pub fn rate_for(&self, key: &PeriodKey) -> Option<f64> {
        match self {
            RiskFreeRate::AssumedZero => Some(0.0),
            RiskFreeRate::Observed(rates) => rates.range(..=*key).next_back().map(|(_, r)| *r),
        }
    }
}
