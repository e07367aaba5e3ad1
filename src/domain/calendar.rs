//! Rebalance calendar: buckets the trading-day timeline into rebalance periods.

use chrono::{Datelike, NaiveDate};
use std::fmt;
use std::str::FromStr;

/// Rebalance cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RebalanceFrequency {
    #[default]
    Monthly,
    Quarterly,
    Yearly,
}

impl RebalanceFrequency {
    pub fn periods_per_year(&self) -> u32 {
        match self {
            RebalanceFrequency::Monthly => 12,
            RebalanceFrequency::Quarterly => 4,
            RebalanceFrequency::Yearly => 1,
        }
    }

    /// The bucket a trading day belongs to.
    pub fn key(&self, date: NaiveDate) -> PeriodKey {
        let index = match self {
            RebalanceFrequency::Monthly => date.month0(),
            RebalanceFrequency::Quarterly => date.month0() / 3,
            RebalanceFrequency::Yearly => 0,
        };
        PeriodKey {
            year: date.year(),
            index,
            periods_per_year: self.periods_per_year(),
        }
    }
}

impl FromStr for RebalanceFrequency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "monthly" | "month" | "m" => Ok(RebalanceFrequency::Monthly),
            "quarterly" | "quarter" | "q" => Ok(RebalanceFrequency::Quarterly),
            "yearly" | "annual" | "y" => Ok(RebalanceFrequency::Yearly),
            other => Err(format!("unknown rebalance frequency '{}'", other)),
        }
    }
}

impl fmt::Display for RebalanceFrequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RebalanceFrequency::Monthly => write!(f, "monthly"),
            RebalanceFrequency::Quarterly => write!(f, "quarterly"),
            RebalanceFrequency::Yearly => write!(f, "yearly"),
        }
    }
}

/// Calendar bucket identity. `index` is zero-based within the year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PeriodKey {
    pub year: i32,
    pub index: u32,
    pub periods_per_year: u32,
}

impl PeriodKey {
    /// The calendar bucket immediately after this one.
    pub fn successor(&self) -> PeriodKey {
        if self.index + 1 >= self.periods_per_year {
            PeriodKey {
                year: self.year + 1,
                index: 0,
                periods_per_year: self.periods_per_year,
            }
        } else {
            PeriodKey {
                index: self.index + 1,
                ..*self
            }
        }
    }
}

impl fmt::Display for PeriodKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.periods_per_year {
            12 => write!(f, "{}-{:02}", self.year, self.index + 1),
            4 => write!(f, "{}-Q{}", self.year, self.index + 1),
            _ => write!(f, "{}", self.year),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RebalancePeriod {
    pub key: PeriodKey,
    /// Trading days of the bucket, ascending.
    pub dates: Vec<NaiveDate>,
}

impl RebalancePeriod {
    /// Last trading date observed in the bucket.
    pub fn period_end(&self) -> NaiveDate {
        // build_periods never creates an empty bucket
        self.dates[self.dates.len() - 1]
    }
}

/// Groups an ascending timeline into consecutive, non-empty buckets.
pub fn build_periods(timeline: &[NaiveDate], freq: RebalanceFrequency) -> Vec<RebalancePeriod> {
    let mut periods: Vec<RebalancePeriod> = Vec::new();

    for &date in timeline {
        let key = freq.key(date);
        match periods.last_mut() {
            Some(current) if current.key == key => current.dates.push(date),
            _ => periods.push(RebalancePeriod {
                key,
                dates: vec![date],
            }),
        }
    }

    periods
}
