//! Date-indexed daily return series.
//!
//! Dates are strictly increasing. A value may be missing for a date (no
//! observation that day); consumers decide how to treat the gap.

use crate::domain::calendar::{PeriodKey, RebalanceFrequency};
use crate::domain::error::FactorlabError;
use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReturnPoint {
    pub date: NaiveDate,
    pub value: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReturnSeries {
    points: Vec<ReturnPoint>,
}

impl ReturnSeries {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_points(points: Vec<ReturnPoint>) -> Result<Self, FactorlabError> {
        let mut series = Self::new();
        for p in points {
            series.push(p.date, p.value)?;
        }
        Ok(series)
    }

    pub fn from_values(values: &[(NaiveDate, f64)]) -> Result<Self, FactorlabError> {
        Self::from_points(
            values
                .iter()
                .map(|&(date, v)| ReturnPoint {
                    date,
                    value: Some(v),
                })
                .collect(),
        )
    }

    /// Appends a point; the date must be later than every existing date.
    pub fn push(&mut self, date: NaiveDate, value: Option<f64>) -> Result<(), FactorlabError> {
        if let Some(last) = self.points.last() {
            if date <= last.date {
                return Err(FactorlabError::Data {
                    reason: format!(
                        "return series date {} does not follow {}",
                        date, last.date
                    ),
                });
            }
        }
        self.points.push(ReturnPoint { date, value });
        Ok(())
    }

    pub fn points(&self) -> &[ReturnPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn dates(&self) -> Vec<NaiveDate> {
        self.points.iter().map(|p| p.date).collect()
    }

    /// `None` if the date is absent, `Some(None)` if present without a value.
    pub fn get(&self, date: NaiveDate) -> Option<Option<f64>> {
        self.points
            .binary_search_by_key(&date, |p| p.date)
            .ok()
            .map(|i| self.points[i].value)
    }

    /// Values that were actually observed, in date order.
    pub fn observed(&self) -> Vec<f64> {
        self.points.iter().filter_map(|p| p.value).collect()
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.points.first().map(|p| p.date)
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.points.last().map(|p| p.date)
    }

    pub fn restrict_to(&self, dates: &BTreeSet<NaiveDate>) -> ReturnSeries {
        ReturnSeries {
            points: self
                .points
                .iter()
                .filter(|p| dates.contains(&p.date))
                .copied()
                .collect(),
        }
    }

    /// Compounds daily values into one return per calendar bucket:
    /// prod(1 + r) - 1, missing days contributing nothing.
    pub fn compound_by_period(&self, freq: RebalanceFrequency) -> BTreeMap<PeriodKey, f64> {
        let mut growth: BTreeMap<PeriodKey, f64> = BTreeMap::new();
        for p in &self.points {
            let g = growth.entry(freq.key(p.date)).or_insert(1.0);
            *g *= 1.0 + p.value.unwrap_or(0.0);
        }
        growth.into_iter().map(|(k, g)| (k, g - 1.0)).collect()
    }
}

/// Restricts both series to their common dates.
pub fn align(
    strategy: &ReturnSeries,
    benchmark: &ReturnSeries,
) -> Result<(ReturnSeries, ReturnSeries), FactorlabError> {
    let left: BTreeSet<NaiveDate> = strategy.points.iter().map(|p| p.date).collect();
    let common: BTreeSet<NaiveDate> = benchmark
        .points
        .iter()
        .map(|p| p.date)
        .filter(|d| left.contains(d))
        .collect();

    if common.is_empty() {
        return Err(FactorlabError::NoOverlap);
    }

    Ok((strategy.restrict_to(&common), benchmark.restrict_to(&common)))
}
