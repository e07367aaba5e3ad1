//! Daily OHLCV bar for one instrument.

use chrono::NaiveDate;

#[derive(Debug, Clone, PartialEq)]
pub struct OhlcvBar {
    pub code: String,
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
}

/// (current - base) / base, undefined when the base is zero or either price is non-finite.
pub fn pct_change(base: f64, current: f64) -> Option<f64> {
    if base == 0.0 || !base.is_finite() || !current.is_finite() {
        None
    } else {
        Some((current - base) / base)
    }
}
