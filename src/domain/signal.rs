//! Signal engine: per-instrument daily returns, momentum and rolling volatility.
//!
//! RETURN[t]   = (C[t] - C[t-1]) / C[t-1]
//! MOM(n)[t]   = (C[t] - C[t-n]) / C[t-n]
//! VOL(w)[t]   = sample stddev of RETURN[t-w+1..=t]
//!
//! Every value is strictly causal and computed within one instrument. A value
//! is `None` during warmup or when a base close is zero; such rows never reach
//! the ranker.

use crate::domain::ohlcv::pct_change;
use crate::domain::panel::{InstrumentSeries, PricePanel};
use crate::domain::stats::sample_std;
use chrono::NaiveDate;
use rayon::prelude::*;
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// A rankable factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Factor {
    ShortMomentum,
    LongMomentum,
    Volatility,
}

impl Factor {
    pub const ALL: [Factor; 3] = [
        Factor::ShortMomentum,
        Factor::LongMomentum,
        Factor::Volatility,
    ];
}

impl fmt::Display for Factor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Factor::ShortMomentum => write!(f, "short_momentum"),
            Factor::LongMomentum => write!(f, "long_momentum"),
            Factor::Volatility => write!(f, "volatility"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalWindows {
    pub short_window: usize,
    pub long_window: usize,
    pub vol_window: usize,
}

impl Default for SignalWindows {
    fn default() -> Self {
        SignalWindows {
            short_window: 20,
            long_window: 60,
            vol_window: 20,
        }
    }
}

/// One row of an instrument's signal history.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalPoint {
    pub date: NaiveDate,
    pub daily_return: Option<f64>,
    pub short_momentum: Option<f64>,
    pub long_momentum: Option<f64>,
    pub volatility: Option<f64>,
}

/// A row with every factor defined; the only shape the ranker accepts.
#[derive(Debug, Clone, PartialEq)]
pub struct FactorRecord {
    pub code: String,
    pub date: NaiveDate,
    pub short_momentum: f64,
    pub long_momentum: f64,
    pub volatility: f64,
}

impl FactorRecord {
    pub fn value(&self, factor: Factor) -> f64 {
        match factor {
            Factor::ShortMomentum => self.short_momentum,
            Factor::LongMomentum => self.long_momentum,
            Factor::Volatility => self.volatility,
        }
    }
}

#[derive(Debug, Clone)]
pub struct InstrumentSignals {
    pub code: String,
    pub points: Vec<SignalPoint>,
    date_index: HashMap<NaiveDate, usize>,
}

impl InstrumentSignals {
    pub fn get(&self, date: NaiveDate) -> Option<&SignalPoint> {
        self.date_index.get(&date).map(|&i| &self.points[i])
    }

    pub fn daily_return(&self, date: NaiveDate) -> Option<f64> {
        self.get(date).and_then(|p| p.daily_return)
    }

    /// The complete factor record on `date`, if the instrument traded and is past warmup.
    pub fn record_on(&self, date: NaiveDate) -> Option<FactorRecord> {
        let p = self.get(date)?;
        Some(FactorRecord {
            code: self.code.clone(),
            date,
            short_momentum: p.short_momentum?,
            long_momentum: p.long_momentum?,
            volatility: p.volatility?,
        })
    }
}

pub fn daily_returns(closes: &[f64]) -> Vec<Option<f64>> {
    let mut values = Vec::with_capacity(closes.len());
    for i in 0..closes.len() {
        values.push(if i == 0 {
            None
        } else {
            pct_change(closes[i - 1], closes[i])
        });
    }
    values
}

pub fn momentum(closes: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut values = Vec::with_capacity(closes.len());
    for i in 0..closes.len() {
        values.push(if period > 0 && i >= period {
            pct_change(closes[i - period], closes[i])
        } else {
            None
        });
    }
    values
}

/// Rolling sample standard deviation; a window with any undefined return is undefined.
pub fn rolling_volatility(returns: &[Option<f64>], window: usize) -> Vec<Option<f64>> {
    let mut values = Vec::with_capacity(returns.len());
    let mut buf = Vec::with_capacity(window);

    for i in 0..returns.len() {
        let value = if window > 0 && i + 1 >= window {
            buf.clear();
            for r in &returns[i + 1 - window..=i] {
                match r {
                    Some(v) => buf.push(*v),
                    None => break,
                }
            }
            if buf.len() == window {
                sample_std(&buf)
            } else {
                None
            }
        } else {
            None
        };
        values.push(value);
    }
    values
}

pub fn compute_signals(series: &InstrumentSeries, windows: &SignalWindows) -> InstrumentSignals {
    let closes: Vec<f64> = series.bars.iter().map(|b| b.close).collect();
    let returns = daily_returns(&closes);
    let short = momentum(&closes, windows.short_window);
    let long = momentum(&closes, windows.long_window);
    let vol = rolling_volatility(&returns, windows.vol_window);

    let points: Vec<SignalPoint> = series
        .bars
        .iter()
        .enumerate()
        .map(|(i, bar)| SignalPoint {
            date: bar.date,
            daily_return: returns[i],
            short_momentum: short[i],
            long_momentum: long[i],
            volatility: vol[i],
        })
        .collect();

    InstrumentSignals {
        code: series.code.clone(),
        date_index: series.date_index.clone(),
        points,
    }
}

/// Signals for the whole panel, keyed by instrument identifier.
#[derive(Debug, Clone, Default)]
pub struct SignalTable {
    instruments: BTreeMap<String, InstrumentSignals>,
}

impl SignalTable {
    /// Instruments are independent, so they are computed in parallel; the
    /// ordered map makes the result independent of scheduling.
    pub fn compute(panel: &PricePanel, windows: &SignalWindows) -> Self {
        let series: Vec<&InstrumentSeries> = panel.instruments().collect();
        let computed: Vec<InstrumentSignals> = series
            .par_iter()
            .map(|s| compute_signals(s, windows))
            .collect();

        SignalTable {
            instruments: computed
                .into_iter()
                .map(|s| (s.code.clone(), s))
                .collect(),
        }
    }

    pub fn get(&self, code: &str) -> Option<&InstrumentSignals> {
        self.instruments.get(code)
    }

    pub fn instruments(&self) -> impl Iterator<Item = &InstrumentSignals> {
        self.instruments.values()
    }

    pub fn daily_return(&self, code: &str, date: NaiveDate) -> Option<f64> {
        self.get(code).and_then(|s| s.daily_return(date))
    }

    /// Complete factor records on `date`, in identifier order.
    pub fn cross_section(&self, date: NaiveDate) -> Vec<FactorRecord> {
        self.instruments
            .values()
            .filter_map(|s| s.record_on(date))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ohlcv::OhlcvBar;
    use approx::assert_relative_eq;

    fn make_series(code: &str, prices: &[f64]) -> InstrumentSeries {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let bars = prices
            .iter()
            .enumerate()
            .map(|(i, &close)| OhlcvBar {
                code: code.into(),
                date: start + chrono::Duration::days(i as i64),
                open: close,
                high: close,
                low: close,
                close,
                volume: 1000,
            })
            .collect();
        InstrumentSeries::new(code.into(), bars).unwrap()
    }

    #[test]
    fn daily_return_undefined_on_first_bar() {
        let r = daily_returns(&[100.0, 110.0, 99.0]);
        assert_eq!(r[0], None);
        assert_relative_eq!(r[1].unwrap(), 0.10);
        assert_relative_eq!(r[2].unwrap(), -0.10);
    }

    #[test]
    fn momentum_warmup() {
        let m = momentum(&[100.0, 105.0, 110.0, 115.0, 120.0], 3);
        assert!(m[..3].iter().all(Option::is_none));
        assert_relative_eq!(m[3].unwrap(), 0.15);
        assert_relative_eq!(m[4].unwrap(), (120.0 - 105.0) / 105.0);
    }

    #[test]
    fn momentum_zero_base_is_undefined() {
        let m = momentum(&[0.0, 100.0, 110.0], 2);
        assert_eq!(m[2], None);
    }

    #[test]
    fn volatility_needs_full_window_of_returns() {
        let returns = daily_returns(&[100.0, 101.0, 99.0, 102.0, 100.0]);
        let v = rolling_volatility(&returns, 3);
        // returns defined from index 1, so three of them exist at index 3
        assert!(v[..3].iter().all(Option::is_none));
        let window: Vec<f64> = returns[1..=3].iter().map(|r| r.unwrap()).collect();
        assert_relative_eq!(v[3].unwrap(), sample_std(&window).unwrap());
        assert!(v[4].is_some());
    }

    #[test]
    fn volatility_of_constant_returns_is_zero() {
        let returns = vec![None, Some(0.01), Some(0.01), Some(0.01)];
        let v = rolling_volatility(&returns, 3);
        assert_relative_eq!(v[3].unwrap(), 0.0);
    }

    #[test]
    fn record_requires_every_factor() {
        let windows = SignalWindows {
            short_window: 2,
            long_window: 4,
            vol_window: 2,
        };
        let series = make_series("AAA", &[10.0, 11.0, 12.0, 11.0, 13.0, 14.0]);
        let signals = compute_signals(&series, &windows);

        let d = |i: i64| NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + chrono::Duration::days(i);
        assert!(signals.record_on(d(3)).is_none());
        let rec = signals.record_on(d(4)).unwrap();
        assert_eq!(rec.code, "AAA");
        assert_relative_eq!(rec.long_momentum, 0.3);
        assert_relative_eq!(rec.short_momentum, (13.0 - 12.0) / 12.0);
        assert_relative_eq!(rec.value(Factor::LongMomentum), rec.long_momentum);
        assert!(signals.record_on(d(40)).is_none());
    }

    #[test]
    fn table_cross_section_is_ordered_and_complete() {
        let windows = SignalWindows {
            short_window: 1,
            long_window: 2,
            vol_window: 2,
        };
        let panel = PricePanel::new(vec![
            make_series("ZZZ", &[10.0, 11.0, 12.0, 13.0]),
            make_series("AAA", &[10.0, 9.0, 11.0, 10.0]),
            make_series("MMM", &[10.0, 11.0]),
        ])
        .unwrap();
        let table = SignalTable::compute(&panel, &windows);

        let date = NaiveDate::from_ymd_opt(2024, 1, 3).unwrap();
        let section = table.cross_section(date);
        let codes: Vec<&str> = section.iter().map(|r| r.code.as_str()).collect();
        assert_eq!(codes, vec!["AAA", "ZZZ"]);

        assert_relative_eq!(
            table.daily_return("AAA", date).unwrap(),
            (11.0 - 9.0) / 9.0
        );
        assert_eq!(table.daily_return("MMM", date), None);
        assert_eq!(table.instruments().count(), 3);
    }

    #[test]
    fn factor_display() {
        assert_eq!(Factor::Volatility.to_string(), "volatility");
        assert_eq!(Factor::ALL.len(), 3);
        assert_eq!(SignalWindows::default().long_window, 60);
    }
}
