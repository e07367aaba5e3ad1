#![allow(dead_code)]

use chrono::{Datelike, NaiveDate, Weekday};
use factorlab::domain::backtest::BacktestConfig;
use factorlab::domain::error::FactorlabError;
pub use factorlab::domain::ohlcv::OhlcvBar;
use factorlab::domain::ranker::RankerConfig;
use factorlab::domain::signal::{FactorRecord, SignalWindows};
use factorlab::domain::universe::ConstituentWindows;
use factorlab::ports::data_port::{DataPort, ReferenceDataPort};
use std::collections::BTreeMap;

pub struct MockDataPort {
    pub data: BTreeMap<String, Vec<OhlcvBar>>,
    pub error: Option<String>,
}

impl MockDataPort {
    pub fn new() -> Self {
        Self {
            data: BTreeMap::new(),
            error: None,
        }
    }

    pub fn with_bars(mut self, bars: Vec<OhlcvBar>) -> Self {
        for bar in bars {
            self.data.entry(bar.code.clone()).or_default().push(bar);
        }
        self
    }

    pub fn with_error(mut self, reason: &str) -> Self {
        self.error = Some(reason.to_string());
        self
    }

    fn check(&self) -> Result<(), FactorlabError> {
        match &self.error {
            Some(reason) => Err(FactorlabError::Database {
                reason: reason.clone(),
            }),
            None => Ok(()),
        }
    }
}

impl DataPort for MockDataPort {
    fn fetch_bars(
        &self,
        codes: Option<&[String]>,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> Result<Vec<OhlcvBar>, FactorlabError> {
        self.check()?;
        Ok(self
            .data
            .iter()
            .filter(|(code, _)| codes.is_none_or(|c| c.contains(code)))
            .flat_map(|(_, bars)| bars.iter().cloned())
            .filter(|b| start_date.is_none_or(|s| b.date >= s))
            .filter(|b| end_date.is_none_or(|e| b.date <= e))
            .collect())
    }

    fn list_symbols(&self) -> Result<Vec<String>, FactorlabError> {
        self.check()?;
        Ok(self.data.keys().cloned().collect())
    }

    fn get_data_range(
        &self,
        code: &str,
    ) -> Result<Option<(NaiveDate, NaiveDate, usize)>, FactorlabError> {
        self.check()?;
        match self.data.get(code) {
            Some(bars) if !bars.is_empty() => {
                let min = bars.iter().map(|b| b.date).min().unwrap();
                let max = bars.iter().map(|b| b.date).max().unwrap();
                Ok(Some((min, max, bars.len())))
            }
            _ => Ok(None),
        }
    }
}

#[derive(Default)]
pub struct MockReferenceDataPort {
    pub windows: ConstituentWindows,
    pub risk_free: Vec<(NaiveDate, f64)>,
    pub fail_risk_free: bool,
}

impl ReferenceDataPort for MockReferenceDataPort {
    fn constituent_windows(&self) -> Result<ConstituentWindows, FactorlabError> {
        Ok(self.windows.clone())
    }

    fn risk_free_observations(&self) -> Result<Vec<(NaiveDate, f64)>, FactorlabError> {
        if self.fail_risk_free {
            return Err(FactorlabError::Data {
                reason: "risk-free source unavailable".into(),
            });
        }
        Ok(self.risk_free.clone())
    }
}

pub fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

pub fn make_bar(code: &str, date: NaiveDate, close: f64) -> OhlcvBar {
    OhlcvBar {
        code: code.to_string(),
        date,
        open: close,
        high: close,
        low: close,
        close,
        volume: 1000,
    }
}

/// The first `n` weekdays on or after `start`.
pub fn weekdays(start: NaiveDate, n: usize) -> Vec<NaiveDate> {
    let mut days = Vec::with_capacity(n);
    let mut d = start;
    while days.len() < n {
        if !matches!(d.weekday(), Weekday::Sat | Weekday::Sun) {
            days.push(d);
        }
        d = d.succ_opt().unwrap();
    }
    days
}

/// Bars for `instruments` names over `days`. Name `k` drifts by
/// `0.001 * (k - instruments / 2)` per day with a small deterministic wobble,
/// so momentum ranks track the index.
pub fn trending_bars(instruments: usize, days: &[NaiveDate]) -> Vec<OhlcvBar> {
    let mut bars = Vec::with_capacity(instruments * days.len());
    for k in 0..instruments {
        let code = format!("S{:03}", k);
        let mut close = 100.0;
        for (t, &d) in days.iter().enumerate() {
            let drift = 0.001 * (k as f64 - instruments as f64 / 2.0);
            let wobble = 0.004 * ((t * 7 + k * 13) % 5) as f64 - 0.008;
            close *= 1.0 + drift + wobble;
            bars.push(make_bar(&code, d, close));
        }
    }
    bars
}

pub fn record(code: &str, date: NaiveDate, momentum: f64) -> FactorRecord {
    FactorRecord {
        code: code.to_string(),
        date,
        short_momentum: momentum,
        long_momentum: momentum,
        volatility: 0.02,
    }
}

/// Short windows and a small population so a few months of bars rank.
pub fn small_config() -> BacktestConfig {
    BacktestConfig {
        windows: SignalWindows {
            short_window: 2,
            long_window: 5,
            vol_window: 3,
        },
        ranker: RankerConfig {
            selection_percentile: 0.25,
            min_population: 4,
            ..RankerConfig::default()
        },
        ..BacktestConfig::default()
    }
}

pub const SMALL_INI: &str = "\
[data]
panel = panel.csv

[backtest]
rebalance = monthly
transaction_cost_rate = 0.001

[strategy]
short_window = 2
long_window = 5
vol_window = 3
selection_percentile = 0.25
min_population = 4
";

/// Writes `bars` as a long-format panel CSV.
pub fn write_panel_csv(path: &std::path::Path, bars: &[OhlcvBar]) {
    let mut out = String::from("date,ticker,open,high,low,close,volume\n");
    for b in bars {
        out.push_str(&format!(
            "{},{},{},{},{},{},{}\n",
            b.date, b.code, b.open, b.high, b.low, b.close, b.volume
        ));
    }
    std::fs::write(path, out).unwrap();
}
