//! Price panel: per-instrument OHLCV series and the unified trading-day timeline.

use crate::domain::error::FactorlabError;
use crate::domain::ohlcv::OhlcvBar;
use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet, HashMap};

#[derive(Debug, Clone)]
pub struct InstrumentSeries {
    pub code: String,
    pub bars: Vec<OhlcvBar>,
    pub date_index: HashMap<NaiveDate, usize>,
}

impl InstrumentSeries {
    /// Builds the series, rejecting dates that are not strictly increasing.
    pub fn new(code: String, bars: Vec<OhlcvBar>) -> Result<Self, FactorlabError> {
        for pair in bars.windows(2) {
            if pair[1].date <= pair[0].date {
                let reason = if pair[1].date == pair[0].date {
                    format!("duplicate date {}", pair[1].date)
                } else {
                    format!("date {} follows {}", pair[1].date, pair[0].date)
                };
                return Err(FactorlabError::InvalidPanel { code, reason });
            }
        }

        let date_index = bars
            .iter()
            .enumerate()
            .map(|(i, bar)| (bar.date, i))
            .collect();
        Ok(Self {
            code,
            bars,
            date_index,
        })
    }

    pub fn bar_count(&self) -> usize {
        self.bars.len()
    }

}

/// Immutable input to a backtest run.
#[derive(Debug, Clone, Default)]
pub struct PricePanel {
    instruments: BTreeMap<String, InstrumentSeries>,
    timeline: Vec<NaiveDate>,
}

impl PricePanel {
    pub fn new(series: Vec<InstrumentSeries>) -> Result<Self, FactorlabError> {
        let timeline = build_unified_timeline(&series);
        let mut instruments = BTreeMap::new();
        for s in series {
            if instruments.contains_key(&s.code) {
                return Err(FactorlabError::InvalidPanel {
                    code: s.code,
                    reason: "instrument appears more than once".into(),
                });
            }
            instruments.insert(s.code.clone(), s);
        }
        Ok(Self {
            instruments,
            timeline,
        })
    }

    /// Groups a flat bar list by instrument. Bars of one instrument must
    /// already be in ascending date order.
    pub fn from_bars(bars: Vec<OhlcvBar>) -> Result<Self, FactorlabError> {
        let mut grouped: BTreeMap<String, Vec<OhlcvBar>> = BTreeMap::new();
        for bar in bars {
            grouped.entry(bar.code.clone()).or_default().push(bar);
        }
        let series = grouped
            .into_iter()
            .map(|(code, bars)| InstrumentSeries::new(code, bars))
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(series)
    }

    pub fn get(&self, code: &str) -> Option<&InstrumentSeries> {
        self.instruments.get(code)
    }

    /// Instruments in identifier order.
    pub fn instruments(&self) -> impl Iterator<Item = &InstrumentSeries> {
        self.instruments.values()
    }

    pub fn codes(&self) -> Vec<String> {
        self.instruments.keys().cloned().collect()
    }

    pub fn timeline(&self) -> &[NaiveDate] {
        &self.timeline
    }

    pub fn instrument_count(&self) -> usize {
        self.instruments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instruments.is_empty()
    }
}

pub fn build_unified_timeline(series: &[InstrumentSeries]) -> Vec<NaiveDate> {
    let unique_dates: BTreeSet<NaiveDate> = series
        .iter()
        .flat_map(|s| s.bars.iter().map(|bar| bar.date))
        .collect();
    unique_dates.into_iter().collect()
}
