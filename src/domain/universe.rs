//! Universe selection: which instruments may enter the ranked population.
//!
//! Two separate concerns live here. [`UniverseFilter`] answers point-in-time
//! eligibility (index membership windows, for survivorship correction).
//! [`screen_panel`] drops instruments that can never produce a complete factor
//! record before the run starts.

use crate::domain::error::FactorlabError;
use crate::domain::panel::{InstrumentSeries, PricePanel};
use chrono::NaiveDate;
use std::collections::{BTreeMap, HashSet};

/// Point-in-time eligibility of an instrument.
pub trait UniverseFilter: Send + Sync {
    fn is_eligible(&self, code: &str, date: NaiveDate) -> bool;
}

/// Every instrument is always eligible.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllInstruments;

impl UniverseFilter for AllInstruments {
    fn is_eligible(&self, _code: &str, _date: NaiveDate) -> bool {
        true
    }
}

/// Inclusive membership window; an open bound is unbounded on that side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MembershipWindow {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl MembershipWindow {
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start.is_none_or(|s| date >= s) && self.end.is_none_or(|e| date <= e)
    }
}

/// Index membership history. Instruments with no recorded window are
/// unrestricted; listed instruments are eligible only inside a window.
#[derive(Debug, Clone, Default)]
pub struct ConstituentWindows {
    windows: BTreeMap<String, Vec<MembershipWindow>>,
}

impl ConstituentWindows {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_window(
        &mut self,
        code: &str,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<(), FactorlabError> {
        if let (Some(s), Some(e)) = (start, end) {
            if e < s {
                return Err(FactorlabError::Data {
                    reason: format!("constituent window for {} ends ({}) before it starts ({})", code, e, s),
                });
            }
        }
        self.windows
            .entry(code.to_string())
            .or_default()
            .push(MembershipWindow { start, end });
        Ok(())
    }

    pub fn windows(&self, code: &str) -> Option<&[MembershipWindow]> {
        self.windows.get(code).map(|w| w.as_slice())
    }

    pub fn listed_count(&self) -> usize {
        self.windows.len()
    }
}

impl UniverseFilter for ConstituentWindows {
    fn is_eligible(&self, code: &str, date: NaiveDate) -> bool {
        match self.windows.get(code) {
            None => true,
            Some(windows) => windows.iter().any(|w| w.contains(date)),
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum UniverseError {
    #[error("empty token in code list")]
    EmptyToken,

    #[error("duplicate code: {0}")]
    DuplicateCode(String),
}

/// Parses a comma-separated instrument list, upper-casing each code.
pub fn parse_codes(input: &str) -> Result<Vec<String>, UniverseError> {
    let mut codes = Vec::new();
    let mut seen = HashSet::new();

    for token in input.split(',') {
        let trimmed = token.trim();
        if trimmed.is_empty() {
            return Err(UniverseError::EmptyToken);
        }
        let code = trimmed.to_uppercase();
        if !seen.insert(code.clone()) {
            return Err(UniverseError::DuplicateCode(code));
        }
        codes.push(code);
    }

    Ok(codes)
}

#[derive(Debug, Clone, PartialEq)]
pub struct SkippedCode {
    pub code: String,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    NotRequested,
    InsufficientBars { bars: usize, minimum: usize },
}

#[derive(Debug)]
pub struct ScreenedPanel {
    pub panel: PricePanel,
    pub skipped: Vec<SkippedCode>,
}

/// Keeps instruments that are requested (all when `codes` is `None`) and have
/// more than `min_bars` bars. Fails when nothing survives.
pub fn screen_panel(
    panel: &PricePanel,
    codes: Option<&[String]>,
    min_bars: usize,
) -> Result<ScreenedPanel, FactorlabError> {
    let requested: Option<HashSet<&str>> =
        codes.map(|c| c.iter().map(|s| s.as_str()).collect());
    let mut kept: Vec<InstrumentSeries> = Vec::new();
    let mut skipped = Vec::new();

    for series in panel.instruments() {
        if requested.as_ref().is_some_and(|r| !r.contains(series.code.as_str())) {
            skipped.push(SkippedCode {
                code: series.code.clone(),
                reason: SkipReason::NotRequested,
            });
            continue;
        }
        if series.bar_count() <= min_bars {
            tracing::warn!(
                code = %series.code,
                bars = series.bar_count(),
                minimum = min_bars + 1,
                "skipping instrument with too few bars"
            );
            skipped.push(SkippedCode {
                code: series.code.clone(),
                reason: SkipReason::InsufficientBars {
                    bars: series.bar_count(),
                    minimum: min_bars + 1,
                },
            });
            continue;
        }
        kept.push(series.clone());
    }

    if kept.is_empty() {
        return Err(FactorlabError::NoData {
            code: "all".to_string(),
        });
    }

    Ok(ScreenedPanel {
        panel: PricePanel::new(kept)?,
        skipped,
    })
}
