//! CSV file data adapters.
//!
//! Prices come from one long-format file with a header row
//! (`Date,Ticker,Open,High,Low,Close,Volume`, column names case-insensitive).
//! Constituent windows and risk-free observations are separate optional files.

use crate::domain::error::FactorlabError;
use crate::domain::ohlcv::OhlcvBar;
use crate::domain::universe::ConstituentWindows;
use crate::ports::data_port::{DataPort, ReferenceDataPort};
use chrono::NaiveDate;
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

const DATE_FORMATS: [&str; 2] = ["%Y-%m-%d", "%Y/%m/%d"];

/// Parses `YYYY-MM-DD` or `YYYY/MM/DD`, ignoring any time-of-day suffix.
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let trimmed = value.trim();
    let head = trimmed.get(..10).unwrap_or(trimmed);
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(head, fmt).ok())
}

fn read_file(path: &Path) -> Result<String, FactorlabError> {
    fs::read_to_string(path).map_err(|e| FactorlabError::Data {
        reason: format!("failed to read {}: {}", path.display(), e),
    })
}

/// Index of the first header matching one of `names`.
fn column(headers: &csv::StringRecord, names: &[&str]) -> Option<usize> {
    headers
        .iter()
        .position(|h| names.iter().any(|n| h.trim().eq_ignore_ascii_case(n)))
}

fn required_column(
    headers: &csv::StringRecord,
    names: &[&str],
    path: &Path,
) -> Result<usize, FactorlabError> {
    column(headers, names).ok_or_else(|| FactorlabError::Data {
        reason: format!("{}: missing {} column", path.display(), names[0]),
    })
}

fn parse_price(value: &str, field: &str, line: u64) -> Result<f64, FactorlabError> {
    value.trim().parse::<f64>().map_err(|e| FactorlabError::Data {
        reason: format!("line {}: invalid {} value '{}': {}", line, field, value, e),
    })
}

/// Volumes are sometimes exported as floats ("1200.0").
fn parse_volume(value: &str, line: u64) -> Result<i64, FactorlabError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Ok(0);
    }
    trimmed
        .parse::<i64>()
        .or_else(|_| trimmed.parse::<f64>().map(|v| v.round() as i64))
        .map_err(|e| FactorlabError::Data {
            reason: format!("line {}: invalid volume value '{}': {}", line, value, e),
        })
}

struct PanelColumns {
    date: usize,
    ticker: usize,
    open: Option<usize>,
    high: Option<usize>,
    low: Option<usize>,
    close: usize,
    volume: Option<usize>,
}

pub struct CsvAdapter {
    panel_path: PathBuf,
}

impl CsvAdapter {
    pub fn new(panel_path: PathBuf) -> Self {
        Self { panel_path }
    }

    fn columns(&self, headers: &csv::StringRecord) -> Result<PanelColumns, FactorlabError> {
        let path = self.panel_path.as_path();
        Ok(PanelColumns {
            date: required_column(headers, &["date"], path)?,
            ticker: required_column(headers, &["ticker", "symbol", "code"], path)?,
            open: column(headers, &["open"]),
            high: column(headers, &["high"]),
            low: column(headers, &["low"]),
            close: required_column(headers, &["close", "adj close", "adj_close"], path)?,
            volume: column(headers, &["volume"]),
        })
    }

    /// Reads every row. Rows without a close are missing observations and
    /// are skipped; malformed values are errors.
    fn read_all(&self) -> Result<Vec<OhlcvBar>, FactorlabError> {
        let content = read_file(&self.panel_path)?;
        let mut rdr = csv::Reader::from_reader(content.as_bytes());
        let headers = rdr
            .headers()
            .map_err(|e| FactorlabError::Data {
                reason: format!("CSV parse error: {}", e),
            })?
            .clone();
        let cols = self.columns(&headers)?;

        let mut bars = Vec::new();
        let mut skipped = 0usize;

        for result in rdr.records() {
            let record = result.map_err(|e| FactorlabError::Data {
                reason: format!("CSV parse error: {}", e),
            })?;
            let line = record.position().map(|p| p.line()).unwrap_or(0);
            let field = |i: usize| record.get(i).unwrap_or("").trim();

            let close_str = field(cols.close);
            if close_str.is_empty() {
                skipped += 1;
                continue;
            }
            let close = parse_price(close_str, "close", line)?;

            let date = parse_date(field(cols.date)).ok_or_else(|| FactorlabError::Data {
                reason: format!("line {}: invalid date '{}'", line, field(cols.date)),
            })?;
            let code = field(cols.ticker).to_uppercase();
            if code.is_empty() {
                return Err(FactorlabError::Data {
                    reason: format!("line {}: missing ticker", line),
                });
            }

            let price_or_close = |col: Option<usize>, name: &str| -> Result<f64, FactorlabError> {
                match col.map(|i| field(i)) {
                    Some(s) if !s.is_empty() => parse_price(s, name, line),
                    _ => Ok(close),
                }
            };

            bars.push(OhlcvBar {
                code,
                date,
                open: price_or_close(cols.open, "open")?,
                high: price_or_close(cols.high, "high")?,
                low: price_or_close(cols.low, "low")?,
                close,
                volume: match cols.volume {
                    Some(i) => parse_volume(field(i), line)?,
                    None => 0,
                },
            });
        }

        if skipped > 0 {
            tracing::debug!(skipped, path = %self.panel_path.display(), "rows without a close skipped");
        }

        bars.sort_by(|a, b| a.code.cmp(&b.code).then(a.date.cmp(&b.date)));
        Ok(bars)
    }
}

impl DataPort for CsvAdapter {
    fn fetch_bars(
        &self,
        codes: Option<&[String]>,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> Result<Vec<OhlcvBar>, FactorlabError> {
        let wanted: Option<HashSet<&str>> =
            codes.map(|c| c.iter().map(|s| s.as_str()).collect());

        let bars: Vec<OhlcvBar> = self
            .read_all()?
            .into_iter()
            .filter(|b| wanted.as_ref().is_none_or(|w| w.contains(b.code.as_str())))
            .filter(|b| start_date.is_none_or(|s| b.date >= s))
            .filter(|b| end_date.is_none_or(|e| b.date <= e))
            .collect();

        tracing::info!(
            bars = bars.len(),
            path = %self.panel_path.display(),
            "loaded price panel"
        );
        Ok(bars)
    }

    fn list_symbols(&self) -> Result<Vec<String>, FactorlabError> {
        let mut symbols: Vec<String> = self.read_all()?.into_iter().map(|b| b.code).collect();
        symbols.dedup();
        Ok(symbols)
    }

    fn get_data_range(
        &self,
        code: &str,
    ) -> Result<Option<(NaiveDate, NaiveDate, usize)>, FactorlabError> {
        let code = code.to_uppercase();
        let dates: Vec<NaiveDate> = self
            .read_all()?
            .into_iter()
            .filter(|b| b.code == code)
            .map(|b| b.date)
            .collect();
        Ok(match (dates.first(), dates.last()) {
            (Some(&first), Some(&last)) => Some((first, last, dates.len())),
            _ => None,
        })
    }
}

/// Constituent windows (`symbol,start_date,end_date`, either date may be
/// blank) and risk-free observations (`date,value` in percent; FRED exports
/// use "." for a missing value).
#[derive(Debug, Clone, Default)]
pub struct CsvReferenceAdapter {
    constituents_path: Option<PathBuf>,
    risk_free_path: Option<PathBuf>,
}

impl CsvReferenceAdapter {
    pub fn new(constituents_path: Option<PathBuf>, risk_free_path: Option<PathBuf>) -> Self {
        Self {
            constituents_path,
            risk_free_path,
        }
    }
}

impl ReferenceDataPort for CsvReferenceAdapter {
    fn constituent_windows(&self) -> Result<ConstituentWindows, FactorlabError> {
        let mut windows = ConstituentWindows::new();
        let Some(path) = &self.constituents_path else {
            return Ok(windows);
        };

        let content = read_file(path)?;
        let mut rdr = csv::Reader::from_reader(content.as_bytes());
        let headers = rdr
            .headers()
            .map_err(|e| FactorlabError::Data {
                reason: format!("CSV parse error: {}", e),
            })?
            .clone();
        let symbol_col = required_column(&headers, &["symbol", "ticker", "code"], path)?;
        let start_col = column(&headers, &["start_date", "start", "added"]);
        let end_col = column(&headers, &["end_date", "end", "removed"]);

        let optional_date = |record: &csv::StringRecord, col: Option<usize>, line: u64| {
            match col.and_then(|i| record.get(i)).map(str::trim) {
                None | Some("") => Ok(None),
                Some(s) => parse_date(s).map(Some).ok_or_else(|| FactorlabError::Data {
                    reason: format!("{} line {}: invalid date '{}'", path.display(), line, s),
                }),
            }
        };

        for result in rdr.records() {
            let record = result.map_err(|e| FactorlabError::Data {
                reason: format!("CSV parse error: {}", e),
            })?;
            let line = record.position().map(|p| p.line()).unwrap_or(0);
            let symbol = record.get(symbol_col).unwrap_or("").trim().to_uppercase();
            if symbol.is_empty() {
                continue;
            }
            let start = optional_date(&record, start_col, line)?;
            let end = optional_date(&record, end_col, line)?;
            windows.add_window(&symbol, start, end)?;
        }

        tracing::info!(
            listed = windows.listed_count(),
            path = %path.display(),
            "loaded constituent windows"
        );
        Ok(windows)
    }

    fn risk_free_observations(&self) -> Result<Vec<(NaiveDate, f64)>, FactorlabError> {
        let Some(path) = &self.risk_free_path else {
            return Ok(Vec::new());
        };

        let content = read_file(path)?;
        let mut rdr = csv::Reader::from_reader(content.as_bytes());
        // last value per date wins
        let mut observations: BTreeMap<NaiveDate, f64> = BTreeMap::new();

        for result in rdr.records() {
            let record = result.map_err(|e| FactorlabError::Data {
                reason: format!("CSV parse error: {}", e),
            })?;
            let line = record.position().map(|p| p.line()).unwrap_or(0);
            let (Some(date_str), Some(value_str)) = (record.get(0), record.get(1)) else {
                continue;
            };
            let value_str = value_str.trim();
            if value_str.is_empty() || value_str == "." {
                continue;
            }
            let date = parse_date(date_str).ok_or_else(|| FactorlabError::Data {
                reason: format!("{} line {}: invalid date '{}'", path.display(), line, date_str),
            })?;
            let value = parse_price(value_str, "rate", line)?;
            observations.insert(date, value);
        }

        Ok(observations.into_iter().collect())
    }
}
