//! Configuration validation.
//!
//! Validates every config field before a backtest runs. Optional keys are only
//! checked when present; numeric keys that do not parse are rejected instead
//! of silently falling back to their defaults.

use crate::domain::aggregator::ShortLeg;
use crate::domain::calendar::RebalanceFrequency;
use crate::domain::error::FactorlabError;
use crate::domain::universe::parse_codes;
use crate::ports::config_port::ConfigPort;
use chrono::NaiveDate;

pub fn validate_data_config(config: &dyn ConfigPort) -> Result<(), FactorlabError> {
    validate_panel_path(config)?;
    validate_codes(config)?;
    Ok(())
}

pub fn validate_backtest_config(config: &dyn ConfigPort) -> Result<(), FactorlabError> {
    validate_dates(config)?;
    validate_rebalance(config)?;
    validate_short_leg(config)?;
    validate_transaction_cost(config)?;
    validate_trading_days(config)?;
    Ok(())
}

pub fn validate_strategy_config(config: &dyn ConfigPort) -> Result<(), FactorlabError> {
    validate_windows(config)?;
    validate_selection_percentile(config)?;
    validate_min_population(config)?;
    validate_weights(config)?;
    Ok(())
}

pub fn validate_all(config: &dyn ConfigPort) -> Result<(), FactorlabError> {
    validate_data_config(config)?;
    validate_backtest_config(config)?;
    validate_strategy_config(config)?;
    Ok(())
}

fn invalid(section: &str, key: &str, reason: impl Into<String>) -> FactorlabError {
    FactorlabError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.into(),
    }
}

/// The value of an optional numeric key, or `default` when absent.
pub fn read_double(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: f64,
) -> Result<f64, FactorlabError> {
    match config.get_string(section, key) {
        None => Ok(default),
        Some(s) => s
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| invalid(section, key, format!("'{}' is not a number", s))),
    }
}

pub fn read_int(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: i64,
) -> Result<i64, FactorlabError> {
    match config.get_string(section, key) {
        None => Ok(default),
        Some(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| invalid(section, key, format!("'{}' is not an integer", s))),
    }
}

/// Parses an optional `YYYY-MM-DD` date key.
pub fn read_date(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
) -> Result<Option<NaiveDate>, FactorlabError> {
    match config.get_string(section, key) {
        Some(s) if !s.trim().is_empty() => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
            .map(Some)
            .map_err(|_| invalid(section, key, format!("invalid {} format, expected YYYY-MM-DD", key))),
        _ => Ok(None),
    }
}

fn require(config: &dyn ConfigPort, section: &str, key: &str) -> Result<(), FactorlabError> {
    match config.get_string(section, key) {
        Some(s) if !s.trim().is_empty() => Ok(()),
        _ => Err(FactorlabError::ConfigMissing {
            section: section.to_string(),
            key: key.to_string(),
        }),
    }
}

/// The CSV source needs `[data] panel`; the SQLite source needs `[sqlite] path`.
fn validate_panel_path(config: &dyn ConfigPort) -> Result<(), FactorlabError> {
    let source = config
        .get_string("data", "source")
        .map(|s| s.trim().to_lowercase())
        .unwrap_or_else(|| "csv".to_string());
    match source.as_str() {
        "csv" => require(config, "data", "panel"),
        "sqlite" => require(config, "sqlite", "path"),
        other => Err(invalid(
            "data",
            "source",
            format!("unknown source '{}', expected csv or sqlite", other),
        )),
    }
}

fn validate_codes(config: &dyn ConfigPort) -> Result<(), FactorlabError> {
    match config.get_string("data", "codes") {
        Some(s) if !s.trim().is_empty() => parse_codes(&s)
            .map(|_| ())
            .map_err(|e| invalid("data", "codes", e.to_string())),
        _ => Ok(()),
    }
}

fn validate_dates(config: &dyn ConfigPort) -> Result<(), FactorlabError> {
    let start = read_date(config, "backtest", "start_date")?;
    let end = read_date(config, "backtest", "end_date")?;

    if let (Some(s), Some(e)) = (start, end) {
        if s >= e {
            return Err(invalid("backtest", "start_date", "start_date must be before end_date"));
        }
    }
    Ok(())
}

fn validate_rebalance(config: &dyn ConfigPort) -> Result<(), FactorlabError> {
    if let Some(s) = config.get_string("backtest", "rebalance") {
        s.parse::<RebalanceFrequency>()
            .map_err(|e| invalid("backtest", "rebalance", e))?;
    }
    Ok(())
}

fn validate_short_leg(config: &dyn ConfigPort) -> Result<(), FactorlabError> {
    if let Some(s) = config.get_string("backtest", "short_leg") {
        s.parse::<ShortLeg>()
            .map_err(|e| invalid("backtest", "short_leg", e))?;
    }
    Ok(())
}

fn validate_transaction_cost(config: &dyn ConfigPort) -> Result<(), FactorlabError> {
    let value = read_double(config, "backtest", "transaction_cost_rate", 0.001)?;
    if !(0.0..1.0).contains(&value) {
        return Err(invalid(
            "backtest",
            "transaction_cost_rate",
            "transaction_cost_rate must be in [0, 1)",
        ));
    }
    Ok(())
}

fn validate_trading_days(config: &dyn ConfigPort) -> Result<(), FactorlabError> {
    let value = read_double(config, "backtest", "trading_days_per_year", 252.0)?;
    if value <= 0.0 {
        return Err(invalid(
            "backtest",
            "trading_days_per_year",
            "trading_days_per_year must be positive",
        ));
    }
    Ok(())
}

fn validate_windows(config: &dyn ConfigPort) -> Result<(), FactorlabError> {
    for (key, default) in [("short_window", 20), ("long_window", 60)] {
        if read_int(config, "strategy", key, default)? < 1 {
            return Err(invalid("strategy", key, format!("{} must be at least 1", key)));
        }
    }
    // a sample standard deviation needs two returns
    if read_int(config, "strategy", "vol_window", 20)? < 2 {
        return Err(invalid("strategy", "vol_window", "vol_window must be at least 2"));
    }
    Ok(())
}

fn validate_selection_percentile(config: &dyn ConfigPort) -> Result<(), FactorlabError> {
    let value = read_double(config, "strategy", "selection_percentile", 0.10)?;
    if value <= 0.0 || value >= 1.0 {
        return Err(invalid(
            "strategy",
            "selection_percentile",
            "selection_percentile must be in (0, 1)",
        ));
    }
    Ok(())
}

fn validate_min_population(config: &dyn ConfigPort) -> Result<(), FactorlabError> {
    if read_int(config, "strategy", "min_population", 50)? < 1 {
        return Err(invalid(
            "strategy",
            "min_population",
            "min_population must be at least 1",
        ));
    }
    Ok(())
}

fn validate_weights(config: &dyn ConfigPort) -> Result<(), FactorlabError> {
    let weights = [
        read_double(config, "strategy", "weight_short_momentum", 1.0)?,
        read_double(config, "strategy", "weight_long_momentum", 1.0)?,
        read_double(config, "strategy", "weight_volatility", -1.0)?,
    ];
    if weights.iter().all(|w| *w == 0.0) {
        return Err(invalid(
            "strategy",
            "weight_short_momentum",
            "at least one factor weight must be non-zero",
        ));
    }
    Ok(())
}
