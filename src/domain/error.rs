//! Domain error types.
//!
//! [`FactorlabError`] covers failures that abort a run. Conditions that only
//! affect a single rebalance period are [`PeriodIssue`]s: they are recorded in
//! the period ledger and the run continues.

use chrono::NaiveDate;

use super::calendar::PeriodKey;
use super::signal::Factor;

/// Top-level error type for factorlab.
#[derive(Debug, thiserror::Error)]
pub enum FactorlabError {
    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("data error: {reason}")]
    Data { reason: String },

    #[error("database error: {reason}")]
    Database { reason: String },

    #[error("invalid price panel for {code}: {reason}")]
    InvalidPanel { code: String, reason: String },

    #[error("no data for {code}")]
    NoData { code: String },

    #[error("backtest produced no valid periods ({periods} rebalance periods examined)")]
    EmptyResultSet { periods: usize },

    #[error("strategy and benchmark series share no dates")]
    NoOverlap,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<&FactorlabError> for std::process::ExitCode {
    fn from(err: &FactorlabError) -> Self {
        let code: u8 = match err {
            FactorlabError::Io(_) => 1,
            FactorlabError::ConfigParse { .. }
            | FactorlabError::ConfigMissing { .. }
            | FactorlabError::ConfigInvalid { .. } => 2,
            FactorlabError::Data { .. }
            | FactorlabError::Database { .. }
            | FactorlabError::InvalidPanel { .. }
            | FactorlabError::NoData { .. } => 3,
            FactorlabError::EmptyResultSet { .. } | FactorlabError::NoOverlap => 5,
        };
        std::process::ExitCode::from(code)
    }
}

/// A recoverable, period-local condition.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PeriodIssue {
    #[error("insufficient data on {date}: {population} instruments, need {minimum}")]
    InsufficientData {
        date: NaiveDate,
        population: usize,
        minimum: usize,
    },

    #[error("degenerate factor {factor} on {date}: zero cross-sectional dispersion")]
    DegenerateFactor { date: NaiveDate, factor: Factor },

    #[error("every weighted factor is degenerate on {date}")]
    AllFactorsDegenerate { date: NaiveDate },

    #[error("no trading days in forward period {period}")]
    MissingForwardData { period: PeriodKey },
}

impl PeriodIssue {
    /// Whether the issue prevented the period from contributing returns.
    pub fn skips_period(&self) -> bool {
        !matches!(self, PeriodIssue::DegenerateFactor { .. })
    }
}
