//! Data access port traits.

use crate::domain::error::FactorlabError;
use crate::domain::ohlcv::OhlcvBar;
use crate::domain::universe::ConstituentWindows;
use chrono::NaiveDate;

/// Source of the daily price panel.
pub trait DataPort {
    /// Bars for every instrument (or only `codes`) within `[start, end]`,
    /// sorted by instrument then date.
    fn fetch_bars(
        &self,
        codes: Option<&[String]>,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> Result<Vec<OhlcvBar>, FactorlabError>;

    fn list_symbols(&self) -> Result<Vec<String>, FactorlabError>;

    /// First date, last date and bar count for one instrument.
    fn get_data_range(
        &self,
        code: &str,
    ) -> Result<Option<(NaiveDate, NaiveDate, usize)>, FactorlabError>;
}

/// Reference data consumed alongside prices. Both sources are optional; an
/// adapter without them returns empty values.
pub trait ReferenceDataPort {
    fn constituent_windows(&self) -> Result<ConstituentWindows, FactorlabError>;

    /// Annualized percent observations, e.g. a one-year treasury yield.
    fn risk_free_observations(&self) -> Result<Vec<(NaiveDate, f64)>, FactorlabError>;
}
