//! Report output port trait.

use crate::domain::backtest::BacktestResult;
use crate::domain::error::FactorlabError;
use crate::domain::metrics::PerformanceSummary;
use std::path::Path;

/// Port for writing backtest output.
pub trait ReportPort {
    /// Daily returns and growth curves over the analyzed dates.
    fn write_returns(
        &self,
        summary: &PerformanceSummary,
        result: &BacktestResult,
        output_path: &Path,
    ) -> Result<(), FactorlabError>;

    /// One row per examined rebalance period.
    fn write_periods(&self, result: &BacktestResult, output_path: &Path)
        -> Result<(), FactorlabError>;
}
