//! CSV report adapter implementing ReportPort.
//!
//! The returns file has one row per analyzed trading day; the periods file
//! has one row per examined rebalance period.

use crate::domain::backtest::BacktestResult;
use crate::domain::error::FactorlabError;
use crate::domain::metrics::PerformanceSummary;
use crate::ports::report_port::ReportPort;
use std::fs::File;
use std::path::Path;

pub struct CsvReportAdapter;

impl CsvReportAdapter {
    pub fn new() -> Self {
        Self
    }
}

impl Default for CsvReportAdapter {
    fn default() -> Self {
        Self::new()
    }
}

fn csv_error(path: &Path, e: csv::Error) -> FactorlabError {
    FactorlabError::Data {
        reason: format!("failed to write {}: {}", path.display(), e),
    }
}

fn format_value(value: Option<f64>) -> String {
    value.map(|v| format!("{:.10}", v)).unwrap_or_default()
}

impl ReportPort for CsvReportAdapter {
    fn write_returns(
        &self,
        summary: &PerformanceSummary,
        result: &BacktestResult,
        output_path: &Path,
    ) -> Result<(), FactorlabError> {
        let file = File::create(output_path)?;
        let mut wtr = csv::Writer::from_writer(file);
        wtr.write_record([
            "date",
            "strategy_return",
            "benchmark_return",
            "strategy_cumulative",
            "benchmark_cumulative",
        ])
        .map_err(|e| csv_error(output_path, e))?;

        for (s, b) in summary.strategy_curve.iter().zip(&summary.benchmark_curve) {
            let strategy = result.strategy.get(s.date).flatten();
            let benchmark = result.benchmark.get(b.date).flatten();
            wtr.write_record([
                s.date.format("%Y-%m-%d").to_string(),
                format_value(strategy),
                format_value(benchmark),
                format!("{:.10}", s.value),
                format!("{:.10}", b.value),
            ])
            .map_err(|e| csv_error(output_path, e))?;
        }

        wtr.flush()?;
        Ok(())
    }

    fn write_periods(
        &self,
        result: &BacktestResult,
        output_path: &Path,
    ) -> Result<(), FactorlabError> {
        let file = File::create(output_path)?;
        let mut wtr = csv::Writer::from_writer(file);
        wtr.write_record([
            "period",
            "period_end",
            "population",
            "long",
            "short",
            "turnover",
            "cost_multiplier",
            "forward_days",
            "issues",
        ])
        .map_err(|e| csv_error(output_path, e))?;

        for p in &result.periods {
            let issues: Vec<String> = p.issues.iter().map(|i| i.to_string()).collect();
            wtr.write_record([
                p.key.to_string(),
                p.period_end.format("%Y-%m-%d").to_string(),
                p.population.to_string(),
                p.baskets.long.iter().cloned().collect::<Vec<_>>().join(" "),
                p.baskets.short.iter().cloned().collect::<Vec<_>>().join(" "),
                p.turnover.map(|t| t.to_string()).unwrap_or_default(),
                format_value(p.cost_multiplier),
                p.forward_days.to_string(),
                issues.join("; "),
            ])
            .map_err(|e| csv_error(output_path, e))?;
        }

        wtr.flush()?;
        Ok(())
    }
}
