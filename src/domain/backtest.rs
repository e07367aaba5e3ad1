//! Backtest driver: the ordered rebalance loop.
//!
//! Signals are computed once over the whole panel. Each rebalance period
//! except the last is then ranked at its period-end, turnover is taken from
//! the tracker, and the following calendar period's trading days produce the
//! strategy and benchmark rows.

use crate::domain::aggregator::{ShortLeg, aggregate_forward};
use crate::domain::calendar::{PeriodKey, RebalanceFrequency, RebalancePeriod, build_periods};
use crate::domain::error::{FactorlabError, PeriodIssue};
use crate::domain::metrics::{PerformanceSummary, TRADING_DAYS_PER_YEAR};
use crate::domain::panel::PricePanel;
use crate::domain::ranker::{Baskets, RankOutcome, RankerConfig, rank_cross_section};
use crate::domain::risk_free::RiskFreeRate;
use crate::domain::series::ReturnSeries;
use crate::domain::signal::{FactorRecord, SignalTable, SignalWindows};
use crate::domain::tracker::{RebalanceTracker, cost_multiplier};
use crate::domain::universe::UniverseFilter;
use chrono::NaiveDate;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestConfig {
    pub windows: SignalWindows,
    pub ranker: RankerConfig,
    pub transaction_cost_rate: f64,
    pub trading_days_per_year: f64,
    pub short_leg: ShortLeg,
    pub rebalance: RebalanceFrequency,
    /// Rebalance periods are drawn from `[start_date, end_date]`; earlier bars
    /// still feed signal warmup.
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        BacktestConfig {
            windows: SignalWindows::default(),
            ranker: RankerConfig::default(),
            transaction_cost_rate: 0.001,
            trading_days_per_year: TRADING_DAYS_PER_YEAR,
            short_leg: ShortLeg::default(),
            rebalance: RebalanceFrequency::default(),
            start_date: None,
            end_date: None,
        }
    }
}

/// Ledger entry for one examined rebalance period.
#[derive(Debug, Clone, PartialEq)]
pub struct PeriodRecord {
    pub key: PeriodKey,
    pub period_end: NaiveDate,
    /// Eligible instruments with complete factors at the period end.
    pub population: usize,
    pub baskets: Baskets,
    /// `None` when the period was not ranked.
    pub turnover: Option<usize>,
    pub cost_multiplier: Option<f64>,
    pub forward_days: usize,
    pub issues: Vec<PeriodIssue>,
}

impl PeriodRecord {
    pub fn contributed(&self) -> bool {
        self.forward_days > 0
    }

    /// The issue that kept this period from contributing rows, if any.
    pub fn skip_reason(&self) -> Option<&PeriodIssue> {
        self.issues.iter().find(|i| i.skips_period())
    }
}

#[derive(Debug, Clone)]
pub struct BacktestResult {
    pub strategy: ReturnSeries,
    pub benchmark: ReturnSeries,
    pub periods: Vec<PeriodRecord>,
}

impl BacktestResult {
    pub fn contributed_periods(&self) -> usize {
        self.periods.iter().filter(|p| p.contributed()).count()
    }

    pub fn skipped_periods(&self) -> usize {
        self.periods.len() - self.contributed_periods()
    }

    pub fn total_turnover(&self) -> usize {
        self.periods.iter().filter_map(|p| p.turnover).sum()
    }
}

/// Rebalance periods inside the configured date range.
pub fn rebalance_periods(panel: &PricePanel, config: &BacktestConfig) -> Vec<RebalancePeriod> {
    let timeline: Vec<NaiveDate> = panel
        .timeline()
        .iter()
        .copied()
        .filter(|&d| {
            config.start_date.is_none_or(|s| d >= s) && config.end_date.is_none_or(|e| d <= e)
        })
        .collect();
    build_periods(&timeline, config.rebalance)
}

pub fn run_backtest(
    panel: &PricePanel,
    universe: &dyn UniverseFilter,
    config: &BacktestConfig,
) -> Result<BacktestResult, FactorlabError> {
    let signals = SignalTable::compute(panel, &config.windows);
    let periods = rebalance_periods(panel, config);
    let by_key: HashMap<PeriodKey, &RebalancePeriod> =
        periods.iter().map(|p| (p.key, p)).collect();

    let examined = periods.len().saturating_sub(1);
    tracing::info!(
        instruments = panel.instrument_count(),
        periods = periods.len(),
        frequency = %config.rebalance,
        "starting backtest"
    );

    let mut tracker = RebalanceTracker::new();
    let mut ranked_index = 0usize;
    let mut strategy = ReturnSeries::new();
    let mut benchmark = ReturnSeries::new();
    let mut ledger = Vec::with_capacity(examined);

    for period in &periods[..examined] {
        let date = period.period_end();
        let records: Vec<FactorRecord> = signals
            .cross_section(date)
            .into_iter()
            .filter(|r| universe.is_eligible(&r.code, date))
            .collect();
        let population = records.len();

        let ranking = match rank_cross_section(date, &records, &config.ranker) {
            RankOutcome::Ranked(ranking) => ranking,
            RankOutcome::Skipped(issue) => {
                tracing::warn!(period = %period.key, %issue, "skipping period");
                ledger.push(PeriodRecord {
                    key: period.key,
                    period_end: date,
                    population,
                    baskets: Baskets::default(),
                    turnover: None,
                    cost_multiplier: None,
                    forward_days: 0,
                    issues: vec![issue],
                });
                continue;
            }
        };

        let mut issues = ranking.issues.clone();
        for issue in &issues {
            tracing::warn!(period = %period.key, %issue, "factor dropped from composite");
        }

        // the tracker advances even if the forward period turns out to be missing
        let turnover = tracker.turnover(
            ranked_index,
            &ranking.baskets.long,
            &ranking.baskets.short,
        );
        ranked_index += 1;
        let multiplier = cost_multiplier(config.transaction_cost_rate, turnover);

        let forward_key = period.key.successor();
        let forward_days = match by_key.get(&forward_key) {
            Some(forward) => {
                let rows = aggregate_forward(
                    &signals,
                    &ranking.baskets,
                    &ranking.population_codes(),
                    &forward.dates,
                    multiplier,
                    config.short_leg,
                );
                let days = rows.len();
                for (s, b) in rows.strategy.into_iter().zip(rows.benchmark) {
                    strategy.push(s.date, s.value)?;
                    benchmark.push(b.date, b.value)?;
                }
                days
            }
            None => {
                let issue = PeriodIssue::MissingForwardData {
                    period: forward_key,
                };
                tracing::warn!(period = %period.key, %issue, "skipping period");
                issues.push(issue);
                0
            }
        };

        tracing::debug!(
            period = %period.key,
            population,
            long = ranking.baskets.long.len(),
            short = ranking.baskets.short.len(),
            turnover,
            forward_days,
            "period processed"
        );

        ledger.push(PeriodRecord {
            key: period.key,
            period_end: date,
            population,
            baskets: ranking.baskets,
            turnover: Some(turnover),
            cost_multiplier: Some(multiplier),
            forward_days,
            issues,
        });
    }

    if strategy.is_empty() {
        return Err(FactorlabError::EmptyResultSet { periods: examined });
    }

    tracing::info!(
        contributed = ledger.iter().filter(|p| p.contributed()).count(),
        examined,
        days = strategy.len(),
        "backtest complete"
    );

    Ok(BacktestResult {
        strategy,
        benchmark,
        periods: ledger,
    })
}

/// Aligns the result's series and computes the performance summary.
pub fn analyze(
    result: &BacktestResult,
    risk_free: &RiskFreeRate,
    config: &BacktestConfig,
) -> Result<PerformanceSummary, FactorlabError> {
    PerformanceSummary::compute(
        &result.strategy,
        &result.benchmark,
        risk_free,
        config.rebalance,
        config.trading_days_per_year,
    )
}
