//! Performance analyzer: growth curves, annualized statistics, drawdown and
//! CAPM alpha/beta.
//!
//! Everything here is a pure function of finalized return series. A
//! statistic that cannot be computed is `None`, never zero.

use crate::domain::calendar::RebalanceFrequency;
use crate::domain::error::FactorlabError;
use crate::domain::risk_free::RiskFreeRate;
use crate::domain::series::{ReturnSeries, align};
use crate::domain::stats::{mean, sample_std};
use chrono::NaiveDate;

pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GrowthPoint {
    pub date: NaiveDate,
    pub value: f64,
}

/// Running product of (1 + r) starting from 1; a missing value counts as 0.
pub fn cumulative_growth(series: &ReturnSeries) -> Vec<GrowthPoint> {
    let mut growth = 1.0;
    series
        .points()
        .iter()
        .map(|p| {
            growth *= 1.0 + p.value.unwrap_or(0.0);
            GrowthPoint {
                date: p.date,
                value: growth,
            }
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct PerformanceReport {
    pub observations: usize,
    pub total_return: Option<f64>,
    pub annualized_return: Option<f64>,
    pub annualized_volatility: Option<f64>,
    pub sharpe_ratio: Option<f64>,
    /// Worst peak-to-trough decline as a fraction, always <= 0.
    pub max_drawdown: Option<f64>,
    /// Longest run of trading days spent below a prior peak.
    pub max_drawdown_duration: usize,
}

impl PerformanceReport {
    pub fn compute(series: &ReturnSeries, trading_days_per_year: f64) -> Self {
        let values = series.observed();
        let curve = cumulative_growth(series);

        let total_return = curve.last().map(|p| p.value - 1.0);
        let annualized_return = mean(&values).map(|m| m * trading_days_per_year);
        let annualized_volatility =
            sample_std(&values).map(|sd| sd * trading_days_per_year.sqrt());

        let sharpe_ratio = match (annualized_return, annualized_volatility) {
            (Some(ret), Some(vol)) if vol > 0.0 => Some(ret / vol),
            _ => None,
        };

        let (max_drawdown, max_drawdown_duration) = match compute_drawdown(&curve) {
            Some((dd, duration)) => (Some(dd), duration),
            None => (None, 0),
        };

        PerformanceReport {
            observations: values.len(),
            total_return,
            annualized_return,
            annualized_volatility,
            sharpe_ratio,
            max_drawdown,
            max_drawdown_duration,
        }
    }
}

/// min(cum / running_max(cum) - 1) and the longest underwater stretch.
/// `None` when the curve falls below a running peak that is not positive,
/// where the ratio has no meaning.
fn compute_drawdown(curve: &[GrowthPoint]) -> Option<(f64, usize)> {
    let first = curve.first()?;

    let mut peak = first.value;
    let mut max_dd = 0.0_f64;
    let mut max_duration = 0usize;
    let mut current_duration = 0usize;

    for point in curve {
        if point.value >= peak {
            peak = point.value;
            current_duration = 0;
            continue;
        }
        if peak <= 0.0 {
            return None;
        }
        let dd = point.value / peak - 1.0;
        if dd < max_dd {
            max_dd = dd;
        }
        current_duration += 1;
        max_duration = max_duration.max(current_duration);
    }

    Some((max_dd, max_duration))
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RegressionFailure {
    #[error("need at least 2 aligned periods, have {observations}")]
    TooFewObservations { observations: usize },

    #[error("benchmark excess returns have zero variance")]
    ZeroVarianceRegressor,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OlsFit {
    pub intercept: f64,
    pub slope: f64,
    pub r_squared: Option<f64>,
}

/// Ordinary least squares of `y` on `x` with an intercept.
pub fn ols(x: &[f64], y: &[f64]) -> Result<OlsFit, RegressionFailure> {
    let n = x.len().min(y.len());
    if n < 2 {
        return Err(RegressionFailure::TooFewObservations { observations: n });
    }
    let (x, y) = (&x[..n], &y[..n]);

    let mx = x.iter().sum::<f64>() / n as f64;
    let my = y.iter().sum::<f64>() / n as f64;

    let mut sxx = 0.0;
    let mut sxy = 0.0;
    let mut syy = 0.0;
    for (xi, yi) in x.iter().zip(y) {
        let dx = xi - mx;
        let dy = yi - my;
        sxx += dx * dx;
        sxy += dx * dy;
        syy += dy * dy;
    }

    // constant regressors can leave rounding residue in sxx
    let scale: f64 = x.iter().map(|v| v * v).sum::<f64>();
    if sxx <= 1e-20 * scale.max(f64::MIN_POSITIVE) {
        return Err(RegressionFailure::ZeroVarianceRegressor);
    }

    let slope = sxy / sxx;
    let intercept = my - slope * mx;
    let r_squared = (syy > 0.0).then(|| (sxy * sxy) / (sxx * syy));

    Ok(OlsFit {
        intercept,
        slope,
        r_squared,
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct CapmReport {
    /// Intercept as a per-period percentage (monthly by default).
    pub alpha_pct: Option<f64>,
    pub beta: Option<f64>,
    pub r_squared: Option<f64>,
    pub observations: usize,
    pub failure: Option<RegressionFailure>,
    pub risk_free_assumed_zero: bool,
}

impl CapmReport {
    /// Regresses per-period excess strategy returns on excess benchmark
    /// returns. Daily series are compounded per rebalance period first;
    /// periods without a risk-free rate are left out.
    pub fn compute(
        strategy: &ReturnSeries,
        benchmark: &ReturnSeries,
        risk_free: &RiskFreeRate,
        freq: RebalanceFrequency,
    ) -> Self {
        if risk_free.is_assumed_zero() {
            tracing::warn!("no risk-free rate available, CAPM uses an assumed rate of zero");
        }

        let strat = strategy.compound_by_period(freq);
        let bench = benchmark.compound_by_period(freq);

        let mut x = Vec::new();
        let mut y = Vec::new();
        for (key, s) in &strat {
            let Some(b) = bench.get(key) else { continue };
            let Some(rf) = risk_free.rate_for(key) else {
                tracing::debug!(period = %key, "no risk-free rate yet, period left out of CAPM");
                continue;
            };
            y.push(s - rf);
            x.push(b - rf);
        }

        let observations = x.len();
        match ols(&x, &y) {
            Ok(fit) => CapmReport {
                alpha_pct: Some(fit.intercept * 100.0),
                beta: Some(fit.slope),
                r_squared: fit.r_squared,
                observations,
                failure: None,
                risk_free_assumed_zero: risk_free.is_assumed_zero(),
            },
            Err(failure) => {
                tracing::warn!(%failure, "CAPM regression failed");
                CapmReport {
                    alpha_pct: None,
                    beta: None,
                    r_squared: None,
                    observations,
                    failure: Some(failure),
                    risk_free_assumed_zero: risk_free.is_assumed_zero(),
                }
            }
        }
    }
}

/// Strategy and benchmark analysis over their common dates.
#[derive(Debug, Clone, PartialEq)]
pub struct PerformanceSummary {
    pub strategy: PerformanceReport,
    pub benchmark: PerformanceReport,
    pub capm: CapmReport,
    pub strategy_curve: Vec<GrowthPoint>,
    pub benchmark_curve: Vec<GrowthPoint>,
}

impl PerformanceSummary {
    pub fn compute(
        strategy: &ReturnSeries,
        benchmark: &ReturnSeries,
        risk_free: &RiskFreeRate,
        freq: RebalanceFrequency,
        trading_days_per_year: f64,
    ) -> Result<Self, FactorlabError> {
        let (strategy, benchmark) = align(strategy, benchmark)?;

        Ok(PerformanceSummary {
            strategy: PerformanceReport::compute(&strategy, trading_days_per_year),
            benchmark: PerformanceReport::compute(&benchmark, trading_days_per_year),
            capm: CapmReport::compute(&strategy, &benchmark, risk_free, freq),
            strategy_curve: cumulative_growth(&strategy),
            benchmark_curve: cumulative_growth(&benchmark),
        })
    }
}
