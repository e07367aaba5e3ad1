//! Cross-sectional ranker.
//!
//! At one period-end date: z-score every factor across the eligible
//! population, combine into a weighted composite, sort, and cut long/short
//! baskets at the configured percentile.

use crate::domain::error::PeriodIssue;
use crate::domain::signal::{Factor, FactorRecord};
use crate::domain::stats::{mean, population_std};
use chrono::NaiveDate;
use std::collections::BTreeSet;

/// Dispersion at or below this (relative to the factor's magnitude) counts as zero.
const DEGENERATE_STD_TOLERANCE: f64 = 1e-12;

pub type Basket = BTreeSet<String>;

/// Composite score weights. A zero weight removes the factor from the score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FactorWeights {
    pub short_momentum: f64,
    pub long_momentum: f64,
    pub volatility: f64,
}

impl FactorWeights {
    pub fn weight(&self, factor: Factor) -> f64 {
        match factor {
            Factor::ShortMomentum => self.short_momentum,
            Factor::LongMomentum => self.long_momentum,
            Factor::Volatility => self.volatility,
        }
    }
}

impl Default for FactorWeights {
    fn default() -> Self {
        FactorWeights {
            short_momentum: 1.0,
            long_momentum: 1.0,
            volatility: -1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RankerConfig {
    pub selection_percentile: f64,
    pub min_population: usize,
    pub weights: FactorWeights,
}

impl Default for RankerConfig {
    fn default() -> Self {
        RankerConfig {
            selection_percentile: 0.10,
            min_population: 50,
            weights: FactorWeights::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Baskets {
    pub long: Basket,
    pub short: Basket,
}

impl Baskets {
    pub fn total_size(&self) -> usize {
        self.long.len() + self.short.len()
    }

    pub fn is_empty(&self) -> bool {
        self.long.is_empty() && self.short.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredInstrument {
    pub code: String,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Ranking {
    pub date: NaiveDate,
    /// Scored population, best first.
    pub scores: Vec<ScoredInstrument>,
    pub baskets: Baskets,
    /// Non-fatal conditions met while ranking (degenerate factors).
    pub issues: Vec<PeriodIssue>,
}

impl Ranking {
    pub fn population(&self) -> usize {
        self.scores.len()
    }

    pub fn population_codes(&self) -> Basket {
        self.scores.iter().map(|s| s.code.clone()).collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RankOutcome {
    Ranked(Ranking),
    Skipped(PeriodIssue),
}

/// (x - mean) / population std; `None` when the cross-section has no dispersion.
pub fn zscores(values: &[f64]) -> Option<Vec<f64>> {
    let m = mean(values)?;
    let sd = population_std(values)?;
    if !sd.is_finite() || sd <= DEGENERATE_STD_TOLERANCE * m.abs().max(1.0) {
        return None;
    }
    Some(values.iter().map(|v| (v - m) / sd).collect())
}

/// Number of names per side: floor(population * percentile).
pub fn basket_size(population: usize, percentile: f64) -> usize {
    (population as f64 * percentile).floor() as usize
}

/// Ranks one cross-section. `records` must already be restricted to eligible
/// instruments with complete factors on `date`.
pub fn rank_cross_section(
    date: NaiveDate,
    records: &[FactorRecord],
    config: &RankerConfig,
) -> RankOutcome {
    let population = records.len();
    if population < config.min_population || population == 0 {
        return RankOutcome::Skipped(PeriodIssue::InsufficientData {
            date,
            population,
            minimum: config.min_population,
        });
    }

    let mut issues = Vec::new();
    let mut scores = vec![0.0_f64; population];
    let mut used_factors = 0usize;

    for factor in Factor::ALL {
        let weight = config.weights.weight(factor);
        if weight == 0.0 {
            continue;
        }
        let values: Vec<f64> = records.iter().map(|r| r.value(factor)).collect();
        match zscores(&values) {
            Some(z) => {
                for (score, zi) in scores.iter_mut().zip(z) {
                    *score += weight * zi;
                }
                used_factors += 1;
            }
            None => issues.push(PeriodIssue::DegenerateFactor { date, factor }),
        }
    }

    if used_factors == 0 {
        return RankOutcome::Skipped(PeriodIssue::AllFactorsDegenerate { date });
    }

    let mut scored: Vec<ScoredInstrument> = records
        .iter()
        .zip(scores)
        .map(|(r, score)| ScoredInstrument {
            code: r.code.clone(),
            score,
        })
        .collect();
    scored.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.code.cmp(&b.code)));

    let n = basket_size(population, config.selection_percentile).min(population);
    let top: Basket = scored[..n].iter().map(|s| s.code.clone()).collect();
    let bottom: Basket = scored[population - n..]
        .iter()
        .map(|s| s.code.clone())
        .collect();

    let overlap: Basket = top.intersection(&bottom).cloned().collect();
    let baskets = Baskets {
        long: top.difference(&overlap).cloned().collect(),
        short: bottom.difference(&overlap).cloned().collect(),
    };

    RankOutcome::Ranked(Ranking {
        date,
        scores: scored,
        baskets,
        issues,
    })
}
