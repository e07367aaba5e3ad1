//! End-to-end tests over the backtest pipeline.
//!
//! Tests cover:
//! - Ranking a known cross-section (top and bottom deciles, disjoint baskets)
//! - Turnover and cost multiplier for repeated baskets
//! - Populations below the minimum producing no rows, alone and inside a run
//! - Cumulative growth of a known return series
//! - Full pipeline through a mock data port: load, screen, run, analyze, report
//! - Survivorship filtering and risk-free handling through the reference port
//! - The same pipeline over the SQLite adapter

mod common;

use approx::assert_relative_eq;
use chrono::Datelike;
use common::*;
use factorlab::adapters::csv_report_adapter::CsvReportAdapter;
use factorlab::cli::{load_panel, load_risk_free, load_universe};
use factorlab::domain::backtest::{BacktestConfig, analyze, run_backtest};
use factorlab::domain::error::{FactorlabError, PeriodIssue};
use factorlab::domain::metrics::cumulative_growth;
use factorlab::domain::ranker::{FactorWeights, RankOutcome, RankerConfig, rank_cross_section};
use factorlab::domain::series::ReturnSeries;
use factorlab::domain::tracker::{RebalanceTracker, cost_multiplier};
use factorlab::domain::universe::{AllInstruments, ConstituentWindows};
use factorlab::ports::report_port::ReportPort;

mod ranking {
    use super::*;

    #[test]
    fn hundred_instruments_split_into_top_and_bottom_decile() {
        let d = date("2024-01-31");
        let records: Vec<_> = (1..=100)
            .map(|i| record(&format!("S{:03}", i), d, i as f64))
            .collect();

        let outcome = rank_cross_section(d, &records, &RankerConfig::default());
        let RankOutcome::Ranked(ranking) = outcome else {
            panic!("expected a ranking, got {:?}", outcome);
        };

        let expected_long: Vec<String> = (91..=100).map(|i| format!("S{:03}", i)).collect();
        let expected_short: Vec<String> = (1..=10).map(|i| format!("S{:03}", i)).collect();
        assert_eq!(
            ranking.baskets.long.iter().cloned().collect::<Vec<_>>(),
            expected_long
        );
        assert_eq!(
            ranking.baskets.short.iter().cloned().collect::<Vec<_>>(),
            expected_short
        );
        assert!(ranking.baskets.long.is_disjoint(&ranking.baskets.short));
    }

    #[test]
    fn forty_instruments_are_below_the_default_minimum() {
        let d = date("2024-01-31");
        let records: Vec<_> = (1..=40)
            .map(|i| record(&format!("S{:03}", i), d, i as f64))
            .collect();

        let outcome = rank_cross_section(d, &records, &RankerConfig::default());
        assert_eq!(
            outcome,
            RankOutcome::Skipped(PeriodIssue::InsufficientData {
                date: d,
                population: 40,
                minimum: 50,
            })
        );
    }
}

mod turnover {
    use super::*;

    #[test]
    fn identical_consecutive_baskets_cost_nothing() {
        let d = date("2024-01-31");
        let records: Vec<_> = (1..=60)
            .map(|i| record(&format!("S{:03}", i), d, i as f64))
            .collect();
        let RankOutcome::Ranked(ranking) =
            rank_cross_section(d, &records, &RankerConfig::default())
        else {
            panic!("expected a ranking");
        };

        let mut tracker = RebalanceTracker::new();
        let first = tracker.turnover(0, &ranking.baskets.long, &ranking.baskets.short);
        let second = tracker.turnover(1, &ranking.baskets.long, &ranking.baskets.short);
        assert_eq!(first, 0);
        assert_eq!(second, 0);
        assert_eq!(cost_multiplier(0.001, second), 1.0);
    }
}

mod cumulative {
    use super::*;

    #[test]
    fn known_series_compounds() {
        let series = ReturnSeries::from_values(&[
            (date("2024-02-01"), 0.01),
            (date("2024-02-02"), 0.02),
            (date("2024-02-05"), -0.01),
        ])
        .unwrap();

        let curve: Vec<f64> = cumulative_growth(&series).iter().map(|p| p.value).collect();
        assert_relative_eq!(curve[0], 1.01, epsilon = 1e-12);
        assert_relative_eq!(curve[1], 1.0302, epsilon = 1e-12);
        assert_relative_eq!(curve[2], 1.019898, epsilon = 1e-12);
    }
}

mod full_backtest_pipeline {
    use super::*;

    fn port(instruments: usize, days: usize) -> MockDataPort {
        let days = weekdays(date("2024-01-02"), days);
        MockDataPort::new().with_bars(trending_bars(instruments, &days))
    }

    #[test]
    fn mock_port_through_analysis() {
        let data_port = port(12, 120);
        let config = small_config();
        let screened = load_panel(&data_port, None, &config).unwrap();
        assert!(screened.skipped.is_empty());

        let reference = MockReferenceDataPort::default();
        let universe = load_universe(&reference).unwrap();
        let risk_free = load_risk_free(&reference, config.rebalance).unwrap();
        assert!(risk_free.is_assumed_zero());

        let result = run_backtest(&screened.panel, universe.as_ref(), &config).unwrap();
        // Jan through May ranked, June only supplies returns
        assert_eq!(result.periods.len(), 5);
        assert_eq!(result.periods[0].turnover, Some(0));
        for p in &result.periods {
            assert!(p.baskets.long.is_disjoint(&p.baskets.short));
            assert_eq!(p.baskets.long.len(), 3);
            assert_eq!(p.baskets.short.len(), 3);
        }
        assert_eq!(result.strategy.dates(), result.benchmark.dates());
        assert_eq!(result.strategy.first_date().unwrap().month(), 2);

        let summary = analyze(&result, &risk_free, &config).unwrap();
        assert_eq!(summary.strategy.observations, result.strategy.len());
        assert_eq!(summary.strategy_curve.len(), result.strategy.len());
        assert!(summary.strategy.max_drawdown.unwrap() <= 0.0);
        assert!(summary.capm.risk_free_assumed_zero);
        assert_eq!(summary.capm.observations, 5);
    }

    #[test]
    fn long_momentum_alone_ranks_by_drift() {
        let data_port = port(12, 120);
        let base = small_config();
        let config = BacktestConfig {
            ranker: RankerConfig {
                weights: FactorWeights {
                    short_momentum: 0.0,
                    long_momentum: 1.0,
                    volatility: 0.0,
                },
                ..base.ranker.clone()
            },
            ..base
        };
        let screened = load_panel(&data_port, None, &config).unwrap();
        let result = run_backtest(&screened.panel, &AllInstruments, &config).unwrap();

        // the wobble sums to zero over five days, leaving drift to order the names
        for p in &result.periods {
            assert_eq!(
                p.baskets.long.iter().cloned().collect::<Vec<_>>(),
                vec!["S009", "S010", "S011"]
            );
            assert_eq!(
                p.baskets.short.iter().cloned().collect::<Vec<_>>(),
                vec!["S000", "S001", "S002"]
            );
        }
        // unchanged baskets after the first period carry no turnover
        assert_eq!(result.total_turnover(), 0);
    }

    #[test]
    fn too_few_instruments_is_an_empty_result() {
        let data_port = port(3, 120);
        let config = small_config();
        let screened = load_panel(&data_port, None, &config).unwrap();
        let err = run_backtest(&screened.panel, &AllInstruments, &config).unwrap_err();
        assert!(matches!(err, FactorlabError::EmptyResultSet { periods: 5 }));

        let relaxed = BacktestConfig {
            ranker: RankerConfig {
                min_population: 3,
                selection_percentile: 0.34,
                ..config.ranker.clone()
            },
            ..config.clone()
        };
        let result = run_backtest(&screened.panel, &AllInstruments, &relaxed).unwrap();
        assert_eq!(result.contributed_periods(), 5);
    }

    #[test]
    fn thin_period_is_skipped_inside_a_successful_run() {
        let data_port = port(8, 100);
        let config = small_config();
        let screened = load_panel(&data_port, None, &config).unwrap();

        // five names drop out over the February period end and return in March
        let mut windows = ConstituentWindows::new();
        for k in 3..8 {
            let code = format!("S{:03}", k);
            windows.add_window(&code, None, Some(date("2024-02-14"))).unwrap();
            windows.add_window(&code, Some(date("2024-03-01")), None).unwrap();
        }

        let result = run_backtest(&screened.panel, &windows, &config).unwrap();
        let keys: Vec<String> = result.periods.iter().map(|p| p.key.to_string()).collect();
        assert_eq!(keys, vec!["2024-01", "2024-02", "2024-03", "2024-04"]);

        let feb = &result.periods[1];
        assert_eq!(feb.population, 3);
        assert_eq!(feb.forward_days, 0);
        assert_eq!(feb.turnover, None);
        assert_eq!(
            feb.skip_reason(),
            Some(&PeriodIssue::InsufficientData {
                date: date("2024-02-29"),
                population: 3,
                minimum: 4,
            })
        );

        // February's forward month gets no rows
        assert!(result.strategy.dates().iter().all(|d| d.month() != 3));

        for i in [0, 2, 3] {
            assert!(result.periods[i].contributed());
            assert_eq!(result.periods[i].skip_reason(), None);
        }
        let months: std::collections::BTreeSet<u32> =
            result.strategy.dates().iter().map(|d| d.month()).collect();
        assert_eq!(months.into_iter().collect::<Vec<_>>(), vec![2, 4, 5]);
        assert_eq!(result.skipped_periods(), 1);
    }

    #[test]
    fn short_history_instruments_are_screened_out() {
        let days = weekdays(date("2024-01-02"), 120);
        let mut bars = trending_bars(8, &days);
        bars.extend(
            days.iter()
                .take(5)
                .map(|&d| make_bar("NEW", d, 50.0)),
        );
        let data_port = MockDataPort::new().with_bars(bars);

        let screened = load_panel(&data_port, None, &small_config()).unwrap();
        assert_eq!(screened.panel.instrument_count(), 8);
        assert_eq!(screened.skipped.len(), 1);
        assert_eq!(screened.skipped[0].code, "NEW");
    }

    #[test]
    fn requested_codes_restrict_the_panel() {
        let data_port = port(12, 120);
        let codes: Vec<String> = (0..6).map(|k| format!("S{:03}", k)).collect();
        let screened = load_panel(&data_port, Some(&codes), &small_config()).unwrap();
        assert_eq!(screened.panel.codes(), codes);
    }

    #[test]
    fn end_date_cuts_the_panel() {
        let data_port = port(12, 120);
        let config = BacktestConfig {
            end_date: Some(date("2024-03-31")),
            ..small_config()
        };
        let screened = load_panel(&data_port, None, &config).unwrap();
        let result = run_backtest(&screened.panel, &AllInstruments, &config).unwrap();
        assert_eq!(result.periods.len(), 2);
        assert!(result.strategy.last_date().unwrap() <= date("2024-03-31"));
    }

    #[test]
    fn data_port_failure_propagates() {
        let data_port = port(12, 120).with_error("connection refused");
        let err = load_panel(&data_port, None, &small_config()).unwrap_err();
        assert!(matches!(err, FactorlabError::Database { .. }));
    }

    #[test]
    fn empty_port_is_no_data() {
        let err = load_panel(&MockDataPort::new(), None, &small_config()).unwrap_err();
        assert!(matches!(err, FactorlabError::NoData { .. }));
    }

    #[test]
    fn reports_are_written() {
        let data_port = port(12, 120);
        let config = small_config();
        let screened = load_panel(&data_port, None, &config).unwrap();
        let result = run_backtest(&screened.panel, &AllInstruments, &config).unwrap();
        let summary = analyze(
            &result,
            &factorlab::domain::risk_free::RiskFreeRate::AssumedZero,
            &config,
        )
        .unwrap();

        let dir = tempfile::TempDir::new().unwrap();
        let returns = dir.path().join("returns.csv");
        let periods = dir.path().join("periods.csv");
        let reporter = CsvReportAdapter::new();
        reporter.write_returns(&summary, &result, &returns).unwrap();
        reporter.write_periods(&result, &periods).unwrap();

        let returns = std::fs::read_to_string(returns).unwrap();
        assert_eq!(returns.lines().count(), result.strategy.len() + 1);
        let periods = std::fs::read_to_string(periods).unwrap();
        assert_eq!(periods.lines().count(), result.periods.len() + 1);
    }
}

mod reference_data {
    use super::*;

    #[test]
    fn constituent_windows_exclude_non_members() {
        let days = weekdays(date("2024-01-02"), 120);
        let data_port = MockDataPort::new().with_bars(trending_bars(10, &days));
        let config = small_config();
        let screened = load_panel(&data_port, None, &config).unwrap();

        // the strongest name only joins the index in April
        let mut windows = ConstituentWindows::new();
        windows
            .add_window("S009", Some(date("2024-04-01")), None)
            .unwrap();
        let reference = MockReferenceDataPort {
            windows,
            ..Default::default()
        };
        let universe = load_universe(&reference).unwrap();
        let result = run_backtest(&screened.panel, universe.as_ref(), &config).unwrap();

        for p in &result.periods {
            let member = p.period_end >= date("2024-04-01");
            assert_eq!(p.population, if member { 10 } else { 9 });
            if !member {
                assert!(!p.baskets.long.contains("S009"));
                assert!(!p.baskets.short.contains("S009"));
            }
        }
    }

    #[test]
    fn observed_risk_free_rate_is_used() {
        let days = weekdays(date("2024-01-02"), 120);
        let data_port = MockDataPort::new().with_bars(trending_bars(10, &days));
        let config = small_config();
        let screened = load_panel(&data_port, None, &config).unwrap();
        let result = run_backtest(&screened.panel, &AllInstruments, &config).unwrap();

        let reference = MockReferenceDataPort {
            risk_free: vec![(date("2024-01-15"), 5.0)],
            ..Default::default()
        };
        let risk_free = load_risk_free(&reference, config.rebalance).unwrap();
        assert!(!risk_free.is_assumed_zero());

        let summary = analyze(&result, &risk_free, &config).unwrap();
        assert!(!summary.capm.risk_free_assumed_zero);
        // forward-filled from January, so every forward month has a rate
        assert_eq!(summary.capm.observations, 5);
    }

    #[test]
    fn unreadable_risk_free_is_a_data_error() {
        let reference = MockReferenceDataPort {
            fail_risk_free: true,
            ..Default::default()
        };
        let config = small_config();
        let err = load_risk_free(&reference, config.rebalance).unwrap_err();
        assert!(matches!(err, FactorlabError::Data { .. }));
    }

    #[test]
    fn no_risk_free_source_assumes_zero() {
        let reference = MockReferenceDataPort::default();
        let config = small_config();
        assert!(load_risk_free(&reference, config.rebalance).unwrap().is_assumed_zero());
    }
}

#[cfg(feature = "sqlite")]
mod sqlite_pipeline {
    use super::*;
    use factorlab::adapters::sqlite_adapter::SqliteAdapter;

    #[test]
    fn sqlite_and_mock_ports_agree() {
        let days = weekdays(date("2024-01-02"), 120);
        let bars = trending_bars(10, &days);

        let db = SqliteAdapter::in_memory().unwrap();
        db.initialize_schema().unwrap();
        db.insert_bars(&bars).unwrap();
        let mock = MockDataPort::new().with_bars(bars);

        let config = small_config();
        let from_db = load_panel(&db, None, &config).unwrap();
        let from_mock = load_panel(&mock, None, &config).unwrap();

        let a = run_backtest(&from_db.panel, &AllInstruments, &config).unwrap();
        let b = run_backtest(&from_mock.panel, &AllInstruments, &config).unwrap();
        assert_eq!(a.periods, b.periods);
        assert_eq!(a.strategy.dates(), b.strategy.dates());
        for (x, y) in a.strategy.observed().iter().zip(b.strategy.observed()) {
            assert_relative_eq!(*x, y, epsilon = 1e-12);
        }
    }
}

mod properties {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn baskets_never_overlap(
            values in prop::collection::vec(-1.0f64..1.0, 4..80),
            percentile in 0.05f64..=0.5,
        ) {
            let d = date("2024-01-31");
            let records: Vec<_> = values
                .iter()
                .enumerate()
                .map(|(i, &v)| record(&format!("S{:03}", i), d, v))
                .collect();
            let config = RankerConfig {
                selection_percentile: percentile,
                min_population: 1,
                ..RankerConfig::default()
            };
            if let RankOutcome::Ranked(ranking) = rank_cross_section(d, &records, &config) {
                prop_assert!(ranking.baskets.long.is_disjoint(&ranking.baskets.short));
                let k = (records.len() as f64 * percentile).floor() as usize;
                prop_assert_eq!(ranking.baskets.long.len(), k);
                prop_assert_eq!(ranking.baskets.short.len(), k);
            }
        }
    }
}
