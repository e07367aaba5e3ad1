//! CLI definition and dispatch.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use crate::adapters::csv_adapter::{CsvAdapter, CsvReferenceAdapter};
use crate::adapters::csv_report_adapter::CsvReportAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::domain::aggregator::ShortLeg;
use crate::domain::backtest::{self as backtest_engine, BacktestConfig, BacktestResult};
use crate::domain::calendar::RebalanceFrequency;
use crate::domain::config_validation::{read_date, read_double, read_int, validate_all};
use crate::domain::error::FactorlabError;
use crate::domain::metrics::{PerformanceReport, PerformanceSummary, TRADING_DAYS_PER_YEAR};
use crate::domain::panel::PricePanel;
use crate::domain::ranker::{FactorWeights, RankerConfig};
use crate::domain::risk_free::RiskFreeRate;
use crate::domain::signal::SignalWindows;
use crate::domain::universe::{
    AllInstruments, ScreenedPanel, SkipReason, UniverseFilter, parse_codes, screen_panel,
};
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::{DataPort, ReferenceDataPort};
use crate::ports::report_port::ReportPort;

#[derive(Parser, Debug)]
#[command(name = "factorlab", about = "Cross-sectional long-short factor backtester")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a backtest
    Backtest {
        #[arg(short, long)]
        config: PathBuf,
        /// Daily returns CSV; overrides [output] returns
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(long)]
        dry_run: bool,
    },
    /// Validate a configuration file
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Show the panel's coverage, or one symbol's data range
    Info {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        code: Option<String>,
    },
    /// List the symbols in the price panel
    ListSymbols {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Load a long-format price CSV into the SQLite database
    Import {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        input: PathBuf,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Command::Backtest {
            config,
            output,
            dry_run,
        } => {
            if dry_run {
                run_dry_run(&config)
            } else {
                run_backtest(&config, output.as_deref())
            }
        }
        Command::Validate { config } => run_validate(&config),
        Command::Info { config, code } => run_info(&config, code.as_deref()),
        Command::ListSymbols { config } => run_list_symbols(&config),
        Command::Import { config, input } => run_import(&config, &input),
    }
}

fn fail(err: FactorlabError) -> ExitCode {
    eprintln!("error: {err}");
    (&err).into()
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, ExitCode> {
    FileConfigAdapter::from_file(path).map_err(|e| {
        let err = FactorlabError::ConfigParse {
            file: path.display().to_string(),
            reason: e.to_string(),
        };
        eprintln!("error: {err}");
        ExitCode::from(&err)
    })
}

/// Reads a validated configuration into a typed [`BacktestConfig`].
pub fn build_backtest_config(config: &dyn ConfigPort) -> Result<BacktestConfig, FactorlabError> {
    let window = |key: &str, default: i64| -> Result<usize, FactorlabError> {
        Ok(read_int(config, "strategy", key, default)?.max(1) as usize)
    };

    let rebalance = match config.get_string("backtest", "rebalance") {
        Some(s) => s
            .parse::<RebalanceFrequency>()
            .map_err(|reason| FactorlabError::ConfigInvalid {
                section: "backtest".into(),
                key: "rebalance".into(),
                reason,
            })?,
        None => RebalanceFrequency::default(),
    };
    let short_leg = match config.get_string("backtest", "short_leg") {
        Some(s) => s
            .parse::<ShortLeg>()
            .map_err(|reason| FactorlabError::ConfigInvalid {
                section: "backtest".into(),
                key: "short_leg".into(),
                reason,
            })?,
        None => ShortLeg::default(),
    };

    Ok(BacktestConfig {
        windows: SignalWindows {
            short_window: window("short_window", 20)?,
            long_window: window("long_window", 60)?,
            vol_window: window("vol_window", 20)?,
        },
        ranker: RankerConfig {
            selection_percentile: read_double(config, "strategy", "selection_percentile", 0.10)?,
            min_population: read_int(config, "strategy", "min_population", 50)?.max(1) as usize,
            weights: FactorWeights {
                short_momentum: read_double(config, "strategy", "weight_short_momentum", 1.0)?,
                long_momentum: read_double(config, "strategy", "weight_long_momentum", 1.0)?,
                volatility: read_double(config, "strategy", "weight_volatility", -1.0)?,
            },
        },
        transaction_cost_rate: read_double(config, "backtest", "transaction_cost_rate", 0.001)?,
        trading_days_per_year: read_double(
            config,
            "backtest",
            "trading_days_per_year",
            TRADING_DAYS_PER_YEAR,
        )?,
        short_leg,
        rebalance,
        start_date: read_date(config, "backtest", "start_date")?,
        end_date: read_date(config, "backtest", "end_date")?,
    })
}

/// The `[data] codes` list, or `None` to use every instrument in the panel.
pub fn resolve_codes(config: &dyn ConfigPort) -> Result<Option<Vec<String>>, FactorlabError> {
    match config.get_string("data", "codes") {
        Some(s) if !s.trim().is_empty() => {
            parse_codes(&s)
                .map(Some)
                .map_err(|e| FactorlabError::ConfigInvalid {
                    section: "data".into(),
                    key: "codes".into(),
                    reason: e.to_string(),
                })
        }
        _ => Ok(None),
    }
}

/// Builds the price source named by `[data] source`.
pub fn open_data_port(config: &dyn ConfigPort) -> Result<Box<dyn DataPort>, FactorlabError> {
    let source = config
        .get_string("data", "source")
        .map(|s| s.trim().to_lowercase())
        .unwrap_or_else(|| "csv".to_string());

    match source.as_str() {
        "csv" => {
            let path = config
                .get_path("data", "panel")
                .ok_or_else(|| FactorlabError::ConfigMissing {
                    section: "data".into(),
                    key: "panel".into(),
                })?;
            Ok(Box::new(CsvAdapter::new(path)))
        }
        "sqlite" => open_sqlite_port(config),
        other => Err(FactorlabError::ConfigInvalid {
            section: "data".into(),
            key: "source".into(),
            reason: format!("unknown source '{}', expected csv or sqlite", other),
        }),
    }
}

#[cfg(feature = "sqlite")]
fn open_sqlite(
    config: &dyn ConfigPort,
) -> Result<crate::adapters::sqlite_adapter::SqliteAdapter, FactorlabError> {
    let path = config
        .get_path("sqlite", "path")
        .ok_or_else(|| FactorlabError::ConfigMissing {
            section: "sqlite".into(),
            key: "path".into(),
        })?;
    let pool_size = config.get_int("sqlite", "pool_size", 4).clamp(1, 64) as u32;
    crate::adapters::sqlite_adapter::SqliteAdapter::open(&path, pool_size)
}

#[cfg(feature = "sqlite")]
fn open_sqlite_port(config: &dyn ConfigPort) -> Result<Box<dyn DataPort>, FactorlabError> {
    Ok(Box::new(open_sqlite(config)?))
}

#[cfg(not(feature = "sqlite"))]
fn open_sqlite_port(_config: &dyn ConfigPort) -> Result<Box<dyn DataPort>, FactorlabError> {
    Err(FactorlabError::ConfigInvalid {
        section: "data".into(),
        key: "source".into(),
        reason: "sqlite feature is required for the sqlite source".into(),
    })
}

/// Fetches the panel through `end_date` and drops instruments too short to
/// produce every factor. Bars before `start_date` are kept for warmup.
pub fn load_panel(
    data_port: &dyn DataPort,
    codes: Option<&[String]>,
    bt_config: &BacktestConfig,
) -> Result<ScreenedPanel, FactorlabError> {
    let bars = data_port.fetch_bars(codes, None, bt_config.end_date)?;
    if bars.is_empty() {
        return Err(FactorlabError::NoData {
            code: codes.map(|c| c.join(",")).unwrap_or_else(|| "all".into()),
        });
    }
    let panel = PricePanel::from_bars(bars)?;
    let min_bars = bt_config
        .windows
        .long_window
        .max(bt_config.windows.vol_window);
    screen_panel(&panel, codes, min_bars)
}

fn reference_adapter(config: &dyn ConfigPort) -> CsvReferenceAdapter {
    CsvReferenceAdapter::new(
        config.get_path("data", "constituents"),
        config.get_path("data", "risk_free"),
    )
}

/// Constituent windows when a membership file is configured, otherwise every
/// instrument is eligible.
pub fn load_universe(
    reference: &dyn ReferenceDataPort,
) -> Result<Box<dyn UniverseFilter>, FactorlabError> {
    let windows = reference.constituent_windows()?;
    if windows.listed_count() == 0 {
        tracing::info!("no constituent windows configured, every instrument is eligible");
        Ok(Box::new(AllInstruments))
    } else {
        Ok(Box::new(windows))
    }
}

/// Risk-free rate per rebalance period. No configured source means an assumed
/// zero rate; a configured source that cannot be read is a data error.
pub fn load_risk_free(
    reference: &dyn ReferenceDataPort,
    freq: RebalanceFrequency,
) -> Result<RiskFreeRate, FactorlabError> {
    let observations = reference.risk_free_observations()?;
    Ok(RiskFreeRate::from_annual_percent(&observations, freq))
}

fn load_and_validate(config_path: &Path) -> Result<(FileConfigAdapter, BacktestConfig), ExitCode> {
    eprintln!("Loading config from {}", config_path.display());
    let adapter = load_config(config_path)?;
    validate_all(&adapter).map_err(fail)?;
    let bt_config = build_backtest_config(&adapter).map_err(fail)?;
    Ok((adapter, bt_config))
}

fn run_backtest(config_path: &Path, output_path: Option<&Path>) -> ExitCode {
    let (adapter, bt_config) = match load_and_validate(config_path) {
        Ok(loaded) => loaded,
        Err(code) => return code,
    };

    match run_backtest_pipeline(&adapter, &bt_config, output_path) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => fail(e),
    }
}

pub fn run_backtest_pipeline(
    adapter: &dyn ConfigPort,
    bt_config: &BacktestConfig,
    output_path: Option<&Path>,
) -> Result<(), FactorlabError> {
    let codes = resolve_codes(adapter)?;
    let data_port = open_data_port(adapter)?;
    let screened = load_panel(data_port.as_ref(), codes.as_deref(), bt_config)?;
    report_skipped(&screened);

    let reference = reference_adapter(adapter);
    let universe = load_universe(&reference)?;
    let risk_free = load_risk_free(&reference, bt_config.rebalance)?;

    let panel = &screened.panel;
    eprintln!(
        "Running backtest: {} instruments, {} trading days, {} rebalancing",
        panel.instrument_count(),
        panel.timeline().len(),
        bt_config.rebalance,
    );

    let result = backtest_engine::run_backtest(panel, universe.as_ref(), bt_config)?;
    let summary = backtest_engine::analyze(&result, &risk_free, bt_config)?;

    print_summary(&summary, &result, bt_config);
    if adapter.get_bool("output", "print_periods", false) {
        print_periods(&result);
    }

    let returns_path = output_path
        .map(Path::to_path_buf)
        .or_else(|| adapter.get_path("output", "returns"))
        .unwrap_or_else(|| PathBuf::from("returns.csv"));

    let reporter = CsvReportAdapter::new();
    reporter.write_returns(&summary, &result, &returns_path)?;
    eprintln!("\nReturns written to: {}", returns_path.display());

    if let Some(periods_path) = adapter.get_path("output", "periods") {
        reporter.write_periods(&result, &periods_path)?;
        eprintln!("Periods written to: {}", periods_path.display());
    }

    Ok(())
}

fn report_skipped(screened: &ScreenedPanel) {
    let short: Vec<&str> = screened
        .skipped
        .iter()
        .filter(|s| matches!(s.reason, SkipReason::InsufficientBars { .. }))
        .map(|s| s.code.as_str())
        .collect();
    if !short.is_empty() {
        eprintln!(
            "warning: skipping {} instruments with too little history: {}",
            short.len(),
            short.join(", ")
        );
    }
}

fn fmt_pct(value: Option<f64>) -> String {
    value
        .map(|v| format!("{:.2}%", v * 100.0))
        .unwrap_or_else(|| "n/a".into())
}

fn fmt_num(value: Option<f64>) -> String {
    value
        .map(|v| format!("{:.2}", v))
        .unwrap_or_else(|| "n/a".into())
}

fn print_report(title: &str, report: &PerformanceReport) {
    eprintln!("\n=== {} ===", title);
    eprintln!("Total Return:       {}", fmt_pct(report.total_return));
    eprintln!("Annualized Return:  {}", fmt_pct(report.annualized_return));
    eprintln!("Annualized Vol:     {}", fmt_pct(report.annualized_volatility));
    eprintln!("Sharpe Ratio:       {}", fmt_num(report.sharpe_ratio));
    eprintln!("Max Drawdown:       {}", fmt_pct(report.max_drawdown));
    eprintln!("Max DD Duration:    {} days", report.max_drawdown_duration);
}

fn print_summary(summary: &PerformanceSummary, result: &BacktestResult, bt_config: &BacktestConfig) {
    print_report("Strategy", &summary.strategy);
    print_report("Benchmark", &summary.benchmark);

    let capm = &summary.capm;
    eprintln!("\n=== CAPM ===");
    eprintln!(
        "{:<20}{}",
        format!("Alpha ({}):", bt_config.rebalance),
        capm.alpha_pct
            .map(|a| format!("{:.4}%", a))
            .unwrap_or_else(|| "n/a".into())
    );
    eprintln!(
        "Beta:               {}",
        capm.beta
            .map(|b| format!("{:.4}", b))
            .unwrap_or_else(|| "n/a".into())
    );
    eprintln!(
        "R-squared:          {}",
        capm.r_squared
            .map(|r| format!("{:.4}", r))
            .unwrap_or_else(|| "n/a".into())
    );
    eprintln!("Observations:       {}", capm.observations);
    if let Some(failure) = &capm.failure {
        eprintln!("Regression failed:  {}", failure);
    }
    if capm.risk_free_assumed_zero {
        eprintln!("Risk-free rate:     assumed zero");
    }

    eprintln!("\n=== Rebalancing ===");
    eprintln!(
        "Periods:            {} contributed, {} skipped",
        result.contributed_periods(),
        result.skipped_periods()
    );
    eprintln!("Total Turnover:     {}", result.total_turnover());
    if let (Some(first), Some(last)) = (result.strategy.first_date(), result.strategy.last_date()) {
        eprintln!(
            "Trading Days:       {} ({} to {})",
            summary.strategy.observations, first, last
        );
    }
}

fn print_periods(result: &BacktestResult) {
    eprintln!("\n=== Periods ===");
    for p in &result.periods {
        let status = if p.skip_reason().is_some() { "skipped" } else { "ok" };
        eprintln!(
            "  {}:  {} eligible, {} long / {} short, turnover {}, {} days [{}]",
            p.key,
            p.population,
            p.baskets.long.len(),
            p.baskets.short.len(),
            p.turnover
                .map(|t| t.to_string())
                .unwrap_or_else(|| "-".into()),
            p.forward_days,
            status,
        );
        for issue in &p.issues {
            eprintln!("      {}", issue);
        }
    }
}

fn print_config(bt_config: &BacktestConfig) {
    let w = &bt_config.windows;
    let r = &bt_config.ranker;
    eprintln!("\nStrategy:");
    eprintln!(
        "  windows: short {} / long {} / vol {}",
        w.short_window, w.long_window, w.vol_window
    );
    eprintln!(
        "  weights: short momentum {} / long momentum {} / volatility {}",
        r.weights.short_momentum, r.weights.long_momentum, r.weights.volatility
    );
    eprintln!("  selection percentile: {}", r.selection_percentile);
    eprintln!("  min population: {}", r.min_population);

    eprintln!("\nBacktest:");
    eprintln!("  rebalance: {}", bt_config.rebalance);
    eprintln!("  short leg: {}", bt_config.short_leg);
    eprintln!("  transaction cost rate: {}", bt_config.transaction_cost_rate);
    eprintln!("  trading days per year: {}", bt_config.trading_days_per_year);
    let fmt_date = |d: Option<chrono::NaiveDate>| {
        d.map(|d| d.to_string()).unwrap_or_else(|| "open".into())
    };
    eprintln!(
        "  range: {} to {}",
        fmt_date(bt_config.start_date),
        fmt_date(bt_config.end_date)
    );
}

pub fn run_dry_run(config_path: &Path) -> ExitCode {
    let (adapter, bt_config) = match load_and_validate(config_path) {
        Ok(loaded) => loaded,
        Err(code) => return code,
    };
    eprintln!("Config validated successfully");
    print_config(&bt_config);

    let loaded = resolve_codes(&adapter).and_then(|codes| {
        let data_port = open_data_port(&adapter)?;
        load_panel(data_port.as_ref(), codes.as_deref(), &bt_config)
    });
    let screened = match loaded {
        Ok(s) => s,
        Err(e) => return fail(e),
    };
    report_skipped(&screened);

    let periods = backtest_engine::rebalance_periods(&screened.panel, &bt_config);
    eprintln!("\nUniverse:");
    eprintln!("  instruments: {}", screened.panel.instrument_count());
    eprintln!("  trading days: {}", screened.panel.timeline().len());
    match (periods.first(), periods.last()) {
        (Some(first), Some(last)) => eprintln!(
            "  rebalance periods: {} ({} to {}), {} ranked",
            periods.len(),
            first.key,
            last.key,
            periods.len().saturating_sub(1)
        ),
        _ => eprintln!("  rebalance periods: 0"),
    }

    eprintln!("\nDry run complete: configuration is valid");
    ExitCode::SUCCESS
}

fn run_validate(config_path: &Path) -> ExitCode {
    eprintln!("Validating config: {}", config_path.display());
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };

    if let Err(e) = validate_all(&adapter) {
        return fail(e);
    }
    match build_backtest_config(&adapter) {
        Ok(bt_config) => print_config(&bt_config),
        Err(e) => return fail(e),
    }

    eprintln!("\nConfiguration is valid.");
    ExitCode::SUCCESS
}

fn run_info(config_path: &Path, code: Option<&str>) -> ExitCode {
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };
    let data_port = match open_data_port(&config) {
        Ok(p) => p,
        Err(e) => return fail(e),
    };

    if let Some(code) = code {
        return match data_port.get_data_range(code) {
            Ok(Some((min_date, max_date, count))) => {
                println!(
                    "{}: {} bars, {} to {}",
                    code.to_uppercase(),
                    count,
                    min_date,
                    max_date
                );
                ExitCode::SUCCESS
            }
            Ok(None) => fail(FactorlabError::NoData {
                code: code.to_uppercase(),
            }),
            Err(e) => fail(e),
        };
    }

    let bt_config = match build_backtest_config(&config) {
        Ok(c) => c,
        Err(e) => return fail(e),
    };
    let panel = match data_port
        .fetch_bars(None, None, None)
        .and_then(PricePanel::from_bars)
    {
        Ok(p) => p,
        Err(e) => return fail(e),
    };

    let timeline = panel.timeline();
    println!("instruments: {}", panel.instrument_count());
    match (timeline.first(), timeline.last()) {
        (Some(first), Some(last)) => {
            println!("trading days: {} ({} to {})", timeline.len(), first, last)
        }
        _ => println!("trading days: 0"),
    }
    println!(
        "{} periods: {}",
        bt_config.rebalance,
        backtest_engine::rebalance_periods(&panel, &bt_config).len()
    );
    ExitCode::SUCCESS
}

fn run_list_symbols(config_path: &Path) -> ExitCode {
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };

    let symbols = match open_data_port(&config).and_then(|p| p.list_symbols()) {
        Ok(s) => s,
        Err(e) => return fail(e),
    };

    if symbols.is_empty() {
        eprintln!("No symbols found");
    } else {
        for symbol in &symbols {
            println!("{}", symbol);
        }
        eprintln!("{} symbols found", symbols.len());
    }
    ExitCode::SUCCESS
}

fn run_import(config_path: &Path, input: &Path) -> ExitCode {
    #[cfg(feature = "sqlite")]
    {
        let config = match load_config(config_path) {
            Ok(c) => c,
            Err(code) => return code,
        };

        let imported = open_sqlite(&config).and_then(|db| {
            let bars = CsvAdapter::new(input.to_path_buf()).fetch_bars(None, None, None)?;
            db.initialize_schema()?;
            db.insert_bars(&bars)?;
            Ok(bars.len())
        });

        match imported {
            Ok(count) => {
                eprintln!("Imported {} bars from {}", count, input.display());
                ExitCode::SUCCESS
            }
            Err(e) => fail(e),
        }
    }

    #[cfg(not(feature = "sqlite"))]
    {
        let _ = (config_path, input);
        eprintln!("error: sqlite feature is required for import");
        ExitCode::from(1)
    }
}
