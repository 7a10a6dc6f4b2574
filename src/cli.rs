//! CLI definition and dispatch.

use chrono::{Local, NaiveDate};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use crate::adapters::csv_adapter::CsvAdapter;
use crate::adapters::csv_report_adapter::{CsvReportAdapter, format_value};
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::layered_config::LayeredConfig;
use crate::adapters::series_calendar::SeriesCalendar;
use crate::domain::backtest::{BacktestConfig, BacktestResult, DEFAULT_RISK_FREE_RATE};
use crate::domain::config_validation::{
    parse_date, validate_backtest_config, validate_date_range, validate_strategy_config,
};
use crate::domain::engine::run_walk_forward;
use crate::domain::error::FactorTraderError;
use crate::domain::metrics::PerformanceStats;
use crate::domain::strategy::{SelectionDirection, StrategyKind};
use crate::domain::universe::{SkippedCode, load_universe, parse_codes};
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::DataPort;
use crate::ports::report_port::ReportPort;

#[derive(Parser, Debug)]
#[command(name = "factortrader", about = "Cross-sectional factor strategy backtester")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// Where price data comes from. Overrides `[data]` in the config file.
#[derive(Args, Debug, Default, Clone)]
pub struct DataSourceArgs {
    /// Directory of CODE.csv files
    #[arg(long, conflicts_with = "db")]
    pub data_dir: Option<PathBuf>,
    /// SQLite database file
    #[arg(long)]
    pub db: Option<PathBuf>,
}

/// Command-line values that take precedence over the config file.
#[derive(Args, Debug, Default, Clone)]
pub struct Overrides {
    /// Comma-separated ticker list
    #[arg(long)]
    pub tickers: Option<String>,
    /// Start date (YYYYMMDD)
    #[arg(short = 'b', long = "begin")]
    pub begin: Option<String>,
    /// End date (YYYYMMDD)
    #[arg(short = 'e', long = "end")]
    pub end: Option<String>,
    #[arg(long)]
    pub initial_aum: Option<f64>,
    /// M (momentum) or R (reversal)
    #[arg(long)]
    pub strategy1: Option<String>,
    #[arg(long)]
    pub days1: Option<i64>,
    #[arg(long)]
    pub gap1: Option<i64>,
    /// Second factor; enables regression blending
    #[arg(long)]
    pub strategy2: Option<String>,
    #[arg(long)]
    pub days2: Option<i64>,
    #[arg(long)]
    pub gap2: Option<i64>,
    #[arg(long)]
    pub top_pct: Option<f64>,
    /// top or bottom
    #[arg(long)]
    pub selection: Option<String>,
    #[arg(long)]
    pub risk_free_rate: Option<f64>,
    #[arg(long)]
    pub include_dividends: bool,
    #[command(flatten)]
    pub data: DataSourceArgs,
}

impl Overrides {
    pub fn apply(&self, layered: &mut LayeredConfig<'_>) {
        layered.set_opt("backtest", "codes", self.tickers.as_ref());
        layered.set_opt("backtest", "start_date", self.begin.as_ref());
        layered.set_opt("backtest", "end_date", self.end.as_ref());
        layered.set_opt("backtest", "initial_aum", self.initial_aum);
        layered.set_opt("backtest", "top_pct", self.top_pct);
        layered.set_opt("backtest", "selection", self.selection.as_ref());
        layered.set_opt("backtest", "risk_free_rate", self.risk_free_rate);
        if self.include_dividends {
            layered.set("backtest", "include_dividends", "true");
        }
        layered.set_opt("strategy", "strategy1", self.strategy1.as_ref());
        layered.set_opt("strategy", "days1", self.days1);
        layered.set_opt("strategy", "gap1", self.gap1);
        layered.set_opt("strategy", "strategy2", self.strategy2.as_ref());
        layered.set_opt("strategy", "days2", self.days2);
        layered.set_opt("strategy", "gap2", self.gap2);
        self.data.apply(layered);
    }
}

impl DataSourceArgs {
    pub fn apply(&self, layered: &mut LayeredConfig<'_>) {
        if let Some(dir) = &self.data_dir {
            layered.set("data", "source", "csv");
            layered.set("data", "path", dir.display().to_string());
        }
        if let Some(db) = &self.db {
            layered.set("data", "source", "sqlite");
            layered.set("data", "path", db.display().to_string());
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a walk-forward backtest
    Backtest {
        #[arg(short, long)]
        config: Option<PathBuf>,
        #[command(flatten)]
        overrides: Overrides,
        /// CSV file for the per-period AUM series
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
    /// List symbols available in the data source
    ListSymbols {
        #[arg(short, long)]
        config: Option<PathBuf>,
        #[command(flatten)]
        data: DataSourceArgs,
    },
    /// Show data range for symbol(s)
    Info {
        #[arg(long)]
        code: Option<String>,
        #[arg(short, long)]
        config: Option<PathBuf>,
        #[command(flatten)]
        data: DataSourceArgs,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Command::Backtest {
            config,
            overrides,
            output,
            dry_run,
        } => run_backtest(config.as_ref(), &overrides, output.as_ref(), dry_run),
        Command::Validate { config } => run_validate(&config),
        Command::ListSymbols { config, data } => run_list_symbols(config.as_ref(), &data),
        Command::Info { code, config, data } => run_info(code.as_deref(), config.as_ref(), &data),
    }
}

fn fail(e: &FactorTraderError) -> ExitCode {
    eprintln!("error: {e}");
    e.into()
}

pub fn load_config(path: &PathBuf) -> Result<FileConfigAdapter, ExitCode> {
    FileConfigAdapter::from_file(path).map_err(|e| fail(&e))
}

fn load_optional_config(path: Option<&PathBuf>) -> Result<Option<FileConfigAdapter>, ExitCode> {
    match path {
        Some(p) => {
            eprintln!("Loading config from {}", p.display());
            load_config(p).map(Some)
        }
        None => Ok(None),
    }
}

/// Everything a finished backtest produced.
#[derive(Debug)]
pub struct BacktestRun {
    pub config: BacktestConfig,
    pub result: BacktestResult,
    pub stats: PerformanceStats,
    pub skipped: Vec<SkippedCode>,
}

fn run_backtest(
    config_path: Option<&PathBuf>,
    overrides: &Overrides,
    output_path: Option<&PathBuf>,
    dry_run: bool,
) -> ExitCode {
    // Stage 1: Load config file, then layer command-line overrides
    let file = match load_optional_config(config_path) {
        Ok(f) => f,
        Err(code) => return code,
    };
    let mut layered = LayeredConfig::new(file.as_ref().map(|f| f as &dyn ConfigPort));
    overrides.apply(&mut layered);

    // Stage 2: Validate
    if let Err(e) = validate_backtest_config(&layered).and_then(|_| validate_strategy_config(&layered)) {
        return fail(&e);
    }

    // Stage 3: Build BacktestConfig
    let bt_config = match build_backtest_config(&layered) {
        Ok(c) => c,
        Err(e) => return fail(&e),
    };

    if dry_run {
        print_config(&bt_config);
        eprintln!("\nDry run complete: configuration is valid");
        return ExitCode::SUCCESS;
    }

    // Stage 4: Open data source
    let data_port = match open_data_port(&layered) {
        Ok(p) => p,
        Err(e) => return fail(&e),
    };

    // Stages 5-8: calendar, universe, walk-forward, statistics
    let today = Local::now().date_naive();
    let run = match run_backtest_pipeline(data_port.as_ref(), &bt_config, today) {
        Ok(r) => r,
        Err(e) => return fail(&e),
    };

    // Stage 9: Console summary
    print_summary(&run);

    // Stage 10: Report
    let output = output_path
        .cloned()
        .unwrap_or_else(|| PathBuf::from("performance.csv"));
    match write_report(&run, &output) {
        Ok(()) => {
            eprintln!("\nReport written to: {}", output.display());
            eprintln!(
                "Summary written to: {}",
                CsvReportAdapter::summary_path(&output).display()
            );
            ExitCode::SUCCESS
        }
        Err(e) => fail(&e),
    }
}

/// Resolves the date range, loads prices and runs the engine.
pub fn run_backtest_pipeline(
    data_port: &dyn DataPort,
    bt_config: &BacktestConfig,
    today: NaiveDate,
) -> Result<BacktestRun, FactorTraderError> {
    let calendar = SeriesCalendar::new(data_port, bt_config.codes.clone());
    let (start_date, end_date) =
        validate_date_range(bt_config.start_date, bt_config.end_date, today, &calendar)?;
    let mut config = BacktestConfig {
        start_date,
        end_date,
        ..bt_config.clone()
    };

    eprintln!(
        "Loading {} codes from {} (history from {})",
        config.codes.len(),
        config.start_date,
        config.history_start()
    );
    let loaded = load_universe(data_port, &config.codes, config.history_start(), config.end_date)?;
    config.codes = loaded.codes();

    eprintln!(
        "Running backtest: {} codes, {} to {}, {}",
        config.codes.len(),
        config.start_date,
        config.end_date,
        config.strategy
    );
    let result = run_walk_forward(&loaded.series, &config)?;
    let stats = PerformanceStats::compute(&result, config.risk_free_rate);

    Ok(BacktestRun {
        config,
        result,
        stats,
        skipped: loaded.skipped,
    })
}

pub fn open_data_port(config: &dyn ConfigPort) -> Result<Box<dyn DataPort>, FactorTraderError> {
    let source = config
        .get_string("data", "source")
        .unwrap_or_else(|| "csv".to_string());
    let path = config
        .get_string("data", "path")
        .ok_or_else(|| FactorTraderError::ConfigMissing {
            section: "data".into(),
            key: "path".into(),
        })?;

    match source.trim().to_lowercase().as_str() {
        "csv" => Ok(Box::new(CsvAdapter::new(PathBuf::from(path)))),
        #[cfg(feature = "sqlite")]
        "sqlite" => Ok(Box::new(
            crate::adapters::sqlite_adapter::SqliteAdapter::from_config(config)?,
        )),
        #[cfg(not(feature = "sqlite"))]
        "sqlite" => Err(FactorTraderError::ConfigInvalid {
            section: "data".into(),
            key: "source".into(),
            reason: "built without the sqlite feature".into(),
        }),
        other => Err(FactorTraderError::ConfigInvalid {
            section: "data".into(),
            key: "source".into(),
            reason: format!("unknown data source '{other}', expected csv or sqlite"),
        }),
    }
}

fn config_invalid(section: &str, key: &str, reason: impl Into<String>) -> FactorTraderError {
    FactorTraderError::ConfigInvalid {
        section: section.into(),
        key: key.into(),
        reason: reason.into(),
    }
}

pub fn build_backtest_config(adapter: &dyn ConfigPort) -> Result<BacktestConfig, FactorTraderError> {
    let codes_str = adapter
        .get_string("backtest", "codes")
        .ok_or_else(|| FactorTraderError::ConfigMissing {
            section: "backtest".into(),
            key: "codes".into(),
        })?;
    let codes = parse_codes(&codes_str)?;

    let start_date = parse_date(adapter.get_string("backtest", "start_date").as_deref(), "start_date")?;
    let end_date = parse_date(adapter.get_string("backtest", "end_date").as_deref(), "end_date")?;

    let strategy = build_strategy(adapter)?;
    let selection = match adapter.get_string("backtest", "selection") {
        Some(s) => SelectionDirection::parse(&s)
            .ok_or_else(|| config_invalid("backtest", "selection", format!("unknown selection '{s}'")))?,
        None => strategy.default_direction(),
    };

    let config = BacktestConfig {
        codes,
        start_date,
        end_date,
        initial_aum: adapter.get_double("backtest", "initial_aum", 0.0),
        strategy,
        top_pct: adapter.get_double("backtest", "top_pct", 0.0),
        selection,
        risk_free_rate: adapter.get_double("backtest", "risk_free_rate", DEFAULT_RISK_FREE_RATE),
        include_dividends: adapter.get_bool("backtest", "include_dividends", false),
    };
    config.validate()?;
    Ok(config)
}

/// One factor from `strategyN`/`daysN`/`gapN`.
fn build_factor(adapter: &dyn ConfigPort, n: u8) -> Result<StrategyKind, FactorTraderError> {
    let kind_key = format!("strategy{n}");
    let days_key = format!("days{n}");
    let gap_key = format!("gap{n}");

    let code = adapter
        .get_string("strategy", &kind_key)
        .ok_or_else(|| FactorTraderError::ConfigMissing {
            section: "strategy".into(),
            key: kind_key.clone(),
        })?;
    let days = adapter.get_int("strategy", &days_key, 0);
    if days < 1 {
        return Err(config_invalid("strategy", &days_key, "lookback must be at least 1"));
    }
    let gap = match adapter.get_string("strategy", &gap_key) {
        Some(raw) => Some(
            raw.trim()
                .parse::<usize>()
                .map_err(|_| config_invalid("strategy", &gap_key, "gap must be a non-negative integer"))?,
        ),
        None => None,
    };

    StrategyKind::from_code(&code, days as usize, gap)
        .ok_or_else(|| config_invalid("strategy", &kind_key, format!("unknown strategy '{code}'")))
}

pub fn build_strategy(adapter: &dyn ConfigPort) -> Result<StrategyKind, FactorTraderError> {
    let first = build_factor(adapter, 1)?;
    match adapter.get_string("strategy", "strategy2") {
        Some(s) if !s.trim().is_empty() => {
            let second = build_factor(adapter, 2)?;
            Ok(StrategyKind::Blended(vec![first, second]))
        }
        _ => Ok(first),
    }
}

fn print_config(config: &BacktestConfig) {
    eprintln!("\nBacktest:");
    eprintln!("  codes:       {}", config.codes.join(", "));
    eprintln!("  range:       {} to {}", config.start_date, config.end_date);
    eprintln!("  history:     from {}", config.history_start());
    eprintln!("  initial AUM: {:.2}", config.initial_aum);
    eprintln!("  strategy:    {}", config.strategy);
    eprintln!("  selection:   {} {}%", config.selection, config.top_pct);
    eprintln!("  dividends:   {}", config.include_dividends);
}

fn print_summary(run: &BacktestRun) {
    let stats = &run.stats;

    if !run.skipped.is_empty() {
        eprintln!("\n=== Skipped Codes ===");
        for s in &run.skipped {
            eprintln!("  {}: {:?}", s.code, s.reason);
        }
    }

    eprintln!("\n=== Results ===");
    eprintln!("Periods:          {}", run.result.periods.len());
    eprintln!("Initial AUM:      {:.2}", stats.initial_aum);
    eprintln!("Final AUM:        {:.2}", stats.final_aum);
    eprintln!("PnL:              {:.2}", stats.pnl);
    eprintln!("Total Return:     {}%", format_value(stats.total_return, 2));
    eprintln!(
        "Annualized:       {}%",
        format_value(stats.annualized_return * 100.0, 2)
    );
    eprintln!("Sharpe Ratio:     {}", format_value(stats.sharpe_ratio, 2));
    eprintln!("Max Drawdown:     -{:.1}%", stats.max_drawdown * 100.0);

    if let Some(fit) = run.result.periods.last().and_then(|p| p.fit.as_ref()) {
        eprintln!("\n=== Last Blend Fit ===");
        eprintln!(
            "  intercept {} (t {})",
            format_value(fit.intercept, 4),
            format_value(fit.t_values[0], 2)
        );
        for (i, b) in fit.coefficients.iter().enumerate() {
            eprintln!(
                "  factor {}  {} (t {})",
                i + 1,
                format_value(*b, 4),
                format_value(fit.t_values[i + 1], 2)
            );
        }
    }
}

fn run_validate(config_path: &PathBuf) -> ExitCode {
    eprintln!("Validating config: {}", config_path.display());
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };

    if let Err(e) = validate_backtest_config(&adapter).and_then(|_| validate_strategy_config(&adapter)) {
        return fail(&e);
    }

    match build_backtest_config(&adapter) {
        Ok(config) => {
            print_config(&config);
            eprintln!("\nConfiguration is valid.");
            ExitCode::SUCCESS
        }
        Err(e) => fail(&e),
    }
}

fn data_port_for(
    config_path: Option<&PathBuf>,
    data: &DataSourceArgs,
) -> Result<(Option<FileConfigAdapter>, Box<dyn DataPort>), ExitCode> {
    let file = load_optional_config(config_path)?;
    let mut layered = LayeredConfig::new(file.as_ref().map(|f| f as &dyn ConfigPort));
    data.apply(&mut layered);
    let port = open_data_port(&layered).map_err(|e| fail(&e))?;
    Ok((file, port))
}

fn run_list_symbols(config_path: Option<&PathBuf>, data: &DataSourceArgs) -> ExitCode {
    let (_, port) = match data_port_for(config_path, data) {
        Ok(p) => p,
        Err(code) => return code,
    };

    let symbols = match port.list_symbols() {
        Ok(s) => s,
        Err(e) => return fail(&e),
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

fn run_info(code: Option<&str>, config_path: Option<&PathBuf>, data: &DataSourceArgs) -> ExitCode {
    let (file, port) = match data_port_for(config_path, data) {
        Ok(p) => p,
        Err(code) => return code,
    };

    let codes = match (code, file.as_ref()) {
        (Some(_), _) | (None, None) => resolve_codes(code, &LayeredConfig::new(None)),
        (None, Some(f)) => resolve_codes(None, f),
    };
    if codes.is_empty() {
        eprintln!("error: no codes given (use --code or set [backtest] codes)");
        return ExitCode::from(2);
    }

    for c in &codes {
        match port.get_data_range(c) {
            Ok(Some((min_date, max_date, count))) => {
                println!("{}: {} rows, {} to {}", c, count, min_date, max_date);
            }
            Ok(None) => {
                eprintln!("{}: no data found", c);
            }
            Err(e) => {
                eprintln!("error querying {}: {}", c, e);
            }
        }
    }
    ExitCode::SUCCESS
}

pub fn resolve_codes(code_override: Option<&str>, config: &dyn ConfigPort) -> Vec<String> {
    if let Some(c) = code_override {
        return vec![c.trim().to_uppercase()];
    }

    config
        .get_string("backtest", "codes")
        .map(|codes_str| {
            codes_str
                .split(',')
                .map(|s| s.trim().to_uppercase())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

/// Writes the report for an already computed run.
pub fn write_report(run: &BacktestRun, output: &Path) -> Result<(), FactorTraderError> {
    CsvReportAdapter::new().write(&run.result, &run.stats, &output.display().to_string())
}
