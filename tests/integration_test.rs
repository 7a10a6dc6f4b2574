//! Integration tests for the walk-forward backtest.
//!
//! Tests cover:
//! - Two-ticker AUM arithmetic over a single period
//! - Holdings never depend on prices after their rebalance date, whether
//!   later prices are changed or cut off
//! - Repeated runs over the same inputs
//! - Partial universes (failed and empty fetches)
//! - Too few rebalance dates
//! - Full pipeline through the data port, with a future end date clamped
//! - CSV data in, CSV report out
//! - SQLite data source (feature `sqlite`)

mod common;

use approx::assert_relative_eq;
use common::*;
use factortrader::adapters::csv_report_adapter::CsvReportAdapter;
use factortrader::adapters::layered_config::LayeredConfig;
use factortrader::cli;
use factortrader::domain::backtest::BacktestResult;
use factortrader::domain::engine::{WalkForward, run_walk_forward};
use factortrader::domain::error::FactorTraderError;
use factortrader::domain::metrics::PerformanceStats;
use factortrader::domain::strategy::{SelectionDirection, StrategyKind};
use factortrader::domain::universe::{SkipReason, load_universe};
use std::fs;

/// Weekday prices from 2023-11-01, flat at `base` except `last` on 2024-02-29.
fn flat_then_jump(code: &str, base: f64, last: f64) -> PriceSeries {
    let points = weekdays(date(2023, 11, 1), date(2024, 2, 29))
        .into_iter()
        .map(|d| {
            let close = if d == date(2024, 2, 29) { last } else { base };
            PricePoint::new(d, close)
        })
        .collect();
    PriceSeries::new(code, points)
}

fn wavy(code: &str, price: f64, daily: f64, wobble: f64, freq: f64) -> PriceSeries {
    PriceSeries::new(
        code,
        generate_wavy_points(date(2023, 1, 2), date(2024, 12, 31), price, daily, wobble, freq),
    )
}

fn wavy_universe() -> Vec<PriceSeries> {
    vec![
        wavy("A", 100.0, 0.001, 0.05, 0.11),
        wavy("B", 80.0, -0.0005, 0.08, 0.07),
        wavy("C", 60.0, 0.0008, 0.03, 0.23),
        wavy("D", 120.0, 0.0, 0.06, 0.05),
        wavy("E", 40.0, 0.0015, 0.04, 0.17),
        wavy("F", 90.0, -0.001, 0.07, 0.13),
    ]
}

/// Rescales every close strictly after `cutoff` by a ticker-specific wave,
/// leaving dates untouched.
fn perturb_after(universe: &[PriceSeries], cutoff: chrono::NaiveDate) -> Vec<PriceSeries> {
    universe
        .iter()
        .enumerate()
        .map(|(n, s)| {
            let points = s
                .points()
                .iter()
                .enumerate()
                .map(|(i, p)| {
                    if p.date > cutoff {
                        let factor = 1.0 + 0.4 * ((i + 7 * n) as f64 * 0.9).sin();
                        PricePoint::new(p.date, p.close * factor)
                    } else {
                        p.clone()
                    }
                })
                .collect();
            PriceSeries::new(s.code.clone(), points)
        })
        .collect()
}

fn holdings(result: &BacktestResult) -> Vec<Vec<String>> {
    result.periods.iter().map(|p| p.holdings.clone()).collect()
}

mod aum_arithmetic {
    use super::*;

    #[test]
    fn two_tickers_equal_split() {
        let universe = vec![
            flat_then_jump("X", 100.0, 110.0),
            flat_then_jump("Y", 50.0, 49.0),
        ];
        let mut config = sample_config(&["X", "Y"], StrategyKind::momentum(5), 100.0);
        config.end_date = date(2024, 2, 29);

        let result = run_walk_forward(&universe, &config).unwrap();

        assert_eq!(result.periods.len(), 1);
        let period = &result.periods[0];
        assert_eq!(period.start, date(2024, 1, 31));
        assert_eq!(period.end, date(2024, 2, 29));
        assert_eq!(period.holdings, vec!["X", "Y"]);
        assert_relative_eq!(period.returns[0].allocation, 500_000.0);
        assert_relative_eq!(period.returns[0].period_return, 0.10, epsilon = 1e-12);
        assert_relative_eq!(period.returns[1].period_return, -0.02, epsilon = 1e-12);
        assert_relative_eq!(result.final_aum(), 1_040_000.0, epsilon = 1e-6);
        assert_eq!(result.record.len(), 1);
        assert_eq!(result.record.entries()[0].period, "2024-01-31 to 2024-02-29");
    }

    #[test]
    fn stats_for_two_ticker_run() {
        let universe = vec![
            flat_then_jump("X", 100.0, 110.0),
            flat_then_jump("Y", 50.0, 49.0),
        ];
        let mut config = sample_config(&["X", "Y"], StrategyKind::momentum(5), 100.0);
        config.end_date = date(2024, 2, 29);

        let result = run_walk_forward(&universe, &config).unwrap();
        let stats = PerformanceStats::compute(&result, 0.0);

        assert_relative_eq!(stats.pnl, 40_000.0, epsilon = 1e-6);
        assert_relative_eq!(stats.total_return, 4.0, epsilon = 1e-9);
        assert_eq!(stats.max_drawdown, 0.0);
        // one record entry leaves no period-over-period return
        assert!(stats.sharpe_ratio.is_nan());
    }

    #[test]
    fn unchanged_aum_has_zero_return() {
        let universe = vec![
            flat_then_jump("X", 100.0, 100.0),
            flat_then_jump("Y", 50.0, 50.0),
        ];
        let mut config = sample_config(&["X", "Y"], StrategyKind::momentum(5), 50.0);
        config.end_date = date(2024, 2, 29);

        let result = run_walk_forward(&universe, &config).unwrap();
        let stats = PerformanceStats::compute(&result, 0.0);

        assert_eq!(stats.total_return, 0.0);
        assert_eq!(stats.annualized_return, 0.0);
        // equal scores tie, ascending ticker wins
        assert_eq!(result.periods[0].holdings, vec!["X"]);
    }

    #[test]
    fn each_period_compounds_the_last() {
        let universe = vec![
            generate_series("UP", 100.0, 0.002),
            generate_series("FLAT", 50.0, 0.0),
            generate_series("DOWN", 80.0, -0.001),
        ];
        let config = sample_config(&["UP", "FLAT", "DOWN"], StrategyKind::momentum(40), 34.0);
        let result = run_walk_forward(&universe, &config).unwrap();

        let mut aum = config.initial_aum;
        for (period, entry) in result.periods.iter().zip(result.record.entries()) {
            assert_relative_eq!(period.aum_before, aum, epsilon = 1e-6);
            assert_relative_eq!(period.aum_after, entry.aum, epsilon = 1e-6);
            aum = period.aum_after;
        }
        assert!(result.final_aum() > config.initial_aum);
    }
}

mod no_lookahead {
    use super::*;

    fn assert_prefix_stable(strategy: StrategyKind, top_pct: f64) {
        let universe = wavy_universe();
        let codes = ["A", "B", "C", "D", "E", "F"];
        let config = sample_config(&codes, strategy, top_pct);
        let baseline = run_walk_forward(&universe, &config).unwrap();
        assert!(baseline.periods.len() >= 4);

        for (i, period) in baseline.periods.iter().enumerate() {
            let perturbed = perturb_after(&universe, period.start);
            let rerun = run_walk_forward(&perturbed, &config).unwrap();
            assert_eq!(
                holdings(&rerun)[..=i],
                holdings(&baseline)[..=i],
                "holdings changed after perturbing prices past {}",
                period.start
            );
        }
    }

    #[test]
    fn momentum_holdings_ignore_future_prices() {
        assert_prefix_stable(StrategyKind::momentum(30), 50.0);
    }

    #[test]
    fn reversal_holdings_ignore_future_prices() {
        assert_prefix_stable(StrategyKind::reversal(10), 34.0);
    }

    #[test]
    fn blended_holdings_ignore_future_prices() {
        assert_prefix_stable(
            StrategyKind::Blended(vec![StrategyKind::momentum(20), StrategyKind::reversal(5)]),
            34.0,
        );
    }

    #[test]
    fn history_cut_at_period_end_reproduces_prefix() {
        let universe = wavy_universe();
        let config = sample_config(
            &["A", "B", "C", "D", "E", "F"],
            StrategyKind::Blended(vec![StrategyKind::momentum(20), StrategyKind::reversal(5)]),
            34.0,
        );
        let baseline = run_walk_forward(&universe, &config).unwrap();

        for (i, period) in baseline.periods.iter().enumerate() {
            let cut: Vec<PriceSeries> = universe.iter().map(|s| s.truncated_after(period.end)).collect();
            let rerun = run_walk_forward(&cut, &config).unwrap();
            assert_eq!(rerun.periods.len(), i + 1);
            assert_eq!(rerun.periods[..], baseline.periods[..=i]);
        }
    }

    #[test]
    fn perturbation_does_change_later_periods() {
        let universe = wavy_universe();
        let config = sample_config(&["A", "B", "C", "D", "E", "F"], StrategyKind::reversal(10), 34.0);
        let baseline = run_walk_forward(&universe, &config).unwrap();
        let perturbed = perturb_after(&universe, baseline.periods[0].start);
        let rerun = run_walk_forward(&perturbed, &config).unwrap();
        assert_ne!(rerun.record, baseline.record);
    }
}

mod idempotence {
    use super::*;

    #[test]
    fn repeated_runs_produce_identical_records() {
        let universe = wavy_universe();
        let config = sample_config(&["A", "B", "C", "D", "E", "F"], StrategyKind::momentum(30), 50.0);

        let first = run_walk_forward(&universe, &config).unwrap();
        let second = run_walk_forward(&universe, &config).unwrap();

        assert_eq!(first.record, second.record);
        assert_eq!(holdings(&first), holdings(&second));
    }

    #[test]
    fn iterator_matches_driver() {
        let universe = wavy_universe();
        let config = sample_config(&["A", "B", "C", "D", "E", "F"], StrategyKind::reversal(10), 50.0);

        let driven = run_walk_forward(&universe, &config).unwrap();
        let stepped: Vec<_> = WalkForward::new(&universe, &config)
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();

        assert_eq!(stepped, driven.periods);
    }
}

mod partial_universe {
    use super::*;

    #[test]
    fn failed_and_empty_codes_are_skipped() {
        let port = MockDataPort::new()
            .with_points("UP", generate_points(date(2023, 6, 1), date(2024, 6, 30), 100.0, 0.002))
            .with_points("DOWN", generate_points(date(2023, 6, 1), date(2024, 6, 30), 80.0, -0.001))
            .with_points("EMPTY", vec![])
            .with_error("BROKEN", "connection reset");
        let codes: Vec<String> = ["UP", "BROKEN", "DOWN", "EMPTY"]
            .iter()
            .map(|c| c.to_string())
            .collect();

        let loaded = load_universe(&port, &codes, date(2023, 6, 1), date(2024, 6, 30)).unwrap();

        assert_eq!(loaded.codes(), vec!["UP", "DOWN"]);
        assert_eq!(loaded.skipped.len(), 2);
        assert_eq!(loaded.skipped[0].code, "BROKEN");
        assert!(matches!(loaded.skipped[0].reason, SkipReason::FetchFailed(_)));
        assert_eq!(loaded.skipped[1].reason, SkipReason::NoData);

        let config = sample_config(&["UP", "DOWN"], StrategyKind::momentum(20), 50.0);
        let result = run_walk_forward(&loaded.series, &config).unwrap();
        assert!(result.periods.iter().all(|p| p.holdings == vec!["UP"]));
    }

    #[test]
    fn nothing_loaded_is_data_source_error() {
        let port = MockDataPort::new().with_error("BROKEN", "timeout");
        let err = load_universe(&port, &["BROKEN".to_string()], date(2024, 1, 1), date(2024, 6, 30))
            .unwrap_err();
        assert!(matches!(err, FactorTraderError::DataSource { .. }));
    }

    #[test]
    fn late_listing_joins_when_history_allows() {
        let universe = vec![
            generate_series("OLD", 100.0, 0.001),
            PriceSeries::new(
                "NEW",
                generate_points(date(2024, 3, 1), date(2024, 6, 30), 10.0, 0.01),
            ),
        ];
        let config = sample_config(&["OLD", "NEW"], StrategyKind::reversal(10), 100.0);
        let result = run_walk_forward(&universe, &config).unwrap();

        let first = &result.periods[0];
        assert_eq!(first.holdings, vec!["OLD"]);
        assert_eq!(first.excluded.len(), 1);
        assert_eq!(first.excluded[0].code, "NEW");

        let last = result.periods.last().unwrap();
        assert!(last.excluded.is_empty());
        assert_eq!(last.holdings.len(), 2);
    }
}

mod insufficient_periods {
    use super::*;

    #[test]
    fn single_month_range_fails() {
        let universe = vec![generate_series("A", 100.0, 0.001)];
        let mut config = sample_config(&["A"], StrategyKind::momentum(10), 100.0);
        config.start_date = date(2024, 3, 1);
        config.end_date = date(2024, 3, 29);

        let err = run_walk_forward(&universe, &config).unwrap_err();
        assert!(matches!(err, FactorTraderError::InsufficientPeriods { found: 1 }));
    }

    #[test]
    fn range_outside_data_fails() {
        let universe = vec![generate_series("A", 100.0, 0.001)];
        let mut config = sample_config(&["A"], StrategyKind::momentum(10), 100.0);
        config.start_date = date(2025, 3, 1);
        config.end_date = date(2025, 6, 30);

        let err = run_walk_forward(&universe, &config).unwrap_err();
        assert!(matches!(err, FactorTraderError::InsufficientPeriods { found: 0 }));
    }
}

mod pipeline {
    use super::*;

    fn port() -> MockDataPort {
        MockDataPort::new()
            .with_points("UP", generate_points(date(2023, 1, 2), date(2024, 12, 31), 100.0, 0.002))
            .with_points("FLAT", generate_points(date(2023, 1, 2), date(2024, 12, 31), 50.0, 0.0))
            .with_points("DOWN", generate_points(date(2023, 1, 2), date(2024, 12, 31), 80.0, -0.001))
    }

    #[test]
    fn future_end_is_clamped_to_today() {
        let mut config = sample_config(&["UP", "FLAT", "DOWN"], StrategyKind::momentum(30), 34.0);
        config.end_date = date(2024, 12, 31);

        let run = cli::run_backtest_pipeline(&port(), &config, date(2024, 6, 15)).unwrap();

        assert_eq!(run.config.end_date, date(2024, 6, 15));
        assert_eq!(run.result.last_trading_day, date(2024, 6, 14));
        assert_eq!(run.result.periods.last().unwrap().end, date(2024, 6, 14));
        assert_eq!(run.result.periods.len(), 5);
        assert!(run.skipped.is_empty());
    }

    #[test]
    fn future_start_is_rejected() {
        let config = sample_config(&["UP"], StrategyKind::momentum(30), 100.0);
        let err = cli::run_backtest_pipeline(&port(), &config, date(2023, 12, 1)).unwrap_err();
        assert!(matches!(err, FactorTraderError::ConfigInvalid { .. }));
    }

    #[test]
    fn skipped_codes_are_reported() {
        let port = port().with_error("GONE", "delisted");
        let config = sample_config(&["UP", "GONE", "DOWN"], StrategyKind::reversal(10), 50.0);

        let run = cli::run_backtest_pipeline(&port, &config, date(2025, 1, 1)).unwrap();

        assert_eq!(run.config.codes, vec!["UP", "DOWN"]);
        assert_eq!(run.skipped.len(), 1);
        assert_eq!(run.skipped[0].code, "GONE");
        assert!(run.result.periods.iter().all(|p| p.holdings == vec!["DOWN"]));
    }

    #[test]
    fn selection_override_reaches_engine() {
        let mut config = sample_config(&["UP", "FLAT", "DOWN"], StrategyKind::momentum(30), 34.0);
        config.selection = SelectionDirection::Bottom;

        let run = cli::run_backtest_pipeline(&port(), &config, date(2025, 1, 1)).unwrap();
        assert!(run.result.periods.iter().all(|p| p.holdings == vec!["DOWN"]));
        assert!(run.stats.final_aum < config.initial_aum);
    }
}

mod csv_end_to_end {
    use super::*;
    use tempfile::TempDir;

    fn write_prices(dir: &std::path::Path, code: &str, points: &[PricePoint]) {
        let mut body = String::from("date,close,dividend\n");
        for p in points {
            body.push_str(&format!("{},{},{}\n", p.date.format("%Y%m%d"), p.close, p.dividend));
        }
        fs::write(dir.join(format!("{code}.csv")), body).unwrap();
    }

    #[test]
    fn csv_prices_to_csv_report() {
        let dir = TempDir::new().unwrap();
        write_prices(
            dir.path(),
            "AAA",
            &generate_points(date(2023, 6, 1), date(2024, 6, 28), 100.0, 0.001),
        );
        write_prices(
            dir.path(),
            "BBB",
            &generate_points(date(2023, 6, 1), date(2024, 6, 28), 40.0, -0.0005),
        );

        let mut layered = LayeredConfig::new(None);
        layered.set("data", "source", "csv");
        layered.set("data", "path", dir.path().display().to_string());
        let port = cli::open_data_port(&layered).unwrap();

        let config = sample_config(&["AAA", "BBB"], StrategyKind::momentum(20), 50.0);
        let run = cli::run_backtest_pipeline(port.as_ref(), &config, date(2025, 1, 1)).unwrap();
        assert!(run.result.periods.iter().all(|p| p.holdings == vec!["AAA"]));

        let out = dir.path().join("aum.csv");
        cli::write_report(&run, &out).unwrap();

        let periods = fs::read_to_string(&out).unwrap();
        assert_eq!(periods.lines().count(), run.result.periods.len() + 1);
        assert!(periods.lines().nth(1).unwrap().starts_with("2024-01-31 to 2024-02-29"));

        let summary = fs::read_to_string(CsvReportAdapter::summary_path(&out)).unwrap();
        assert!(summary.starts_with("metric,value\n"));
        assert!(summary.contains("final_aum,"));
        assert!(summary.contains(&format!("periods,{}", run.result.periods.len())));
    }

    #[test]
    fn dividends_lift_returns_when_enabled() {
        let dir = TempDir::new().unwrap();
        let mut points = generate_points(date(2023, 6, 1), date(2024, 6, 28), 100.0, 0.0);
        for p in points.iter_mut().filter(|p| p.date == date(2024, 2, 15)) {
            p.dividend = 2.0;
        }
        write_prices(dir.path(), "DIV", &points);

        let port = factortrader::adapters::csv_adapter::CsvAdapter::new(dir.path().to_path_buf());
        let mut config = sample_config(&["DIV"], StrategyKind::momentum(20), 100.0);

        let without = cli::run_backtest_pipeline(&port, &config, date(2025, 1, 1)).unwrap();
        config.include_dividends = true;
        let with = cli::run_backtest_pipeline(&port, &config, date(2025, 1, 1)).unwrap();

        assert_relative_eq!(without.stats.final_aum, 1_000_000.0, epsilon = 1e-6);
        assert_relative_eq!(with.stats.final_aum, 1_020_000.0, epsilon = 1e-6);
    }
}

#[cfg(feature = "sqlite")]
mod sqlite_source {
    use super::*;
    use factortrader::adapters::sqlite_adapter::SqliteAdapter;
    use factortrader::ports::data_port::DataPort;
    use tempfile::TempDir;

    #[test]
    fn pipeline_over_sqlite_file() {
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("prices.db");
        let adapter = SqliteAdapter::open(db.to_str().unwrap(), 2).unwrap();
        adapter.initialize_schema().unwrap();
        adapter
            .insert_prices("UP", &generate_points(date(2023, 1, 2), date(2024, 6, 28), 100.0, 0.002))
            .unwrap();
        adapter
            .insert_prices("DOWN", &generate_points(date(2023, 1, 2), date(2024, 6, 28), 80.0, -0.001))
            .unwrap();

        assert_eq!(adapter.list_symbols().unwrap(), vec!["DOWN", "UP"]);

        let config = sample_config(&["UP", "DOWN"], StrategyKind::reversal(10), 50.0);
        let run = cli::run_backtest_pipeline(&adapter, &config, date(2025, 1, 1)).unwrap();

        assert_eq!(run.result.periods.len(), 5);
        assert!(run.result.periods.iter().all(|p| p.holdings == vec!["DOWN"]));
    }

    #[test]
    fn open_data_port_selects_sqlite() {
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("prices.db");
        SqliteAdapter::open(db.to_str().unwrap(), 1)
            .unwrap()
            .initialize_schema()
            .unwrap();

        let mut layered = LayeredConfig::new(None);
        layered.set("data", "source", "sqlite");
        layered.set("data", "path", db.display().to_string());
        let port = cli::open_data_port(&layered).unwrap();
        assert!(port.list_symbols().unwrap().is_empty());
    }
}
