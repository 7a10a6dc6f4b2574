//! CSV report adapter implementing ReportPort.
//!
//! Writes the per-period AUM series to `output_path` and the summary
//! statistics to a sibling `<stem>_summary.csv`.

use crate::domain::backtest::BacktestResult;
use crate::domain::error::FactorTraderError;
use crate::domain::metrics::PerformanceStats;
use crate::ports::report_port::ReportPort;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Renders `NaN` as `undefined`.
pub fn format_value(value: f64, decimals: usize) -> String {
    if value.is_nan() {
        "undefined".to_string()
    } else {
        format!("{value:.decimals$}")
    }
}

#[derive(Debug, Serialize)]
struct PeriodRow<'a> {
    period: &'a str,
    start: String,
    end: String,
    holdings: String,
    aum_before: f64,
    aum_after: f64,
    period_return: f64,
    cumulative_return: Option<f64>,
    excluded: usize,
    unrealized: String,
}

#[derive(Debug, Serialize)]
struct SummaryRow {
    metric: String,
    value: String,
}

pub struct CsvReportAdapter;

impl CsvReportAdapter {
    pub fn new() -> Self {
        Self
    }

    pub fn summary_path(output_path: &Path) -> PathBuf {
        let stem = output_path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("report");
        output_path.with_file_name(format!("{stem}_summary.csv"))
    }

    fn write_periods(
        result: &BacktestResult,
        stats: &PerformanceStats,
        path: &Path,
    ) -> Result<(), FactorTraderError> {
        let cumulative: HashMap<&str, f64> = stats
            .cumulative_returns
            .iter()
            .map(|(label, r)| (label.as_str(), *r))
            .collect();
        let mut wtr = csv::Writer::from_path(path).map_err(csv_error)?;
        for p in &result.periods {
            wtr.serialize(PeriodRow {
                period: &p.label,
                start: p.start.to_string(),
                end: p.end.to_string(),
                holdings: p.holdings.join(";"),
                aum_before: p.aum_before,
                aum_after: p.aum_after,
                period_return: p.aum_after / p.aum_before - 1.0,
                cumulative_return: cumulative.get(p.label.as_str()).copied(),
                excluded: p.excluded.len(),
                unrealized: p.unrealized.join(";"),
            })
            .map_err(csv_error)?;
        }
        wtr.flush()?;
        Ok(())
    }

    fn write_summary(
        result: &BacktestResult,
        stats: &PerformanceStats,
        path: &Path,
    ) -> Result<(), FactorTraderError> {
        let mut rows: Vec<(String, String)> = [
            ("initial_aum", format_value(stats.initial_aum, 2)),
            ("final_aum", format_value(stats.final_aum, 2)),
            ("pnl", format_value(stats.pnl, 2)),
            ("total_return_pct", format_value(stats.total_return, 4)),
            ("annualized_return", format_value(stats.annualized_return, 6)),
            ("elapsed_days", stats.elapsed_days.to_string()),
            ("average_aum", format_value(stats.average_aum, 2)),
            ("max_aum", format_value(stats.max_aum, 2)),
            ("average_period_return", format_value(stats.average_period_return, 6)),
            ("std_period_return", format_value(stats.std_period_return, 6)),
            ("sharpe_ratio", format_value(stats.sharpe_ratio, 4)),
            ("max_drawdown", format_value(stats.max_drawdown, 6)),
            ("max_drawdown_periods", stats.max_drawdown_duration.to_string()),
            ("periods", result.periods.len().to_string()),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();
        if let Some(fit) = result.periods.last().and_then(|p| p.fit.as_ref()) {
            rows.push(("last_fit_intercept".into(), format_value(fit.intercept, 6)));
            rows.push(("last_fit_intercept_t".into(), format_value(fit.t_values[0], 4)));
            for (i, b) in fit.coefficients.iter().enumerate() {
                rows.push((format!("last_fit_factor{}", i + 1), format_value(*b, 6)));
                rows.push((format!("last_fit_factor{}_t", i + 1), format_value(fit.t_values[i + 1], 4)));
            }
            rows.push(("last_fit_observations".into(), fit.observations.to_string()));
        }

        let mut wtr = csv::Writer::from_path(path).map_err(csv_error)?;
        for (metric, value) in rows {
            wtr.serialize(SummaryRow { metric, value }).map_err(csv_error)?;
        }
        wtr.flush()?;
        Ok(())
    }
}

impl Default for CsvReportAdapter {
    fn default() -> Self {
        Self::new()
    }
}

fn csv_error(e: csv::Error) -> FactorTraderError {
    match e.into_kind() {
        csv::ErrorKind::Io(io) => FactorTraderError::Io(io),
        other => FactorTraderError::Io(std::io::Error::other(format!("{other:?}"))),
    }
}

impl ReportPort for CsvReportAdapter {
    fn write(
        &self,
        result: &BacktestResult,
        stats: &PerformanceStats,
        output_path: &str,
    ) -> Result<(), FactorTraderError> {
        let path = Path::new(output_path);
        Self::write_periods(result, stats, path)?;
        Self::write_summary(result, stats, &Self::summary_path(path))?;
        Ok(())
    }
}
