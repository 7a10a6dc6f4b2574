//! Performance statistics over a completed walk-forward run.
//!
//! Everything here is a pure function of the [`PerformanceRecord`] and the
//! initial/final AUM. Values that are undefined for the run (annualizing a
//! zero-day run, a Sharpe ratio without variance) are `NaN`, never 0.

use super::backtest::{BacktestResult, PerformanceRecord};
use super::error::FactorTraderError;
use chrono::NaiveDate;

const DAYS_PER_YEAR: f64 = 365.25;

#[derive(Debug, Clone, PartialEq)]
pub struct PerformanceStats {
    pub initial_aum: f64,
    pub final_aum: f64,
    pub pnl: f64,
    /// Percent.
    pub total_return: f64,
    /// Fraction per year; `NaN` when the run spans zero days.
    pub annualized_return: f64,
    pub elapsed_days: i64,
    pub average_aum: f64,
    pub max_aum: f64,
    pub average_period_return: f64,
    pub std_period_return: f64,
    pub sharpe_ratio: f64,
    pub max_drawdown: f64,
    /// Longest run of periods spent below a previous peak.
    pub max_drawdown_duration: usize,
    pub cumulative_returns: Vec<(String, f64)>,
}

impl PerformanceStats {
    pub fn compute(result: &BacktestResult, risk_free_rate: f64) -> Self {
        Self::from_record(
            &result.record,
            result.initial_aum,
            result.first_trading_day,
            result.last_trading_day,
            risk_free_rate,
        )
    }

    pub fn from_record(
        record: &PerformanceRecord,
        initial_aum: f64,
        first_trading_day: NaiveDate,
        last_trading_day: NaiveDate,
        risk_free_rate: f64,
    ) -> Self {
        let final_aum = record.last_aum().unwrap_or(initial_aum);
        let total = total_return(initial_aum, final_aum);
        let elapsed_days = (last_trading_day - first_trading_day).num_days();
        let annualized = annualized_return(total, elapsed_days).unwrap_or(f64::NAN);

        let aum = record.aum_values();
        let returns = period_returns(&aum);
        let (max_drawdown, max_drawdown_duration) = compute_drawdown(initial_aum, &aum);

        PerformanceStats {
            initial_aum,
            final_aum,
            pnl: final_aum - initial_aum,
            total_return: total,
            annualized_return: annualized,
            elapsed_days,
            average_aum: mean(&aum).unwrap_or(f64::NAN),
            max_aum: aum.iter().copied().reduce(f64::max).unwrap_or(f64::NAN),
            average_period_return: mean(&returns).unwrap_or(f64::NAN),
            std_period_return: sample_std(&returns).unwrap_or(f64::NAN),
            sharpe_ratio: sharpe_ratio(&returns, risk_free_rate),
            max_drawdown,
            max_drawdown_duration,
            cumulative_returns: cumulative_returns(record),
        }
    }
}

/// `100 × (final - initial) / initial`.
pub fn total_return(initial_aum: f64, final_aum: f64) -> f64 {
    100.0 * (final_aum - initial_aum) / initial_aum
}

/// `(1 + total_return / 100) ^ (365.25 / elapsed_days) - 1`.
pub fn annualized_return(total_return: f64, elapsed_days: i64) -> Result<f64, FactorTraderError> {
    if elapsed_days == 0 {
        return Err(FactorTraderError::DivisionByZero {
            what: "annualized return over zero elapsed days".into(),
        });
    }
    Ok((1.0 + total_return / 100.0).powf(DAYS_PER_YEAR / elapsed_days as f64) - 1.0)
}

/// Percentage change between consecutive AUM values.
pub fn period_returns(aum: &[f64]) -> Vec<f64> {
    aum.windows(2).map(|w| (w[1] - w[0]) / w[0]).collect()
}

/// `(mean(r) - rf) / std(r)` with sample standard deviation.
pub fn sharpe_ratio(returns: &[f64], risk_free_rate: f64) -> f64 {
    match (mean(returns), sample_std(returns)) {
        (Some(m), Some(s)) if s > 0.0 => (m - risk_free_rate) / s,
        _ => f64::NAN,
    }
}

/// Running sum of period returns, labelled with the period each return ends.
pub fn cumulative_returns(record: &PerformanceRecord) -> Vec<(String, f64)> {
    let entries = record.entries();
    let returns = period_returns(&record.aum_values());
    let mut running = 0.0;
    entries
        .iter()
        .skip(1)
        .zip(returns)
        .map(|(entry, r)| {
            running += r;
            (entry.period.clone(), running)
        })
        .collect()
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

fn sample_std(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let m = mean(values)?;
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    Some(variance.sqrt())
}

/// Largest peak-to-trough fraction, starting from the initial AUM.
fn compute_drawdown(initial_aum: f64, aum: &[f64]) -> (f64, usize) {
    let mut peak = initial_aum;
    let mut max_dd = 0.0_f64;
    let mut current_duration = 0usize;
    let mut max_duration = 0usize;

    for &value in aum {
        if value >= peak {
            peak = value;
            current_duration = 0;
        } else if peak > 0.0 {
            max_dd = max_dd.max((peak - value) / peak);
            current_duration += 1;
            max_duration = max_duration.max(current_duration);
        }
    }

    (max_dd, max_duration)
}
