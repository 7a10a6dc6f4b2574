//! Backtest configuration and result types.
//!
//! [`BacktestConfig`] is built once, validated, and passed by reference to
//! every component. Results are the [`PerformanceRecord`] of AUM after each
//! period plus a [`PeriodOutcome`] per period with the decisions behind it.

use crate::domain::blender::BlendModel;
use crate::domain::error::FactorTraderError;
use crate::domain::factor::ExcludedTicker;
use crate::domain::strategy::{SelectionDirection, StrategyKind};
use chrono::{Duration, NaiveDate};

pub const MAX_LOOKBACK_DAYS: usize = 250;
pub const MAX_GAP_DAYS: usize = 250;
/// Per rebalance period (monthly): 2% a year.
pub const DEFAULT_RISK_FREE_RATE: f64 = 0.02 / 12.0;

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestConfig {
    pub codes: Vec<String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub initial_aum: f64,
    pub strategy: StrategyKind,
    pub top_pct: f64,
    pub selection: SelectionDirection,
    /// Per-period rate subtracted in the Sharpe ratio.
    pub risk_free_rate: f64,
    pub include_dividends: bool,
}

fn invalid(section: &str, key: &str, reason: impl Into<String>) -> FactorTraderError {
    FactorTraderError::ConfigInvalid {
        section: section.into(),
        key: key.into(),
        reason: reason.into(),
    }
}

impl BacktestConfig {
    /// Checks the invariants the engine relies on.
    pub fn validate(&self) -> Result<(), FactorTraderError> {
        if self.codes.is_empty() {
            return Err(invalid("backtest", "codes", "universe must not be empty"));
        }
        if self.start_date > self.end_date {
            return Err(invalid("backtest", "start_date", "start_date must not be after end_date"));
        }
        if !(self.initial_aum.is_finite() && self.initial_aum > 0.0) {
            return Err(invalid("backtest", "initial_aum", "initial_aum must be positive"));
        }
        if !(self.top_pct > 0.0 && self.top_pct <= 100.0) {
            return Err(invalid("backtest", "top_pct", "top_pct must be in (0, 100]"));
        }
        if !self.risk_free_rate.is_finite() {
            return Err(invalid("backtest", "risk_free_rate", "risk_free_rate must be finite"));
        }
        validate_strategy(&self.strategy)
    }

    /// First date to load so every factor window of the first rebalance
    /// fits, in calendar days (about 1.5 calendar days per session plus a
    /// month for the blend's prior period).
    pub fn history_start(&self) -> NaiveDate {
        let window = i64::try_from(self.strategy.max_window()).unwrap_or(i64::MAX);
        let mut buffer = window.saturating_mul(3) / 2 + 10;
        if self.strategy.is_blended() {
            buffer += 35;
        }
        Duration::try_days(buffer)
            .and_then(|d| self.start_date.checked_sub_signed(d))
            .unwrap_or(NaiveDate::MIN)
    }
}

fn validate_strategy(kind: &StrategyKind) -> Result<(), FactorTraderError> {
    match kind {
        StrategyKind::Momentum { lookback, gap } | StrategyKind::Reversal { lookback, gap } => {
            if *lookback == 0 || *lookback > MAX_LOOKBACK_DAYS {
                return Err(invalid(
                    "strategy",
                    "days1",
                    format!("lookback must be between 1 and {MAX_LOOKBACK_DAYS} trading days"),
                ));
            }
            if *gap > MAX_GAP_DAYS {
                return Err(invalid(
                    "strategy",
                    "gap1",
                    format!("gap must be at most {MAX_GAP_DAYS} trading days"),
                ));
            }
            Ok(())
        }
        StrategyKind::Blended(inner) => {
            if inner.len() < 2 {
                return Err(invalid("strategy", "strategy2", "a blend needs at least two factors"));
            }
            inner.iter().try_for_each(validate_strategy)
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PerformanceEntry {
    pub period: String,
    pub aum: f64,
}

/// Append-only `(period, AUM after period)` series.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PerformanceRecord {
    entries: Vec<PerformanceEntry>,
}

impl PerformanceRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, period: impl Into<String>, aum: f64) {
        self.entries.push(PerformanceEntry {
            period: period.into(),
            aum,
        });
    }

    pub fn entries(&self) -> &[PerformanceEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn aum_values(&self) -> Vec<f64> {
        self.entries.iter().map(|e| e.aum).collect()
    }

    pub fn last_aum(&self) -> Option<f64> {
        self.entries.last().map(|e| e.aum)
    }
}

impl FromIterator<(String, f64)> for PerformanceRecord {
    fn from_iter<I: IntoIterator<Item = (String, f64)>>(iter: I) -> Self {
        let mut record = PerformanceRecord::new();
        for (period, aum) in iter {
            record.push(period, aum);
        }
        record
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HoldingReturn {
    pub code: String,
    pub allocation: f64,
    pub period_return: f64,
}

impl HoldingReturn {
    pub fn ending_value(&self) -> f64 {
        self.allocation * (1.0 + self.period_return)
    }
}

/// Everything decided and observed in one holding period.
#[derive(Debug, Clone, PartialEq)]
pub struct PeriodOutcome {
    pub label: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub holdings: Vec<String>,
    pub returns: Vec<HoldingReturn>,
    pub aum_before: f64,
    pub aum_after: f64,
    pub excluded: Vec<ExcludedTicker>,
    /// Holdings with no usable price at `end`, held flat.
    pub unrealized: Vec<String>,
    pub fit: Option<BlendModel>,
}

pub fn period_label(start: NaiveDate, end: NaiveDate) -> String {
    format!("{start} to {end}")
}

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestResult {
    pub initial_aum: f64,
    pub record: PerformanceRecord,
    pub periods: Vec<PeriodOutcome>,
    pub first_trading_day: NaiveDate,
    pub last_trading_day: NaiveDate,
}

impl BacktestResult {
    pub fn final_aum(&self) -> f64 {
        self.record.last_aum().unwrap_or(self.initial_aum)
    }
}
