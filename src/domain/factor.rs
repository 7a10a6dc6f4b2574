//! Factor scores and realized period returns.
//!
//! Momentum and reversal share one trailing-return formula
//! `price[t - gap] / price[t - gap - lookback] - 1`; they differ in their
//! default gap (20 vs 0 trading days) and in which end of the ranking is
//! bought. Window lookups go through the ticker's own [`TradingDayIndex`],
//! so a window that reaches past the loaded history is an error rather than
//! a silently shortened window.
//!
//! [`TradingDayIndex`]: crate::domain::trading_days::TradingDayIndex

use crate::domain::error::FactorTraderError;
use crate::domain::price_series::PriceSeries;
use crate::domain::strategy::StrategyKind;
use chrono::NaiveDate;
use std::collections::BTreeMap;

/// Ticker to score for one rebalance date.
pub type FactorScores = BTreeMap<String, f64>;

/// A ticker dropped from one period's ranking universe.
#[derive(Debug, Clone, PartialEq)]
pub struct ExcludedTicker {
    pub code: String,
    pub reason: String,
}

/// Per-ticker factor vectors for one boundary, plus the tickers that could
/// not be scored.
#[derive(Debug, Clone, Default)]
pub struct CrossSection {
    pub vectors: BTreeMap<String, Vec<f64>>,
    pub excluded: Vec<ExcludedTicker>,
}

impl CrossSection {
    /// Scores for single-factor strategies (first component of each vector).
    pub fn first_factor(&self) -> FactorScores {
        self.vectors
            .iter()
            .filter_map(|(code, v)| v.first().map(|&s| (code.clone(), s)))
            .collect()
    }
}

fn checked_price(series: &PriceSeries, date: NaiveDate) -> Result<f64, FactorTraderError> {
    let price = series.close_on(date)?;
    if !price.is_finite() || price <= 0.0 {
        return Err(FactorTraderError::InvalidPrice {
            code: series.code.clone(),
            date,
            price,
        });
    }
    Ok(price)
}

/// `price[t - gap] / price[t - gap - lookback] - 1`.
pub fn trailing_return(
    series: &PriceSeries,
    boundary: NaiveDate,
    lookback: usize,
    gap: usize,
) -> Result<f64, FactorTraderError> {
    let index = series.index();
    let window_end = index.offset_before(boundary, gap).map_err(|e| match e {
        FactorTraderError::InsufficientHistory { available, .. } => {
            FactorTraderError::InsufficientHistory {
                code: series.code.clone(),
                date: boundary,
                requested: gap + lookback,
                available,
            }
        }
        other => other,
    })?;
    let window_start = index.offset_before(window_end, lookback).map_err(|e| match e {
        FactorTraderError::InsufficientHistory { available, .. } => {
            FactorTraderError::InsufficientHistory {
                code: series.code.clone(),
                date: boundary,
                requested: gap + lookback,
                available: available + gap,
            }
        }
        other => other,
    })?;

    let start_price = checked_price(series, window_start)?;
    let end_price = series.close_on(window_end)?;
    if !end_price.is_finite() || end_price < 0.0 {
        return Err(FactorTraderError::InvalidPrice {
            code: series.code.clone(),
            date: window_end,
            price: end_price,
        });
    }
    Ok(end_price / start_price - 1.0)
}

/// Factor scores of `series` at `boundary`, one per leaf factor of `strategy`.
pub fn factor_vector(
    strategy: &StrategyKind,
    series: &PriceSeries,
    boundary: NaiveDate,
) -> Result<Vec<f64>, FactorTraderError> {
    match strategy {
        StrategyKind::Momentum { lookback, gap } | StrategyKind::Reversal { lookback, gap } => {
            Ok(vec![trailing_return(series, boundary, *lookback, *gap)?])
        }
        StrategyKind::Blended(inner) => {
            let mut out = Vec::with_capacity(strategy.feature_count());
            for kind in inner {
                out.extend(factor_vector(kind, series, boundary)?);
            }
            Ok(out)
        }
    }
}

/// Scores every ticker at `boundary`. Tickers with data gaps are excluded;
/// any other error aborts.
pub fn cross_section(
    strategy: &StrategyKind,
    universe: &[PriceSeries],
    boundary: NaiveDate,
) -> Result<CrossSection, FactorTraderError> {
    let mut section = CrossSection::default();
    for series in universe {
        match factor_vector(strategy, series, boundary) {
            Ok(v) => {
                section.vectors.insert(series.code.clone(), v);
            }
            Err(e) if e.is_ticker_gap() => {
                section.excluded.push(ExcludedTicker {
                    code: series.code.clone(),
                    reason: e.to_string(),
                });
            }
            Err(e) => return Err(e),
        }
    }
    Ok(section)
}

/// Percentage return over `[start, end]`, optionally adding dividends paid
/// in `(start, end]` to the end price.
pub fn period_return(
    series: &PriceSeries,
    start: NaiveDate,
    end: NaiveDate,
    include_dividends: bool,
) -> Result<f64, FactorTraderError> {
    let start_price = checked_price(series, start)?;
    let end_price = series.close_on(end)?;
    if !end_price.is_finite() || end_price < 0.0 {
        return Err(FactorTraderError::InvalidPrice {
            code: series.code.clone(),
            date: end,
            price: end_price,
        });
    }
    let dividends = if include_dividends {
        series.dividends_between(start, end)
    } else {
        0.0
    };
    Ok((end_price + dividends - start_price) / start_price)
}
