//! Per-ticker price history and the unified trading timeline.

use crate::domain::error::FactorTraderError;
use crate::domain::trading_days::TradingDayIndex;
use chrono::NaiveDate;
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub close: f64,
    pub dividend: f64,
}

impl PricePoint {
    pub fn new(date: NaiveDate, close: f64) -> Self {
        Self {
            date,
            close,
            dividend: 0.0,
        }
    }

    pub fn with_dividend(mut self, dividend: f64) -> Self {
        self.dividend = dividend;
        self
    }
}

/// One ticker's adjusted closes, ascending by date with unique dates.
#[derive(Debug, Clone)]
pub struct PriceSeries {
    pub code: String,
    points: Vec<PricePoint>,
    index: TradingDayIndex,
}

impl PriceSeries {
    /// Sorts `points` by date. When a date repeats the first row wins.
    pub fn new(code: impl Into<String>, mut points: Vec<PricePoint>) -> Self {
        let code = code.into();
        points.sort_by_key(|p| p.date);
        points.dedup_by_key(|p| p.date);
        let index = TradingDayIndex::new(code.clone(), points.iter().map(|p| p.date).collect());
        Self {
            code,
            points,
            index,
        }
    }

    pub fn points(&self) -> &[PricePoint] {
        &self.points
    }

    pub fn index(&self) -> &TradingDayIndex {
        &self.index
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.points.first().map(|p| p.date)
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.points.last().map(|p| p.date)
    }

    pub fn close_on(&self, date: NaiveDate) -> Result<f64, FactorTraderError> {
        let pos = self.index.position_of(date)?;
        Ok(self.points[pos].close)
    }

    /// Sum of dividends paid after `start` up to and including `end`.
    pub fn dividends_between(&self, start: NaiveDate, end: NaiveDate) -> f64 {
        self.points
            .iter()
            .filter(|p| p.date > start && p.date <= end)
            .map(|p| p.dividend)
            .sum()
    }

    /// Copy of the series with every point after `date` removed.
    pub fn truncated_after(&self, date: NaiveDate) -> Self {
        let kept = self
            .points
            .iter()
            .filter(|p| p.date <= date)
            .cloned()
            .collect();
        Self::new(self.code.clone(), kept)
    }
}

pub fn build_unified_timeline(series: &[PriceSeries]) -> Vec<NaiveDate> {
    let unique_dates: BTreeSet<NaiveDate> = series
        .iter()
        .flat_map(|s| s.points.iter().map(|p| p.date))
        .collect();
    unique_dates.into_iter().collect()
}
