//! Trading-day offsets and month-end rebalance dates.
//!
//! A [`TradingDayIndex`] is built from one ticker's loaded dates (or from a
//! unified timeline across tickers) and answers "which trading day is this"
//! and "what was the trading day N sessions earlier" questions. Lookups never
//! clamp: running off either end of the loaded history is an error.

use crate::domain::error::FactorTraderError;
use chrono::{Datelike, NaiveDate};
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct TradingDayIndex {
    code: String,
    dates: Vec<NaiveDate>,
    positions: HashMap<NaiveDate, usize>,
}

impl TradingDayIndex {
    /// Builds an index over `dates`; input is sorted and de-duplicated.
    pub fn new(code: impl Into<String>, mut dates: Vec<NaiveDate>) -> Self {
        dates.sort();
        dates.dedup();
        let positions = dates.iter().enumerate().map(|(i, &d)| (d, i)).collect();
        Self {
            code: code.into(),
            dates,
            positions,
        }
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn date_at(&self, position: usize) -> Option<NaiveDate> {
        self.dates.get(position).copied()
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.positions.contains_key(&date)
    }

    pub fn position_of(&self, date: NaiveDate) -> Result<usize, FactorTraderError> {
        self.positions
            .get(&date)
            .copied()
            .ok_or_else(|| FactorTraderError::DateNotFound {
                code: self.code.clone(),
                date,
            })
    }

    /// The trading date `n` sessions before `date`.
    pub fn offset_before(&self, date: NaiveDate, n: usize) -> Result<NaiveDate, FactorTraderError> {
        let pos = self.position_of(date)?;
        if n > pos {
            return Err(FactorTraderError::InsufficientHistory {
                code: self.code.clone(),
                date,
                requested: n,
                available: pos,
            });
        }
        Ok(self.dates[pos - n])
    }

    /// The trading date `n` sessions after `date`.
    pub fn offset_after(&self, date: NaiveDate, n: usize) -> Result<NaiveDate, FactorTraderError> {
        let pos = self.position_of(date)?;
        let available = self.dates.len() - 1 - pos;
        if n > available {
            return Err(FactorTraderError::InsufficientHistory {
                code: self.code.clone(),
                date,
                requested: n,
                available,
            });
        }
        Ok(self.dates[pos + n])
    }

    pub fn first_on_or_after(&self, date: NaiveDate) -> Option<NaiveDate> {
        let idx = self.dates.partition_point(|&d| d < date);
        self.dates.get(idx).copied()
    }

    pub fn last_on_or_before(&self, date: NaiveDate) -> Option<NaiveDate> {
        let idx = self.dates.partition_point(|&d| d <= date);
        idx.checked_sub(1).map(|i| self.dates[i])
    }

    /// Last loaded trading day of each calendar month within `[start, end]`.
    ///
    /// The iterator is lazy and finite; clone it to restart from the first
    /// month.
    pub fn month_ends(&self, start: NaiveDate, end: NaiveDate) -> MonthEnds<'_> {
        let lo = self.dates.partition_point(|&d| d < start);
        let hi = self.dates.partition_point(|&d| d <= end).max(lo);
        MonthEnds {
            dates: &self.dates[lo..hi],
            pos: 0,
        }
    }

    /// The last month-end trading day strictly before `date`.
    pub fn previous_month_end(&self, date: NaiveDate) -> Option<NaiveDate> {
        let idx = self.dates.partition_point(|&d| d < date);
        let before = &self.dates[..idx];
        let first_of_month = NaiveDate::from_ymd_opt(date.year(), date.month(), 1)?;
        before.iter().rev().find(|&&d| d < first_of_month).copied()
    }
}

#[derive(Debug, Clone)]
pub struct MonthEnds<'a> {
    dates: &'a [NaiveDate],
    pos: usize,
}

impl Iterator for MonthEnds<'_> {
    type Item = NaiveDate;

    fn next(&mut self) -> Option<NaiveDate> {
        let first = *self.dates.get(self.pos)?;
        let month = (first.year(), first.month());
        while self
            .dates
            .get(self.pos)
            .is_some_and(|d| (d.year(), d.month()) == month)
        {
            self.pos += 1;
        }
        Some(self.dates[self.pos - 1])
    }
}
