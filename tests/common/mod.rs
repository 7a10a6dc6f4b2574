#![allow(dead_code)]

use chrono::{Datelike, NaiveDate};
use factortrader::domain::backtest::BacktestConfig;
use factortrader::domain::error::FactorTraderError;
pub use factortrader::domain::price_series::{PricePoint, PriceSeries};
use factortrader::domain::strategy::StrategyKind;
use factortrader::ports::data_port::DataPort;
use std::collections::HashMap;

pub struct MockDataPort {
    pub data: HashMap<String, Vec<PricePoint>>,
    pub errors: HashMap<String, String>,
}

impl MockDataPort {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
            errors: HashMap::new(),
        }
    }

    pub fn with_points(mut self, code: &str, points: Vec<PricePoint>) -> Self {
        self.data.insert(code.to_string(), points);
        self
    }

    pub fn with_error(mut self, code: &str, reason: &str) -> Self {
        self.errors.insert(code.to_string(), reason.to_string());
        self
    }
}

impl DataPort for MockDataPort {
    fn fetch_prices(
        &self,
        code: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<PricePoint>, FactorTraderError> {
        if let Some(reason) = self.errors.get(code) {
            return Err(FactorTraderError::DataSource {
                reason: reason.clone(),
            });
        }
        Ok(self
            .data
            .get(code)
            .map(|points| {
                points
                    .iter()
                    .filter(|p| p.date >= start_date && p.date <= end_date)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn list_symbols(&self) -> Result<Vec<String>, FactorTraderError> {
        let mut symbols: Vec<String> = self.data.keys().cloned().collect();
        symbols.sort();
        Ok(symbols)
    }

    fn get_data_range(
        &self,
        code: &str,
    ) -> Result<Option<(NaiveDate, NaiveDate, usize)>, FactorTraderError> {
        if let Some(reason) = self.errors.get(code) {
            return Err(FactorTraderError::DataSource {
                reason: reason.clone(),
            });
        }
        match self.data.get(code) {
            Some(points) if !points.is_empty() => {
                let min = points.iter().map(|p| p.date).min().unwrap();
                let max = points.iter().map(|p| p.date).max().unwrap();
                Ok(Some((min, max, points.len())))
            }
            _ => Ok(None),
        }
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Monday to Friday dates in `[start, end]`.
pub fn weekdays(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    start
        .iter_days()
        .take_while(|&d| d <= end)
        .filter(|d| d.weekday().num_days_from_monday() < 5)
        .collect()
}

/// Weekday closes compounding at `daily` per session.
pub fn generate_points(
    start: NaiveDate,
    end: NaiveDate,
    start_price: f64,
    daily: f64,
) -> Vec<PricePoint> {
    let mut price = start_price;
    weekdays(start, end)
        .into_iter()
        .map(|d| {
            let p = PricePoint::new(d, price);
            price *= 1.0 + daily;
            p
        })
        .collect()
}

/// Weekday closes following `price(i) = start_price * (1 + daily)^i * (1 + wobble * sin(i * freq))`.
pub fn generate_wavy_points(
    start: NaiveDate,
    end: NaiveDate,
    start_price: f64,
    daily: f64,
    wobble: f64,
    freq: f64,
) -> Vec<PricePoint> {
    weekdays(start, end)
        .into_iter()
        .enumerate()
        .map(|(i, d)| {
            let trend = start_price * (1.0 + daily).powi(i as i32);
            PricePoint::new(d, trend * (1.0 + wobble * (i as f64 * freq).sin()))
        })
        .collect()
}

pub fn generate_series(code: &str, start_price: f64, daily: f64) -> PriceSeries {
    PriceSeries::new(
        code,
        generate_points(date(2023, 1, 2), date(2024, 12, 31), start_price, daily),
    )
}

pub fn sample_config(codes: &[&str], strategy: StrategyKind, top_pct: f64) -> BacktestConfig {
    BacktestConfig {
        codes: codes.iter().map(|c| c.to_string()).collect(),
        start_date: date(2024, 1, 1),
        end_date: date(2024, 6, 30),
        initial_aum: 1_000_000.0,
        selection: strategy.default_direction(),
        strategy,
        top_pct,
        risk_free_rate: 0.0,
        include_dividends: false,
    }
}
