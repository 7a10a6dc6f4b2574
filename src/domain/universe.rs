//! Ticker universe parsing and price loading.
//!
//! Parses code lists from configuration and fetches each ticker's price
//! history through the [`DataPort`]. Tickers that cannot be loaded are
//! skipped with a warning; the run only fails when none load.

use crate::domain::error::FactorTraderError;
use crate::domain::price_series::PriceSeries;
use crate::ports::data_port::DataPort;
use chrono::NaiveDate;
use std::collections::HashSet;
use tracing::{info, warn};

#[derive(Debug, Clone, thiserror::Error)]
pub enum UniverseError {
    #[error("empty token in code list")]
    EmptyToken,

    #[error("duplicate code: {0}")]
    DuplicateCode(String),
}

impl From<UniverseError> for FactorTraderError {
    fn from(e: UniverseError) -> Self {
        FactorTraderError::ConfigInvalid {
            section: "backtest".to_string(),
            key: "codes".to_string(),
            reason: e.to_string(),
        }
    }
}

pub fn parse_codes(input: &str) -> Result<Vec<String>, UniverseError> {
    let mut codes = Vec::new();
    let mut seen = HashSet::new();

    for token in input.split(',') {
        let trimmed = token.trim();
        if trimmed.is_empty() {
            return Err(UniverseError::EmptyToken);
        }
        let code = trimmed.to_uppercase();
        if !seen.insert(code.clone()) {
            return Err(UniverseError::DuplicateCode(code));
        }
        codes.push(code);
    }

    Ok(codes)
}

#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    NoData,
    FetchFailed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SkippedCode {
    pub code: String,
    pub reason: SkipReason,
}

#[derive(Debug, Clone)]
pub struct LoadedUniverse {
    pub series: Vec<PriceSeries>,
    pub skipped: Vec<SkippedCode>,
}

impl LoadedUniverse {
    pub fn codes(&self) -> Vec<String> {
        self.series.iter().map(|s| s.code.clone()).collect()
    }
}

/// Fetches `[start_date, end_date]` for every code, in order.
pub fn load_universe(
    data_port: &dyn DataPort,
    codes: &[String],
    start_date: NaiveDate,
    end_date: NaiveDate,
) -> Result<LoadedUniverse, FactorTraderError> {
    let mut series = Vec::new();
    let mut skipped = Vec::new();

    for code in codes {
        let points = match data_port.fetch_prices(code, start_date, end_date) {
            Ok(points) => points,
            Err(e) => {
                warn!(code = %code, error = %e, "skipping ticker");
                skipped.push(SkippedCode {
                    code: code.clone(),
                    reason: SkipReason::FetchFailed(e.to_string()),
                });
                continue;
            }
        };

        if points.is_empty() {
            warn!(code = %code, "skipping ticker, no data in range");
            skipped.push(SkippedCode {
                code: code.clone(),
                reason: SkipReason::NoData,
            });
            continue;
        }

        let loaded = PriceSeries::new(code.clone(), points);
        info!(
            code = %code,
            rows = loaded.len(),
            first = ?loaded.first_date(),
            last = ?loaded.last_date(),
            "loaded prices"
        );
        series.push(loaded);
    }

    if series.is_empty() {
        return Err(FactorTraderError::DataSource {
            reason: format!("no price data for any of {} codes", codes.len()),
        });
    }

    if !skipped.is_empty() {
        info!(
            loaded = series.len(),
            requested = codes.len(),
            "backtesting a partial universe"
        );
    }

    Ok(LoadedUniverse { series, skipped })
}
