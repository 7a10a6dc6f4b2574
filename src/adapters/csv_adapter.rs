//! CSV file data adapter.
//!
//! One `CODE.csv` per ticker with a header row naming `date`, `close` and
//! optionally `dividend` columns, in any order.

use crate::domain::config_validation::parse_date_str;
use crate::domain::error::FactorTraderError;
use crate::domain::price_series::PricePoint;
use crate::ports::data_port::DataPort;
use chrono::NaiveDate;
use std::fs;
use std::path::PathBuf;

pub struct CsvAdapter {
    base_path: PathBuf,
}

fn source_error(reason: String) -> FactorTraderError {
    FactorTraderError::DataSource { reason }
}

impl CsvAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn csv_path(&self, code: &str) -> PathBuf {
        self.base_path.join(format!("{}.csv", code))
    }

    fn read_points(&self, code: &str) -> Result<Vec<PricePoint>, FactorTraderError> {
        let path = self.csv_path(code);
        let content = fs::read_to_string(&path)
            .map_err(|e| source_error(format!("failed to read {}: {}", path.display(), e)))?;

        let mut rdr = csv::Reader::from_reader(content.as_bytes());
        let headers = rdr
            .headers()
            .map_err(|e| source_error(format!("{}: CSV header error: {}", path.display(), e)))?
            .clone();
        let column = |name: &str| {
            headers
                .iter()
                .position(|h| h.trim().eq_ignore_ascii_case(name))
        };
        let date_col = column("date")
            .ok_or_else(|| source_error(format!("{}: missing date column", path.display())))?;
        let close_col = column("close")
            .ok_or_else(|| source_error(format!("{}: missing close column", path.display())))?;
        let dividend_col = column("dividend");

        let mut points = Vec::new();
        for result in rdr.records() {
            let record = result.map_err(|e| source_error(format!("CSV parse error: {}", e)))?;

            let date_str = record.get(date_col).unwrap_or_default();
            let date = parse_date_str(date_str)
                .ok_or_else(|| source_error(format!("invalid date '{}' in {}", date_str, code)))?;

            let close: f64 = record
                .get(close_col)
                .unwrap_or_default()
                .trim()
                .parse()
                .map_err(|e| source_error(format!("invalid close value on {}: {}", date, e)))?;

            let dividend = match dividend_col.and_then(|c| record.get(c)).map(str::trim) {
                None | Some("") => 0.0,
                Some(raw) => raw.parse().map_err(|e| {
                    source_error(format!("invalid dividend value on {}: {}", date, e))
                })?,
            };

            points.push(PricePoint::new(date, close).with_dividend(dividend));
        }

        points.sort_by_key(|p| p.date);
        Ok(points)
    }
}

impl DataPort for CsvAdapter {
    fn fetch_prices(
        &self,
        code: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<PricePoint>, FactorTraderError> {
        let mut points = self.read_points(code)?;
        points.retain(|p| p.date >= start_date && p.date <= end_date);
        Ok(points)
    }

    fn list_symbols(&self) -> Result<Vec<String>, FactorTraderError> {
        let entries = fs::read_dir(&self.base_path).map_err(|e| {
            source_error(format!(
                "failed to read directory {}: {}",
                self.base_path.display(),
                e
            ))
        })?;

        let mut symbols = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| source_error(format!("directory entry error: {}", e)))?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("csv") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                symbols.push(stem.to_string());
            }
        }

        symbols.sort();
        Ok(symbols)
    }

    fn get_data_range(
        &self,
        code: &str,
    ) -> Result<Option<(NaiveDate, NaiveDate, usize)>, FactorTraderError> {
        if !self.csv_path(code).exists() {
            return Ok(None);
        }
        let points = self.read_points(code)?;
        Ok(match (points.first(), points.last()) {
            (Some(first), Some(last)) => Some((first.date, last.date, points.len())),
            _ => None,
        })
    }
}
