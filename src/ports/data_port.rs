//! Market data port.

use crate::domain::error::FactorTraderError;
use crate::domain::price_series::PricePoint;
use chrono::NaiveDate;

pub trait DataPort {
    /// Closes (and dividends) for `code` in `[start_date, end_date]`, any order.
    fn fetch_prices(
        &self,
        code: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<PricePoint>, FactorTraderError>;

    fn list_symbols(&self) -> Result<Vec<String>, FactorTraderError>;

    /// First date, last date and row count, or `None` if the code has no data.
    fn get_data_range(
        &self,
        code: &str,
    ) -> Result<Option<(NaiveDate, NaiveDate, usize)>, FactorTraderError>;
}
