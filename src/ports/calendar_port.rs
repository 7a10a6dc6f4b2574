//! Trading calendar port.

use crate::domain::error::FactorTraderError;
use chrono::NaiveDate;

pub trait CalendarPort {
    /// Trading days in `[start, end]`, ascending.
    fn trading_days(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<NaiveDate>, FactorTraderError>;
}
