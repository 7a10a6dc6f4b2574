//! Trading calendar derived from stored price series.

use crate::domain::error::FactorTraderError;
use crate::ports::calendar_port::CalendarPort;
use crate::ports::data_port::DataPort;
use chrono::NaiveDate;
use std::collections::BTreeSet;
use tracing::debug;

/// A date is a trading day when any reference ticker has a price on it.
pub struct SeriesCalendar<'a> {
    data: &'a dyn DataPort,
    reference_codes: Vec<String>,
}

impl<'a> SeriesCalendar<'a> {
    pub fn new(data: &'a dyn DataPort, reference_codes: Vec<String>) -> Self {
        Self {
            data,
            reference_codes,
        }
    }
}

impl CalendarPort for SeriesCalendar<'_> {
    fn trading_days(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<NaiveDate>, FactorTraderError> {
        let mut days = BTreeSet::new();
        let mut last_error = None;
        let mut any_ok = false;

        for code in &self.reference_codes {
            match self.data.fetch_prices(code, start, end) {
                Ok(points) => {
                    any_ok = true;
                    days.extend(points.into_iter().map(|p| p.date));
                }
                Err(e) => {
                    debug!(code = %code, error = %e, "calendar reference unavailable");
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) if !any_ok => Err(e),
            _ => Ok(days.into_iter().collect()),
        }
    }
}
