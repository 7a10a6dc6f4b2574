//! Configuration validation.
//!
//! Validates all config fields before a backtest runs, and resolves the
//! requested date range against the trading calendar.

use crate::domain::backtest::{MAX_GAP_DAYS, MAX_LOOKBACK_DAYS};
use crate::domain::error::FactorTraderError;
use crate::domain::strategy::{SelectionDirection, StrategyKind};
use crate::domain::universe::parse_codes;
use crate::ports::calendar_port::CalendarPort;
use crate::ports::config_port::ConfigPort;
use chrono::NaiveDate;
use tracing::warn;

fn invalid(section: &str, key: &str, reason: impl Into<String>) -> FactorTraderError {
    FactorTraderError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.into(),
    }
}

fn missing(section: &str, key: &str) -> FactorTraderError {
    FactorTraderError::ConfigMissing {
        section: section.to_string(),
        key: key.to_string(),
    }
}

pub fn validate_backtest_config(config: &dyn ConfigPort) -> Result<(), FactorTraderError> {
    validate_codes(config)?;
    validate_dates(config)?;
    validate_initial_aum(config)?;
    validate_top_pct(config)?;
    validate_selection(config)?;
    validate_risk_free_rate(config)?;
    Ok(())
}

pub fn validate_strategy_config(config: &dyn ConfigPort) -> Result<(), FactorTraderError> {
    let first = config.get_string("strategy", "strategy1");
    match first.as_deref().map(str::trim) {
        None | Some("") => return Err(missing("strategy", "strategy1")),
        Some(_) => validate_factor(config, "1")?,
    }
    match config.get_string("strategy", "strategy2") {
        Some(s) if !s.trim().is_empty() => validate_factor(config, "2")?,
        _ => {}
    }
    Ok(())
}

/// Accepts `YYYYMMDD` and `YYYY-MM-DD`.
pub fn parse_date_str(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(value, "%Y%m%d"))
        .ok()
}

pub fn parse_date(value: Option<&str>, field: &str) -> Result<NaiveDate, FactorTraderError> {
    match value {
        None => Err(missing("backtest", field)),
        Some(s) => parse_date_str(s).ok_or_else(|| {
            invalid(
                "backtest",
                field,
                format!("invalid {field} '{s}', expected YYYYMMDD or YYYY-MM-DD"),
            )
        }),
    }
}

/// Resolves `[start, end]` against the calendar as of `today`.
///
/// An `end` in the future is clamped to `today`; a `start` in the future, an
/// inverted range, or a range with no trading days is rejected.
pub fn validate_date_range(
    start: NaiveDate,
    end: NaiveDate,
    today: NaiveDate,
    calendar: &dyn CalendarPort,
) -> Result<(NaiveDate, NaiveDate), FactorTraderError> {
    if start > end {
        return Err(invalid(
            "backtest",
            "start_date",
            format!("start_date {start} is after end_date {end}"),
        ));
    }
    if start > today {
        return Err(invalid(
            "backtest",
            "start_date",
            format!("start_date {start} is in the future"),
        ));
    }
    let end = if end > today {
        warn!(%end, %today, "end_date is in the future, clamping to today");
        today
    } else {
        end
    };
    if calendar.trading_days(start, end)?.is_empty() {
        return Err(invalid(
            "backtest",
            "start_date",
            format!("no trading days between {start} and {end}"),
        ));
    }
    Ok((start, end))
}

fn validate_codes(config: &dyn ConfigPort) -> Result<(), FactorTraderError> {
    match config.get_string("backtest", "codes") {
        Some(c) if !c.trim().is_empty() => {
            parse_codes(&c)?;
            Ok(())
        }
        _ => Err(missing("backtest", "codes")),
    }
}

fn validate_dates(config: &dyn ConfigPort) -> Result<(), FactorTraderError> {
    let start_str = config.get_string("backtest", "start_date");
    let end_str = config.get_string("backtest", "end_date");

    let start_date = parse_date(start_str.as_deref(), "start_date")?;
    let end_date = parse_date(end_str.as_deref(), "end_date")?;

    if start_date > end_date {
        return Err(invalid(
            "backtest",
            "start_date",
            "start_date must not be after end_date",
        ));
    }
    Ok(())
}

fn validate_initial_aum(config: &dyn ConfigPort) -> Result<(), FactorTraderError> {
    let value = config.get_double("backtest", "initial_aum", 0.0);
    if !(value.is_finite() && value > 0.0) {
        return Err(invalid("backtest", "initial_aum", "initial_aum must be positive"));
    }
    Ok(())
}

fn validate_top_pct(config: &dyn ConfigPort) -> Result<(), FactorTraderError> {
    let value = config.get_double("backtest", "top_pct", 0.0);
    if !(value > 0.0 && value <= 100.0) {
        return Err(invalid("backtest", "top_pct", "top_pct must be in (0, 100]"));
    }
    Ok(())
}

fn validate_selection(config: &dyn ConfigPort) -> Result<(), FactorTraderError> {
    match config.get_string("backtest", "selection") {
        Some(s) if SelectionDirection::parse(&s).is_none() => Err(invalid(
            "backtest",
            "selection",
            format!("selection must be 'top' or 'bottom', got '{s}'"),
        )),
        _ => Ok(()),
    }
}

fn validate_risk_free_rate(config: &dyn ConfigPort) -> Result<(), FactorTraderError> {
    if let Some(raw) = config.get_string("backtest", "risk_free_rate") {
        match raw.trim().parse::<f64>() {
            Ok(v) if v.is_finite() => {}
            _ => {
                return Err(invalid(
                    "backtest",
                    "risk_free_rate",
                    "risk_free_rate must be a number",
                ));
            }
        }
    }
    Ok(())
}

/// Checks `strategyN`, `daysN` and the optional `gapN`.
fn validate_factor(config: &dyn ConfigPort, n: &str) -> Result<(), FactorTraderError> {
    let kind_key = format!("strategy{n}");
    let days_key = format!("days{n}");
    let gap_key = format!("gap{n}");

    let kind = config.get_string("strategy", &kind_key).unwrap_or_default();
    if StrategyKind::from_code(&kind, 1, None).is_none() {
        return Err(invalid(
            "strategy",
            &kind_key,
            format!("{kind_key} must be M or R, got '{}'", kind.trim()),
        ));
    }

    if config.get_string("strategy", &days_key).is_none() {
        return Err(missing("strategy", &days_key));
    }
    let days = config.get_int("strategy", &days_key, 0);
    if days < 1 || days > MAX_LOOKBACK_DAYS as i64 {
        return Err(invalid(
            "strategy",
            &days_key,
            format!("{days_key} must be between 1 and {MAX_LOOKBACK_DAYS}"),
        ));
    }

    if let Some(raw) = config.get_string("strategy", &gap_key) {
        match raw.trim().parse::<i64>() {
            Ok(g) if (0..=MAX_GAP_DAYS as i64).contains(&g) => {}
            _ => {
                return Err(invalid(
                    "strategy",
                    &gap_key,
                    format!("{gap_key} must be an integer between 0 and {MAX_GAP_DAYS}"),
                ));
            }
        }
    }
    Ok(())
}
