//! Concrete adapter implementations for ports.

pub mod csv_adapter;
pub mod csv_report_adapter;
pub mod file_config_adapter;
pub mod layered_config;
pub mod series_calendar;
#[cfg(feature = "sqlite")]
pub mod sqlite_adapter;
