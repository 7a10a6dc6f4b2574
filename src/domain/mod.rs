//! Core domain types and logic.

pub mod error;
pub mod trading_days;
pub mod price_series;
pub mod strategy;
pub mod factor;
pub mod selection;
pub mod blender;
pub mod backtest;
pub mod engine;
pub mod metrics;
pub mod universe;
pub mod config_validation;
