//! Report output port.

use crate::domain::backtest::BacktestResult;
use crate::domain::error::FactorTraderError;
use crate::domain::metrics::PerformanceStats;

/// Port for writing backtest reports.
pub trait ReportPort {
    fn write(
        &self,
        result: &BacktestResult,
        stats: &PerformanceStats,
        output_path: &str,
    ) -> Result<(), FactorTraderError>;
}
