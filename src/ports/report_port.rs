//! Report generation port trait.

use crate::domain::backtest::BacktestResult;
use crate::domain::error::RegtraderError;
use std::path::Path;

/// Port for writing backtest reports.
pub trait ReportPort {
    fn write_trades(&self, result: &BacktestResult, path: &Path) -> Result<(), RegtraderError>;

    fn write_values(&self, result: &BacktestResult, path: &Path) -> Result<(), RegtraderError>;

    fn write_stats(&self, result: &BacktestResult, path: &Path) -> Result<(), RegtraderError>;

    /// Writes all three reports into `dir` under fixed file names.
    fn write_all(&self, result: &BacktestResult, dir: &Path) -> Result<(), RegtraderError> {
        self.write_trades(result, &dir.join("trades.csv"))?;
        self.write_values(result, &dir.join("portfolio_values.csv"))?;
        self.write_stats(result, &dir.join("stats.csv"))
    }
}
