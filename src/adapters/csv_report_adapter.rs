//! CSV reports: trade analytics, portfolio values and performance stats.

use chrono::NaiveDate;
use log::info;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

use crate::domain::backtest::BacktestResult;
use crate::domain::error::RegtraderError;
use crate::domain::trading_history::TradeAnalytics;
use crate::ports::report_port::ReportPort;

const STATS_DECIMALS: i32 = 3;

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct TradeRow<'a> {
    position_name: &'a str,
    ticker: &'a str,
    entry_date: NaiveDate,
    entry_share_price: f64,
    entry_trading_cost: f64,
    shares: f64,
    exit_date: NaiveDate,
    exit_share_price: f64,
    exit_trading_cost: f64,
    exit_reason: String,
    high_share_price: f64,
    high_share_price_date: NaiveDate,
    low_share_price: f64,
    low_share_price_date: NaiveDate,
    days_held: i64,
    #[serde(rename = "Return")]
    dollar_return: f64,
    net_return: f64,
    percent_return: f64,
    annualized_percent_return: Option<f64>,
    high_percent_return: f64,
    high_annualized_percent_return: Option<f64>,
    low_percent_return: f64,
    low_annualized_percent_return: Option<f64>,
    return_bucket: &'static str,
    name: &'a str,
    sector: &'a str,
    industry: &'a str,
    country: &'a str,
    market_cap_entry: Option<f64>,
    size_category_entry: Option<&'a str>,
    portfolio: &'a str,
    indicator: &'a str,
}

impl<'a> From<&'a TradeAnalytics> for TradeRow<'a> {
    fn from(t: &'a TradeAnalytics) -> Self {
        TradeRow {
            position_name: &t.position_name,
            ticker: &t.entry.ticker,
            entry_date: t.entry.date,
            entry_share_price: t.entry.price,
            entry_trading_cost: t.entry.entry_cost,
            shares: t.entry.shares,
            exit_date: t.exit.date,
            exit_share_price: t.exit.price,
            exit_trading_cost: t.exit.exit_cost,
            exit_reason: t.exit.reason.map(|r| r.to_string()).unwrap_or_default(),
            high_share_price: t.exit.high_water.share_price,
            high_share_price_date: t.exit.high_water.date,
            low_share_price: t.exit.low_water.share_price,
            low_share_price_date: t.exit.low_water.date,
            days_held: t.days_held,
            dollar_return: t.dollar_return,
            net_return: t.net_return,
            percent_return: t.pct_return,
            annualized_percent_return: t.annualized_return,
            high_percent_return: t.high_pct_return,
            high_annualized_percent_return: t.high_annualized_return,
            low_percent_return: t.low_pct_return,
            low_annualized_percent_return: t.low_annualized_return,
            return_bucket: t.bucket.map(|b| b.as_str()).unwrap_or(""),
            name: &t.name,
            sector: &t.sector,
            industry: &t.industry,
            country: &t.country,
            market_cap_entry: t.market_cap_at_entry,
            size_category_entry: t.size_category_at_entry.as_deref(),
            portfolio: &t.entry.portfolio_tag,
            indicator: &t.entry.indicator_tag,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct ValueRow {
    date: NaiveDate,
    value: f64,
    daily_return: Option<f64>,
}

#[derive(Debug, Serialize)]
struct StatsRow<'a> {
    #[serde(rename = "Portfolio_Name")]
    portfolio_name: &'a str,
    #[serde(rename = "CAGR")]
    cagr: f64,
    #[serde(rename = "Volatility")]
    volatility: f64,
    #[serde(rename = "Max_Drawdown")]
    max_drawdown: f64,
    #[serde(rename = "Alpha")]
    alpha: f64,
    #[serde(rename = "Beta")]
    beta: f64,
    #[serde(rename = "Sharpe")]
    sharpe: f64,
    #[serde(rename = "Sortino")]
    sortino: f64,
}

#[derive(Debug, Default)]
pub struct CsvReportAdapter;

impl CsvReportAdapter {
    pub fn new() -> Self {
        Self
    }
}

impl ReportPort for CsvReportAdapter {
    fn write_trades(&self, result: &BacktestResult, path: &Path) -> Result<(), RegtraderError> {
        let mut writer = csv::Writer::from_path(path)?;
        for trade in &result.trades {
            writer.serialize(TradeRow::from(trade))?;
        }
        writer.flush()?;
        info!("Wrote {} trades to {}", result.trades.len(), path.display());
        Ok(())
    }

    fn write_values(&self, result: &BacktestResult, path: &Path) -> Result<(), RegtraderError> {
        let mut writer = csv::Writer::from_path(path)?;
        let returns: BTreeMap<NaiveDate, f64> =
            result.daily_returns.iter().copied().collect();
        for (date, value) in &result.value_history {
            writer.serialize(ValueRow {
                date: *date,
                value: *value,
                daily_return: returns.get(date).copied(),
            })?;
        }
        writer.flush()?;
        info!("Wrote portfolio values to {}", path.display());
        Ok(())
    }

    fn write_stats(&self, result: &BacktestResult, path: &Path) -> Result<(), RegtraderError> {
        let mut writer = csv::Writer::from_path(path)?;
        for (name, stats) in &result.stats {
            let s = stats.rounded(STATS_DECIMALS);
            writer.serialize(StatsRow {
                portfolio_name: name,
                cagr: s.cagr,
                volatility: s.volatility,
                max_drawdown: s.max_drawdown,
                alpha: s.alpha,
                beta: s.beta,
                sharpe: s.sharpe,
                sortino: s.sortino,
            })?;
        }
        writer.flush()?;
        info!("Wrote stats to {}", path.display());
        Ok(())
    }
}
