//! Daily simulation loop over a finalized panel.
//!
//! Each simulated date runs: refresh marks, evaluate exits, close flagged
//! positions, pick and open new entries, snapshot the portfolio value.

use chrono::NaiveDate;
use log::{debug, info, warn};
use std::collections::BTreeMap;

use super::error::{RegtraderError, SignalError};
use super::panel::{fields, Field, Panel};
use super::performance::{price_returns, stats_table, PerformanceStats, ReturnSeries};
use super::portfolio::{OpenOutcome, Portfolio, PortfolioParams};
use super::position::{trading_cost_on, RiskParams, SignalFields};
use super::selection::{best_on_date, SelectionCriteria};
use super::signals::SignalSpec;
use super::trading_history::{OpenRowPolicy, TradeAnalytics};
use crate::ports::company_port::CompanyDataPort;

#[derive(Debug, Clone)]
pub struct BacktestConfig {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub initial_capital: f64,
    pub risk_free_rate: f64,
    /// Ticker whose price returns are the benchmark series.
    pub benchmark: Option<String>,
    /// Fraction of current cash committed to each new position.
    pub position_size: f64,
    pub risk: RiskParams,
    pub signal: SignalSpec,
    pub selection: SelectionCriteria,
    pub portfolio_tag: String,
    /// Sell everything still open on the last simulated date.
    pub liquidate_at_end: bool,
    pub open_rows: OpenRowPolicy,
}

#[derive(Debug, Clone)]
pub struct BacktestResult {
    pub value_history: BTreeMap<NaiveDate, f64>,
    pub daily_returns: ReturnSeries,
    pub trades: Vec<TradeAnalytics>,
    pub stats: Vec<(String, PerformanceStats)>,
    pub final_cash: f64,
    pub opened: usize,
    pub refused: usize,
}

impl BacktestResult {
    pub fn final_value(&self) -> Option<f64> {
        self.value_history.values().next_back().copied()
    }
}

/// Runs the reference strategy: rank by price deviation, size each entry at
/// `position_size` of cash in whole shares, never hold a ticker twice.
pub fn run_backtest(
    panel: &Panel,
    company: &dyn CompanyDataPort,
    config: &BacktestConfig,
) -> Result<BacktestResult, RegtraderError> {
    let dates: Vec<NaiveDate> = panel
        .dates()
        .iter()
        .copied()
        .filter(|d| *d >= config.start_date && *d <= config.end_date)
        .collect();
    let (Some(&first), Some(&last)) = (dates.first(), dates.last()) else {
        return Err(RegtraderError::Data {
            reason: format!(
                "no panel dates between {} and {}",
                config.start_date, config.end_date
            ),
        });
    };

    let metric = config.signal.price_diff();
    if !panel.keys().any(|k| k.field == metric) {
        return Err(SignalError::MissingField(metric.to_string()).into());
    }

    let params = PortfolioParams {
        fields: SignalFields {
            theoretical: config.signal.theoretical(),
            std_dev: config.signal.std_dev(),
            price_diff: metric.clone(),
        },
        risk: config.risk,
        portfolio_tag: config.portfolio_tag.clone(),
    };
    let mut portfolio = Portfolio::new(panel, config.initial_capital, first, params).with_history();
    let (mut opened, mut refused) = (0usize, 0usize);

    info!(
        "Backtesting {} dates from {first} to {last} with {:.2} capital",
        dates.len(),
        config.initial_capital
    );

    for &date in &dates {
        portfolio.refresh(date);
        let exits = portfolio.positions_to_close(date);
        portfolio.close_positions(&exits, date);

        let picks = best_on_date(panel, date, &metric, &config.selection, Some(company));
        for ticker in picks {
            if portfolio.holds_ticker(&ticker) {
                continue;
            }
            let Some(shares) = size_entry(panel, date, &ticker, portfolio.cash(), config.position_size) else {
                continue;
            };
            match portfolio.open_position(date, &ticker, shares) {
                OpenOutcome::Opened(_) => opened += 1,
                OpenOutcome::Refused(_) => refused += 1,
            }
        }

        portfolio.add_value_snapshot(date);
    }

    if config.liquidate_at_end {
        let names: Vec<String> = portfolio.positions().map(|(n, _)| n.clone()).collect();
        portfolio.close_positions(&names, last);
        portfolio.add_value_snapshot(last);
    }

    let value_history = portfolio.value_history().clone();
    let daily_returns = portfolio.daily_returns();
    let final_cash = portfolio.cash();
    let history = portfolio.into_history().unwrap_or_default();
    let trades = history.finalize_analytics(company, config.open_rows)?;

    let stats = match &config.benchmark {
        Some(ticker) => {
            let bench: ReturnSeries = price_returns(panel, ticker)
                .into_iter()
                .filter(|(d, _)| *d > first && *d <= last)
                .collect();
            if bench.is_empty() {
                warn!("Benchmark {ticker} has no returns in the backtest range");
            }
            stats_table(
                first,
                ticker,
                &bench,
                &[(config.portfolio_tag.clone(), daily_returns.clone())],
                config.risk_free_rate,
            )
        }
        None => vec![(
            config.portfolio_tag.clone(),
            PerformanceStats::compute(first, &daily_returns, &[], config.risk_free_rate),
        )],
    };

    info!(
        "Backtest finished: {opened} opened, {refused} refused, {} trades, final cash {final_cash:.2}",
        trades.len()
    );
    Ok(BacktestResult {
        value_history,
        daily_returns,
        trades,
        stats,
        final_cash,
        opened,
        refused,
    })
}

/// Whole shares affordable with `fraction` of `cash`, including entry cost.
fn size_entry(panel: &Panel, date: NaiveDate, ticker: &str, cash: f64, fraction: f64) -> Option<f64> {
    let price = panel.value(date, &Field::raw(fields::ADJ_CLOSE), ticker).ok()?;
    let cost = match trading_cost_on(panel, date, ticker) {
        Ok(cost) => cost,
        Err(e) => {
            debug!("Skipping {ticker} on {date}: {e}");
            return None;
        }
    };
    if price <= 0.0 {
        return None;
    }
    Some((cash * fraction / (price * (1.0 + cost))).floor())
}
