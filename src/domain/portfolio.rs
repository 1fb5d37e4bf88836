//! Cash, open positions and the portfolio value history.

use chrono::NaiveDate;
use log::{debug, info, warn};
use std::collections::BTreeMap;
use std::fmt::Write as _;

use super::error::PositionError;
use super::panel::Panel;
use super::position::{trading_cost_on, Position, RiskParams, SignalFields};
use super::trading_history::{EntryFill, ExitFill, TradingHistory};

/// Pseudo-position holding the cash balance. Cannot be closed.
pub const CASH_POSITION: &str = "cash_position";

/// Parameters applied uniformly to every position opened through a portfolio.
#[derive(Debug, Clone, PartialEq)]
pub struct PortfolioParams {
    pub fields: SignalFields,
    pub risk: RiskParams,
    pub portfolio_tag: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RefusalReason {
    NoShares,
    InsufficientCash { required: f64, available: f64 },
    Lookup(PositionError),
}

#[derive(Debug, Clone, PartialEq)]
pub enum OpenOutcome {
    Opened(String),
    Refused(RefusalReason),
}

impl OpenOutcome {
    pub fn is_opened(&self) -> bool {
        matches!(self, OpenOutcome::Opened(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CloseOutcome {
    /// Cash credited after exit costs.
    Closed { proceeds: f64 },
    CashPosition,
    NotFound,
    Lookup(PositionError),
}

#[derive(Debug, Clone)]
pub struct Portfolio<'a> {
    panel: &'a Panel,
    params: PortfolioParams,
    cash: f64,
    initial_cash: f64,
    positions: BTreeMap<String, Position>,
    history: Option<TradingHistory>,
    value_history: BTreeMap<NaiveDate, f64>,
    last_date_checked: NaiveDate,
}

impl<'a> Portfolio<'a> {
    pub fn new(panel: &'a Panel, cash: f64, date: NaiveDate, params: PortfolioParams) -> Self {
        Portfolio {
            panel,
            params,
            cash,
            initial_cash: cash,
            positions: BTreeMap::new(),
            history: None,
            value_history: BTreeMap::new(),
            last_date_checked: date,
        }
    }

    /// Records every open and close into a trading history.
    pub fn with_history(mut self) -> Self {
        self.history = Some(TradingHistory::new());
        self
    }

    pub fn params(&self) -> &PortfolioParams {
        &self.params
    }

    pub fn cash(&self) -> f64 {
        self.cash
    }

    pub fn initial_cash(&self) -> f64 {
        self.initial_cash
    }

    /// Sum of the last marked values of all open positions.
    pub fn exposure(&self) -> f64 {
        self.positions.values().map(Position::current_value).sum()
    }

    pub fn position_count(&self) -> usize {
        self.positions.len()
    }

    pub fn positions(&self) -> impl Iterator<Item = (&String, &Position)> {
        self.positions.iter()
    }

    pub fn position(&self, name: &str) -> Option<&Position> {
        self.positions.get(name)
    }

    pub fn holds_ticker(&self, ticker: &str) -> bool {
        self.positions.values().any(|p| p.ticker == ticker)
    }

    pub fn history(&self) -> Option<&TradingHistory> {
        self.history.as_ref()
    }

    pub fn into_history(self) -> Option<TradingHistory> {
        self.history
    }

    pub fn last_date_checked(&self) -> NaiveDate {
        self.last_date_checked
    }

    /// Opens `shares` of `ticker` at the date's close, debiting cost basis
    /// plus entry trading cost. Refusals leave the portfolio untouched.
    pub fn open_position(&mut self, date: NaiveDate, ticker: &str, shares: f64) -> OpenOutcome {
        self.last_date_checked = date;
        if shares.is_nan() || shares <= 0.0 {
            info!("Position {ticker} not opened on {date}: no shares requested");
            return OpenOutcome::Refused(RefusalReason::NoShares);
        }

        let opened = Position::open(
            self.panel,
            date,
            ticker,
            shares,
            self.params.fields.clone(),
            self.params.risk,
        )
        .and_then(|p| Ok((trading_cost_on(self.panel, date, ticker)?, p)));
        let (cost, position) = match opened {
            Ok(v) => v,
            Err(e) => {
                warn!("Position {ticker} not opened on {date}: {e}");
                return OpenOutcome::Refused(RefusalReason::Lookup(e));
            }
        };

        let required = position.cost_basis * (1.0 + cost);
        if required > self.cash {
            info!(
                "Position {ticker} not opened on {date}: needs {required:.2} ({:.2} x (1 + {cost})), cash {:.2}",
                position.cost_basis, self.cash
            );
            return OpenOutcome::Refused(RefusalReason::InsufficientCash {
                required,
                available: self.cash,
            });
        }

        self.cash -= required;
        let name = position.name();
        if let Some(history) = self.history.as_mut() {
            history.enter(EntryFill {
                date,
                ticker: ticker.to_string(),
                shares,
                price: position.entry_price,
                entry_cost: cost,
                portfolio_tag: self.params.portfolio_tag.clone(),
                indicator_tag: self.params.fields.price_diff.to_string(),
            });
        }
        if self.positions.insert(name.clone(), position).is_some() {
            warn!("Position {name} replaced by a same-day open");
        }
        debug!("Opened {name}: {shares} shares, cash now {:.2}", self.cash);
        OpenOutcome::Opened(name)
    }

    /// Names of positions whose exit rules fire on `date`, from their last
    /// marks. Call [`Portfolio::refresh`] first.
    pub fn positions_to_close(&self, date: NaiveDate) -> Vec<String> {
        self.positions
            .iter()
            .filter(|(_, p)| p.is_time_to_sell(date).is_some())
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Marks the position once more and sells it, crediting value less exit
    /// cost. A failed mark leaves the position open.
    pub fn close_position(&mut self, name: &str, date: NaiveDate) -> CloseOutcome {
        self.last_date_checked = date;
        if name == CASH_POSITION {
            warn!("Cannot sell cash position");
            return CloseOutcome::CashPosition;
        }
        let Some(position) = self.positions.get_mut(name) else {
            warn!("Position {name} is not open");
            return CloseOutcome::NotFound;
        };

        let marked = position
            .refresh(self.panel, date)
            .and_then(|()| position.trading_cost(self.panel, date));
        let cost = match marked {
            Ok(cost) => cost,
            Err(e) => {
                warn!("Position {name} not closed on {date}: {e}");
                return CloseOutcome::Lookup(e);
            }
        };

        let proceeds = position.current_value() * (1.0 - cost);
        self.cash += proceeds;
        if let Some(history) = self.history.as_mut() {
            history.exit(
                &position.ticker,
                position.entry_date,
                ExitFill {
                    date,
                    price: position.current_share_price(),
                    exit_cost: cost,
                    reason: position.is_time_to_sell(date),
                    high_water: position.high_water(),
                    low_water: position.low_water(),
                },
            );
        }
        self.positions.remove(name);
        debug!("Closed {name} for {proceeds:.2}, cash now {:.2}", self.cash);
        CloseOutcome::Closed { proceeds }
    }

    /// Closes each name in order. No atomicity across the batch.
    pub fn close_positions(&mut self, names: &[String], date: NaiveDate) -> Vec<CloseOutcome> {
        names.iter().map(|n| self.close_position(n, date)).collect()
    }

    /// Marks every open position to `date`. Positions with no data on
    /// `date` keep their previous marks.
    pub fn refresh(&mut self, date: NaiveDate) {
        self.last_date_checked = date;
        for (name, position) in self.positions.iter_mut() {
            if let Err(e) = position.refresh(self.panel, date) {
                warn!("Could not refresh {name} on {date}: {e}");
            }
        }
    }

    /// Cash plus every position's value on `date`.
    pub fn get_portfolio_value(&mut self, date: NaiveDate) -> f64 {
        self.refresh(date);
        self.cash + self.exposure()
    }

    /// Records the portfolio value for `date`, replacing any earlier
    /// snapshot for that date.
    pub fn add_value_snapshot(&mut self, date: NaiveDate) -> f64 {
        let value = self.get_portfolio_value(date);
        self.value_history.insert(date, value);
        value
    }

    pub fn value_history(&self) -> &BTreeMap<NaiveDate, f64> {
        &self.value_history
    }

    /// Day-over-day percent change between consecutive snapshots.
    pub fn daily_returns(&self) -> Vec<(NaiveDate, f64)> {
        self.value_history
            .iter()
            .zip(self.value_history.iter().skip(1))
            .filter(|((_, prev), _)| **prev != 0.0)
            .map(|((_, prev), (date, value))| (*date, value / prev - 1.0))
            .collect()
    }

    pub fn summary(&mut self, date: NaiveDate) -> String {
        let value = self.get_portfolio_value(date);
        let mut out = format!("Current Portfolio Value: {value:.2}\nCash: {:.2}\n", self.cash);
        for position in self.positions.values() {
            let _ = writeln!(out, "{position}");
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::panel::{fields, ColumnData, ColumnKey, Field};
    use crate::domain::position::{ExitReason, TakeProfit};
    use approx::assert_relative_eq;
    use chrono::Duration;
    use proptest::prelude::*;

    fn day(n: i64) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + Duration::days(n)
    }

    fn params(risk: RiskParams) -> PortfolioParams {
        PortfolioParams {
            fields: SignalFields {
                theoretical: Field::raw("Theo"),
                std_dev: Field::std_dev(5),
                price_diff: Field::raw("Price_Diff"),
            },
            risk,
            portfolio_tag: "test".into(),
        }
    }

    fn price_panel(series: &[(&str, Vec<Option<f64>>)]) -> Panel {
        let n = series[0].1.len();
        let mut panel = Panel::new((0..n as i64).map(day));
        for (ticker, prices) in series {
            panel
                .insert(
                    ColumnKey::new(Field::raw(fields::ADJ_CLOSE), *ticker),
                    ColumnData::Numeric(prices.clone()),
                )
                .unwrap();
            panel
                .insert(
                    ColumnKey::new(Field::raw(fields::SIZE_CATEGORY), *ticker),
                    ColumnData::Categorical(vec![Some("small".into()); n]),
                )
                .unwrap();
        }
        panel
    }

    #[test]
    fn open_debits_cost_basis_plus_trading_cost() {
        let panel = price_panel(&[("AAA", vec![Some(10.0), Some(10.0)])]);
        let mut pf = Portfolio::new(&panel, 1000.0, day(0), params(RiskParams::default())).with_history();
        let outcome = pf.open_position(day(0), "AAA", 10.0);
        assert_eq!(outcome, OpenOutcome::Opened("AAA_2024-01-01".into()));
        assert_relative_eq!(pf.cash(), 1000.0 - 100.0 * 1.01);
        assert_eq!(pf.position_count(), 1);
        assert!(pf.holds_ticker("AAA"));
        assert_eq!(pf.history().unwrap().len(), 1);
    }

    #[test]
    fn refused_open_leaves_state_unchanged() {
        let panel = price_panel(&[("AAA", vec![Some(10.0)])]);
        let mut pf = Portfolio::new(&panel, 100.0, day(0), params(RiskParams::default())).with_history();
        let outcome = pf.open_position(day(0), "AAA", 15.0);
        match outcome {
            OpenOutcome::Refused(RefusalReason::InsufficientCash { required, available }) => {
                assert_relative_eq!(required, 150.0 * 1.01);
                assert_relative_eq!(available, 100.0);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_relative_eq!(pf.cash(), 100.0);
        assert_eq!(pf.position_count(), 0);
        assert!(pf.history().unwrap().is_empty());
    }

    #[test]
    fn zero_shares_and_missing_price_are_refused() {
        let panel = price_panel(&[("AAA", vec![Some(10.0), None])]);
        let mut pf = Portfolio::new(&panel, 100.0, day(0), params(RiskParams::default()));
        assert_eq!(
            pf.open_position(day(0), "AAA", 0.0),
            OpenOutcome::Refused(RefusalReason::NoShares)
        );
        assert!(matches!(
            pf.open_position(day(1), "AAA", 1.0),
            OpenOutcome::Refused(RefusalReason::Lookup(_))
        ));
        assert!(matches!(
            pf.open_position(day(0), "QQQ", 1.0),
            OpenOutcome::Refused(RefusalReason::Lookup(_))
        ));
        assert_relative_eq!(pf.cash(), 100.0);
    }

    #[test]
    fn theoretical_take_profit_without_theo_is_refused() {
        let panel = price_panel(&[("AAA", vec![Some(10.0), Some(1000.0)])]);
        let risk = RiskParams {
            take_profit: TakeProfit::RelativeToEntryTheo,
            ..RiskParams::default()
        };
        let mut pf = Portfolio::new(&panel, 100.0, day(0), params(risk)).with_history();
        assert!(matches!(
            pf.open_position(day(0), "AAA", 1.0),
            OpenOutcome::Refused(RefusalReason::Lookup(PositionError::Lookup { .. }))
        ));
        assert_relative_eq!(pf.cash(), 100.0);
        assert_eq!(pf.position_count(), 0);
        assert!(pf.history().unwrap().is_empty());
    }

    #[test]
    fn cash_position_cannot_be_closed() {
        let panel = price_panel(&[("AAA", vec![Some(10.0)])]);
        let mut pf = Portfolio::new(&panel, 100.0, day(0), params(RiskParams::default()));
        assert_eq!(pf.close_position(CASH_POSITION, day(0)), CloseOutcome::CashPosition);
        assert_eq!(pf.close_position("AAA_2024-01-01", day(0)), CloseOutcome::NotFound);
        assert_relative_eq!(pf.cash(), 100.0);
    }

    #[test]
    fn round_trip_at_unchanged_price_loses_only_costs() {
        let panel = price_panel(&[("AAA", vec![Some(10.0), Some(10.0)])]);
        let mut pf = Portfolio::new(&panel, 1000.0, day(0), params(RiskParams::default())).with_history();
        pf.open_position(day(0), "AAA", 10.0);
        let outcome = pf.close_position("AAA_2024-01-01", day(1));
        assert_eq!(outcome, CloseOutcome::Closed { proceeds: 100.0 * 0.99 });
        assert_relative_eq!(pf.cash(), 1000.0 - 100.0 * 1.01 + 100.0 * 0.99);
        assert_eq!(pf.position_count(), 0);
        let row = pf.history().unwrap().get("AAA_2024-01-01").unwrap();
        assert_eq!(row.exit.as_ref().unwrap().date, day(1));
    }

    #[test]
    fn close_with_missing_price_keeps_position() {
        let panel = price_panel(&[("AAA", vec![Some(10.0), None])]);
        let mut pf = Portfolio::new(&panel, 1000.0, day(0), params(RiskParams::default()));
        pf.open_position(day(0), "AAA", 10.0);
        let cash = pf.cash();
        assert!(matches!(pf.close_position("AAA_2024-01-01", day(1)), CloseOutcome::Lookup(_)));
        assert_relative_eq!(pf.cash(), cash);
        assert_eq!(pf.position_count(), 1);
    }

    #[test]
    fn exits_follow_rule_priority() {
        let mut prices = vec![Some(10.0); 11];
        prices.push(Some(4.0));
        let panel = price_panel(&[("AAA", prices)]);
        let risk = RiskParams {
            stop_loss: 0.5,
            take_profit: TakeProfit::Disabled,
            max_age_days: Some(10),
        };
        let mut pf = Portfolio::new(&panel, 1000.0, day(0), params(risk)).with_history();
        pf.open_position(day(0), "AAA", 10.0);

        pf.refresh(day(5));
        assert!(pf.positions_to_close(day(5)).is_empty());

        pf.refresh(day(11));
        let names = pf.positions_to_close(day(11));
        assert_eq!(names, vec!["AAA_2024-01-01".to_string()]);
        pf.close_positions(&names, day(11));
        let row = pf.history().unwrap().get("AAA_2024-01-01").unwrap();
        assert_eq!(row.exit.as_ref().unwrap().reason, Some(ExitReason::TooOld));
    }

    #[test]
    fn snapshots_overwrite_same_date() {
        let panel = price_panel(&[("AAA", vec![Some(10.0), Some(12.0), Some(9.0)])]);
        let mut pf = Portfolio::new(&panel, 1000.0, day(0), params(RiskParams::default()));
        pf.open_position(day(0), "AAA", 10.0);
        pf.add_value_snapshot(day(0));
        pf.add_value_snapshot(day(1));
        pf.add_value_snapshot(day(1));
        pf.add_value_snapshot(day(2));
        assert_eq!(pf.value_history().len(), 3);
        let cash = 1000.0 - 101.0;
        assert_relative_eq!(pf.value_history()[&day(1)], cash + 120.0);

        let returns = pf.daily_returns();
        assert_eq!(returns.len(), 2);
        assert_eq!(returns[0].0, day(1));
        assert_relative_eq!(returns[0].1, (cash + 120.0) / (cash + 100.0) - 1.0);
    }

    #[test]
    fn refresh_skips_missing_data_without_failing() {
        let panel = price_panel(&[
            ("AAA", vec![Some(10.0), None]),
            ("BBB", vec![Some(5.0), Some(6.0)]),
        ]);
        let mut pf = Portfolio::new(&panel, 1000.0, day(0), params(RiskParams::default()));
        pf.open_position(day(0), "AAA", 1.0);
        pf.open_position(day(0), "BBB", 1.0);
        let value = pf.get_portfolio_value(day(1));
        assert_relative_eq!(value, pf.cash() + 10.0 + 6.0);
        assert_relative_eq!(pf.exposure(), 16.0);
    }

    #[test]
    fn summary_lists_positions() {
        let panel = price_panel(&[("AAA", vec![Some(10.0)])]);
        let mut pf = Portfolio::new(&panel, 1000.0, day(0), params(RiskParams::default()));
        pf.open_position(day(0), "AAA", 1.0);
        let text = pf.summary(day(0));
        assert!(text.starts_with("Current Portfolio Value: 999.90"));
        assert!(text.contains("AAA opened 2024-01-01"));
    }

    proptest! {
        #[test]
        fn cash_is_conserved_across_round_trips(
            entry in 1.0f64..200.0,
            exit in 1.0f64..200.0,
            shares in 1u32..50,
        ) {
            let panel = price_panel(&[("AAA", vec![Some(entry), Some(exit)])]);
            let start = 1.0e6;
            let mut pf = Portfolio::new(&panel, start, day(0), params(RiskParams::default()));
            let shares = shares as f64;
            prop_assert!(pf.open_position(day(0), "AAA", shares).is_opened());
            let after_open = start - shares * entry * 1.01;
            prop_assert!((pf.cash() - after_open).abs() < 1e-6);
            pf.close_position("AAA_2024-01-01", day(1));
            let after_close = after_open + shares * exit * 0.99;
            prop_assert!((pf.cash() - after_close).abs() < 1e-6);
        }
    }
}
