//! A single open trade: entry terms, mark-to-market state and exit rules.

use chrono::NaiveDate;
use log::warn;
use std::fmt;
use std::str::FromStr;

use super::error::{PanelError, PositionError};
use super::panel::{fields, Field, Panel};

/// Market-cap bucket driving the trading-cost assumption.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SizeCategory {
    Micro,
    Small,
    Mid,
    Large,
    Mega,
}

impl SizeCategory {
    pub const ALL: [SizeCategory; 5] = [
        SizeCategory::Mega,
        SizeCategory::Large,
        SizeCategory::Mid,
        SizeCategory::Small,
        SizeCategory::Micro,
    ];

    /// One-way trading cost as a fraction of traded value.
    pub fn trading_cost(self) -> f64 {
        match self {
            SizeCategory::Micro => 0.02,
            SizeCategory::Small => 0.01,
            SizeCategory::Mid => 0.005,
            SizeCategory::Large => 0.002,
            SizeCategory::Mega => 0.001,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SizeCategory::Micro => "micro",
            SizeCategory::Small => "small",
            SizeCategory::Mid => "mid",
            SizeCategory::Large => "large",
            SizeCategory::Mega => "mega",
        }
    }
}

impl FromStr for SizeCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "micro" => Ok(SizeCategory::Micro),
            "small" => Ok(SizeCategory::Small),
            "mid" => Ok(SizeCategory::Mid),
            "large" => Ok(SizeCategory::Large),
            "mega" => Ok(SizeCategory::Mega),
            other => Err(format!("unknown size category: {other}")),
        }
    }
}

impl fmt::Display for SizeCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TakeProfit {
    Disabled,
    /// Exit once value / cost basis reaches this ratio.
    Fixed(f64),
    /// Exit once value reaches the theoretical value recorded at entry.
    RelativeToEntryTheo,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RiskParams {
    /// Exit once value / cost basis falls to this ratio. 0 disables.
    pub stop_loss: f64,
    pub take_profit: TakeProfit,
    /// Calendar days; `None` disables the age rule.
    pub max_age_days: Option<i64>,
}

impl Default for RiskParams {
    fn default() -> Self {
        RiskParams {
            stop_loss: 0.0,
            take_profit: TakeProfit::Disabled,
            max_age_days: None,
        }
    }
}

/// Panel fields a position tracks alongside its price.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalFields {
    pub theoretical: Field,
    pub std_dev: Field,
    pub price_diff: Field,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WaterMark {
    pub date: NaiveDate,
    pub share_price: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExitReason {
    TooOld,
    StopLoss,
    TakeProfit,
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ExitReason::TooOld => "too_old",
            ExitReason::StopLoss => "stop_loss",
            ExitReason::TakeProfit => "take_profit",
        })
    }
}

pub fn position_name(ticker: &str, entry_date: NaiveDate) -> String {
    format!("{ticker}_{entry_date}")
}

#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub ticker: String,
    pub entry_date: NaiveDate,
    pub shares: f64,
    pub entry_price: f64,
    pub cost_basis: f64,
    /// shares x theoretical price on the entry date.
    pub entry_theo_value: Option<f64>,
    pub fields: SignalFields,
    pub risk: RiskParams,
    current_value: f64,
    current_share_price: f64,
    current_theo: Option<f64>,
    current_std_dev: Option<f64>,
    current_price_diff: Option<f64>,
    high_water: WaterMark,
    low_water: WaterMark,
    last_refreshed: NaiveDate,
}

impl Position {
    /// Opens at the entry date's adjusted close. Fails if the panel has no
    /// price for the ticker on that date, or no theoretical value when the
    /// take-profit target depends on it.
    pub fn open(
        panel: &Panel,
        entry_date: NaiveDate,
        ticker: &str,
        shares: f64,
        fields: SignalFields,
        risk: RiskParams,
    ) -> Result<Position, PositionError> {
        let price = price_on(panel, entry_date, ticker)?;
        let theo = match panel.value(entry_date, &fields.theoretical, ticker) {
            Ok(value) => Some(value),
            Err(e) if matches!(risk.take_profit, TakeProfit::RelativeToEntryTheo) => {
                return Err(lookup(ticker, e));
            }
            Err(e) => {
                warn!("{ticker}: no {} on {entry_date}: {e}", fields.theoretical);
                None
            }
        };
        let mark = WaterMark {
            date: entry_date,
            share_price: price,
        };
        let mut position = Position {
            ticker: ticker.to_string(),
            entry_date,
            shares,
            entry_price: price,
            cost_basis: shares * price,
            entry_theo_value: theo.map(|t| shares * t),
            fields,
            risk,
            current_value: shares * price,
            current_share_price: price,
            current_theo: theo,
            current_std_dev: None,
            current_price_diff: None,
            high_water: mark,
            low_water: mark,
            last_refreshed: entry_date,
        };
        position.refresh_signals(panel, entry_date);
        Ok(position)
    }

    pub fn name(&self) -> String {
        position_name(&self.ticker, self.entry_date)
    }

    /// Marks to market on `date`. Safe to call repeatedly for the same date.
    pub fn refresh(&mut self, panel: &Panel, date: NaiveDate) -> Result<(), PositionError> {
        let price = price_on(panel, date, &self.ticker)?;
        self.current_share_price = price;
        self.current_value = self.shares * price;
        self.refresh_signals(panel, date);
        self.last_refreshed = date;

        if price > self.high_water.share_price {
            self.high_water = WaterMark {
                date,
                share_price: price,
            };
        }
        if price < self.low_water.share_price {
            self.low_water = WaterMark {
                date,
                share_price: price,
            };
        }
        Ok(())
    }

    fn refresh_signals(&mut self, panel: &Panel, date: NaiveDate) {
        self.current_theo = self.signal_on(panel, date, &self.fields.theoretical);
        self.current_std_dev = self.signal_on(panel, date, &self.fields.std_dev);
        self.current_price_diff = self.signal_on(panel, date, &self.fields.price_diff);
    }

    fn signal_on(&self, panel: &Panel, date: NaiveDate, field: &Field) -> Option<f64> {
        panel
            .value(date, field, &self.ticker)
            .map_err(|e| warn!("{}: no {field} on {date}: {e}", self.ticker))
            .ok()
    }

    pub fn days_old(&self, date: NaiveDate) -> i64 {
        (date - self.entry_date).num_days()
    }

    /// Exit rules in priority order: age, stop-loss, take-profit.
    pub fn is_time_to_sell(&self, date: NaiveDate) -> Option<ExitReason> {
        if let Some(max_age) = self.risk.max_age_days {
            if self.days_old(date) >= max_age {
                return Some(ExitReason::TooOld);
            }
        }

        let ratio = self.current_value / self.cost_basis;
        if ratio <= self.risk.stop_loss {
            return Some(ExitReason::StopLoss);
        }

        let take = match self.risk.take_profit {
            TakeProfit::Disabled => false,
            TakeProfit::Fixed(threshold) => ratio >= threshold,
            TakeProfit::RelativeToEntryTheo => self
                .entry_theo_value
                .is_some_and(|theo| self.current_value >= theo),
        };
        take.then_some(ExitReason::TakeProfit)
    }

    /// Cost fraction for the ticker's size category on `date`.
    pub fn trading_cost(&self, panel: &Panel, date: NaiveDate) -> Result<f64, PositionError> {
        trading_cost_on(panel, date, &self.ticker)
    }

    pub fn current_value(&self) -> f64 {
        self.current_value
    }

    pub fn current_share_price(&self) -> f64 {
        self.current_share_price
    }

    pub fn current_theo(&self) -> Option<f64> {
        self.current_theo
    }

    pub fn current_std_dev(&self) -> Option<f64> {
        self.current_std_dev
    }

    pub fn current_price_diff(&self) -> Option<f64> {
        self.current_price_diff
    }

    pub fn high_water(&self) -> WaterMark {
        self.high_water
    }

    pub fn low_water(&self) -> WaterMark {
        self.low_water
    }

    pub fn last_refreshed(&self) -> NaiveDate {
        self.last_refreshed
    }

    pub fn unrealized_pnl(&self) -> f64 {
        self.current_value - self.cost_basis
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} opened {} shares={} cost_basis={:.2} value={:.2} checked={}",
            self.ticker,
            self.entry_date,
            self.shares,
            self.cost_basis,
            self.current_value,
            self.last_refreshed
        )
    }
}

fn lookup(ticker: &str, source: PanelError) -> PositionError {
    PositionError::Lookup {
        ticker: ticker.to_string(),
        source,
    }
}

pub(crate) fn price_on(panel: &Panel, date: NaiveDate, ticker: &str) -> Result<f64, PositionError> {
    panel
        .value(date, &Field::raw(fields::ADJ_CLOSE), ticker)
        .map_err(|e| lookup(ticker, e))
}

/// Trading cost for `ticker` from its size category on `date`.
pub fn trading_cost_on(panel: &Panel, date: NaiveDate, ticker: &str) -> Result<f64, PositionError> {
    let raw = panel
        .category(date, &Field::raw(fields::SIZE_CATEGORY), ticker)
        .map_err(|e| lookup(ticker, e))?;
    raw.parse::<SizeCategory>()
        .map(SizeCategory::trading_cost)
        .map_err(|_| PositionError::UnknownSizeCategory {
            ticker: ticker.to_string(),
            category: raw.to_string(),
            date,
        })
}
