//! Trade ledger keyed by position name, with post-run analytics.

use chrono::NaiveDate;
use log::warn;
use std::collections::BTreeMap;
use std::fmt;

use super::error::IncompleteHistory;
use super::position::{position_name, ExitReason, WaterMark};
use crate::ports::company_port::{CompanyDataPort, UNCATEGORIZED};

#[derive(Debug, Clone, PartialEq)]
pub struct EntryFill {
    pub date: NaiveDate,
    pub ticker: String,
    pub shares: f64,
    pub price: f64,
    pub entry_cost: f64,
    pub portfolio_tag: String,
    pub indicator_tag: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExitFill {
    pub date: NaiveDate,
    pub price: f64,
    pub exit_cost: f64,
    pub reason: Option<ExitReason>,
    pub high_water: WaterMark,
    pub low_water: WaterMark,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TradeRecord {
    pub position_name: String,
    pub entry: EntryFill,
    pub exit: Option<ExitFill>,
}

/// What to do with rows that never saw an exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OpenRowPolicy {
    #[default]
    Reject,
    Exclude,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnBucket {
    Negative,
    SubMarket,
    MarketBeating,
}

impl ReturnBucket {
    pub const MARKET_RETURN: f64 = 0.10;

    pub fn from_annualized(annualized: f64) -> Self {
        if annualized < 0.0 {
            ReturnBucket::Negative
        } else if annualized < Self::MARKET_RETURN {
            ReturnBucket::SubMarket
        } else {
            ReturnBucket::MarketBeating
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ReturnBucket::Negative => "negative",
            ReturnBucket::SubMarket => "sub_market",
            ReturnBucket::MarketBeating => "market_beating",
        }
    }
}

impl fmt::Display for ReturnBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A closed trade enriched with returns and company attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct TradeAnalytics {
    pub position_name: String,
    pub entry: EntryFill,
    pub exit: ExitFill,
    pub days_held: i64,
    pub dollar_return: f64,
    /// Dollar return after entry and exit trading costs.
    pub net_return: f64,
    pub pct_return: f64,
    pub annualized_return: Option<f64>,
    pub high_pct_return: f64,
    pub high_annualized_return: Option<f64>,
    pub low_pct_return: f64,
    pub low_annualized_return: Option<f64>,
    pub name: String,
    pub sector: String,
    pub industry: String,
    pub country: String,
    pub market_cap_at_entry: Option<f64>,
    pub size_category_at_entry: Option<String>,
    pub bucket: Option<ReturnBucket>,
}

/// (1 + pct)^(365 / days) - 1; undefined for a same-day round trip.
pub fn annualize(pct_return: f64, days: i64) -> Option<f64> {
    (days > 0).then(|| (1.0 + pct_return).powf(365.0 / days as f64) - 1.0)
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TradingHistory {
    rows: BTreeMap<String, TradeRecord>,
}

impl TradingHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an entry. A second entry for the same ticker and date replaces
    /// the first.
    pub fn enter(&mut self, fill: EntryFill) {
        let name = position_name(&fill.ticker, fill.date);
        let record = TradeRecord {
            position_name: name.clone(),
            entry: fill,
            exit: None,
        };
        if self.rows.insert(name.clone(), record).is_some() {
            warn!("Trading history row {name} overwritten by a same-day entry");
        }
    }

    /// Fills the exit side of an existing row. Returns false and changes
    /// nothing if no row matches.
    pub fn exit(&mut self, ticker: &str, entry_date: NaiveDate, fill: ExitFill) -> bool {
        let name = position_name(ticker, entry_date);
        match self.rows.get_mut(&name) {
            Some(row) => {
                row.exit = Some(fill);
                true
            }
            None => {
                warn!("Position {name} not found in trading history; exit not recorded");
                false
            }
        }
    }

    pub fn get(&self, position_name: &str) -> Option<&TradeRecord> {
        self.rows.get(position_name)
    }

    pub fn records(&self) -> impl Iterator<Item = &TradeRecord> {
        self.rows.values()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Names of rows still missing an exit.
    pub fn open_positions(&self) -> Vec<String> {
        self.rows
            .values()
            .filter(|r| r.exit.is_none())
            .map(|r| r.position_name.clone())
            .collect()
    }

    /// Computes per-trade analytics, ordered by entry date then ticker.
    pub fn finalize_analytics(
        &self,
        company: &dyn CompanyDataPort,
        policy: OpenRowPolicy,
    ) -> Result<Vec<TradeAnalytics>, IncompleteHistory> {
        let open = self.open_positions();
        if !open.is_empty() {
            match policy {
                OpenRowPolicy::Reject => return Err(IncompleteHistory { open }),
                OpenRowPolicy::Exclude => {
                    warn!("Excluding {} open position(s) from trade analytics", open.len());
                }
            }
        }

        let mut out: Vec<TradeAnalytics> = self
            .rows
            .values()
            .filter_map(|row| Some(analyse(row, row.exit.as_ref()?, company)))
            .collect();
        out.sort_by(|a, b| {
            (a.entry.date, &a.entry.ticker).cmp(&(b.entry.date, &b.entry.ticker))
        });
        Ok(out)
    }
}

fn analyse(row: &TradeRecord, exit: &ExitFill, company: &dyn CompanyDataPort) -> TradeAnalytics {
    let entry = &row.entry;
    let days_held = (exit.date - entry.date).num_days();
    let pct_return = exit.price / entry.price - 1.0;
    let annualized_return = annualize(pct_return, days_held);

    let mark_return = |mark: &WaterMark| {
        let pct = mark.share_price / entry.price - 1.0;
        (pct, annualize(pct, (mark.date - entry.date).num_days()))
    };
    let (high_pct_return, high_annualized_return) = mark_return(&exit.high_water);
    let (low_pct_return, low_annualized_return) = mark_return(&exit.low_water);

    let record = company.lookup_static(&entry.ticker).unwrap_or_default();
    let or_uncategorized = |v: Option<String>| v.unwrap_or_else(|| UNCATEGORIZED.to_string());

    TradeAnalytics {
        position_name: row.position_name.clone(),
        entry: entry.clone(),
        exit: exit.clone(),
        days_held,
        dollar_return: (exit.price - entry.price) * entry.shares,
        net_return: exit.price * entry.shares * (1.0 - exit.exit_cost)
            - entry.price * entry.shares * (1.0 + entry.entry_cost),
        pct_return,
        annualized_return,
        high_pct_return,
        high_annualized_return,
        low_pct_return,
        low_annualized_return,
        name: or_uncategorized(record.name),
        sector: or_uncategorized(record.sector),
        industry: or_uncategorized(record.industry),
        country: or_uncategorized(record.country),
        market_cap_at_entry: company.market_cap(&entry.ticker, entry.date),
        size_category_at_entry: company.size_category(&entry.ticker, entry.date),
        bucket: annualized_return.map(ReturnBucket::from_annualized),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::company_port::{CompanyRecord, TimeseriesValue};
    use approx::assert_relative_eq;

    struct OneCompany;

    impl CompanyDataPort for OneCompany {
        fn lookup_static(&self, ticker: &str) -> Option<CompanyRecord> {
            (ticker == "AAA").then(|| CompanyRecord {
                ticker: "AAA".into(),
                name: Some("Alpha Corp".into()),
                sector: Some("Technology".into()),
                industry: None,
                country: Some("United States".into()),
                ..CompanyRecord::default()
            })
        }

        fn lookup_timeseries(&self, ticker: &str, field: &str, date: NaiveDate) -> Option<TimeseriesValue> {
            if ticker != "AAA" || date != d(1) {
                return None;
            }
            match field {
                "Market_Cap" => Some(TimeseriesValue::Number(5.0e9)),
                "Size_Category" => Some(TimeseriesValue::Category("mid".into())),
                _ => None,
            }
        }
    }

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    fn entry(ticker: &str, day: u32, price: f64) -> EntryFill {
        EntryFill {
            date: d(day),
            ticker: ticker.into(),
            shares: 10.0,
            price,
            entry_cost: 0.005,
            portfolio_tag: "base".into(),
            indicator_tag: "Price_Diff_30".into(),
        }
    }

    fn exit(day: u32, price: f64) -> ExitFill {
        ExitFill {
            date: d(day),
            price,
            exit_cost: 0.005,
            reason: Some(ExitReason::TakeProfit),
            high_water: WaterMark { date: d(day), share_price: price },
            low_water: WaterMark { date: d(1), share_price: 10.0 },
        }
    }

    #[test]
    fn enter_then_exit_fills_row() {
        let mut history = TradingHistory::new();
        history.enter(entry("AAA", 1, 10.0));
        assert_eq!(history.open_positions(), vec!["AAA_2024-01-01".to_string()]);
        assert!(history.exit("AAA", d(1), exit(11, 12.0)));
        assert!(history.open_positions().is_empty());
        assert_eq!(history.get("AAA_2024-01-01").unwrap().exit.as_ref().unwrap().price, 12.0);
    }

    #[test]
    fn exit_without_entry_changes_nothing() {
        let mut history = TradingHistory::new();
        history.enter(entry("AAA", 1, 10.0));
        let before = history.clone();
        assert!(!history.exit("AAA", d(2), exit(11, 12.0)));
        assert!(!history.exit("BBB", d(1), exit(11, 12.0)));
        assert_eq!(history, before);
    }

    #[test]
    fn same_day_reentry_overwrites() {
        let mut history = TradingHistory::new();
        history.enter(entry("AAA", 1, 10.0));
        history.enter(entry("AAA", 1, 11.0));
        assert_eq!(history.len(), 1);
        assert_eq!(history.get("AAA_2024-01-01").unwrap().entry.price, 11.0);
    }

    #[test]
    fn analytics_require_closed_rows() {
        let mut history = TradingHistory::new();
        history.enter(entry("AAA", 1, 10.0));
        history.enter(entry("BBB", 2, 20.0));
        history.exit("AAA", d(1), exit(11, 12.0));

        let err = history.finalize_analytics(&OneCompany, OpenRowPolicy::Reject).unwrap_err();
        assert_eq!(err.open, vec!["BBB_2024-01-02".to_string()]);

        let rows = history.finalize_analytics(&OneCompany, OpenRowPolicy::Exclude).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].entry.ticker, "AAA");
    }

    #[test]
    fn analytics_compute_returns() {
        let mut history = TradingHistory::new();
        history.enter(entry("AAA", 1, 10.0));
        history.exit("AAA", d(1), exit(11, 12.0));
        let rows = history.finalize_analytics(&OneCompany, OpenRowPolicy::Reject).unwrap();
        let row = &rows[0];

        assert_eq!(row.days_held, 10);
        assert_relative_eq!(row.dollar_return, 20.0);
        assert_relative_eq!(row.net_return, 120.0 * 0.995 - 100.0 * 1.005);
        assert_relative_eq!(row.pct_return, 0.2, epsilon = 1e-12);
        assert_relative_eq!(
            row.annualized_return.unwrap(),
            1.2f64.powf(36.5) - 1.0,
            max_relative = 1e-12
        );
        assert_eq!(row.bucket, Some(ReturnBucket::MarketBeating));
        assert_relative_eq!(row.high_pct_return, 0.2, epsilon = 1e-12);
        assert_eq!(row.low_pct_return, 0.0);
        // the low mark was set on the entry date
        assert_eq!(row.low_annualized_return, None);
    }

    #[test]
    fn analytics_join_company_attributes() {
        let mut history = TradingHistory::new();
        history.enter(entry("AAA", 1, 10.0));
        history.enter(entry("ZZZ", 1, 10.0));
        history.exit("AAA", d(1), exit(5, 9.0));
        history.exit("ZZZ", d(1), exit(5, 9.0));
        let rows = history.finalize_analytics(&OneCompany, OpenRowPolicy::Reject).unwrap();

        let aaa = &rows[0];
        assert_eq!(aaa.name, "Alpha Corp");
        assert_eq!(aaa.sector, "Technology");
        assert_eq!(aaa.industry, UNCATEGORIZED);
        assert_eq!(aaa.market_cap_at_entry, Some(5.0e9));
        assert_eq!(aaa.size_category_at_entry.as_deref(), Some("mid"));
        assert_eq!(aaa.bucket, Some(ReturnBucket::Negative));

        let zzz = &rows[1];
        assert_eq!(zzz.sector, UNCATEGORIZED);
        assert_eq!(zzz.market_cap_at_entry, None);
    }

    #[test]
    fn same_day_round_trip_has_no_annualized_return() {
        let mut history = TradingHistory::new();
        history.enter(entry("AAA", 1, 10.0));
        history.exit("AAA", d(1), exit(1, 10.5));
        let rows = history.finalize_analytics(&OneCompany, OpenRowPolicy::Reject).unwrap();
        assert_eq!(rows[0].days_held, 0);
        assert_eq!(rows[0].annualized_return, None);
        assert_eq!(rows[0].bucket, None);
    }

    #[test]
    fn bucket_thresholds() {
        assert_eq!(ReturnBucket::from_annualized(-0.01), ReturnBucket::Negative);
        assert_eq!(ReturnBucket::from_annualized(0.0), ReturnBucket::SubMarket);
        assert_eq!(ReturnBucket::from_annualized(0.0999), ReturnBucket::SubMarket);
        assert_eq!(ReturnBucket::from_annualized(0.10), ReturnBucket::MarketBeating);
    }
}
