//! Company attribute lookup port.

use chrono::NaiveDate;

/// Fallback label for a missing static attribute.
pub const UNCATEGORIZED: &str = "uncategorized";

/// Static attributes of one listed company.
#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize)]
pub struct CompanyRecord {
    #[serde(rename = "Ticker")]
    pub ticker: String,
    #[serde(rename = "Name", default)]
    pub name: Option<String>,
    #[serde(rename = "Sector", default)]
    pub sector: Option<String>,
    #[serde(rename = "Industry", default)]
    pub industry: Option<String>,
    #[serde(rename = "Country", default)]
    pub country: Option<String>,
    #[serde(rename = "IPO_Year", default)]
    pub ipo_year: Option<i32>,
    #[serde(rename = "Exchange", default)]
    pub exchange: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TimeseriesValue {
    Number(f64),
    Category(String),
}

/// Point lookups by ticker. Absent data is `None`, never an error.
pub trait CompanyDataPort {
    fn lookup_static(&self, ticker: &str) -> Option<CompanyRecord>;

    fn lookup_timeseries(&self, ticker: &str, field: &str, date: NaiveDate) -> Option<TimeseriesValue>;

    fn sector(&self, ticker: &str) -> Option<String> {
        self.lookup_static(ticker).and_then(|r| r.sector)
    }

    fn industry(&self, ticker: &str) -> Option<String> {
        self.lookup_static(ticker).and_then(|r| r.industry)
    }

    fn country(&self, ticker: &str) -> Option<String> {
        self.lookup_static(ticker).and_then(|r| r.country)
    }

    fn market_cap(&self, ticker: &str, date: NaiveDate) -> Option<f64> {
        match self.lookup_timeseries(ticker, crate::domain::panel::fields::MARKET_CAP, date)? {
            TimeseriesValue::Number(v) => Some(v),
            TimeseriesValue::Category(_) => None,
        }
    }

    fn size_category(&self, ticker: &str, date: NaiveDate) -> Option<String> {
        match self.lookup_timeseries(ticker, crate::domain::panel::fields::SIZE_CATEGORY, date)? {
            TimeseriesValue::Category(s) => Some(s),
            TimeseriesValue::Number(_) => None,
        }
    }
}
