//! In-memory company data backed by a CSV of static attributes and the
//! panel's dated fields.

use chrono::NaiveDate;
use log::info;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use crate::domain::error::RegtraderError;
use crate::domain::panel::{fields, ColumnData, ColumnKey, Field, Panel};
use crate::ports::company_port::{CompanyDataPort, CompanyRecord, TimeseriesValue};

#[derive(Debug, Clone, Default)]
pub struct InMemoryCompanyData {
    records: HashMap<String, CompanyRecord>,
    series: HashMap<(String, String), BTreeMap<NaiveDate, TimeseriesValue>>,
}

impl InMemoryCompanyData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: impl IntoIterator<Item = CompanyRecord>) -> Self {
        Self {
            records: records.into_iter().map(|r| (r.ticker.clone(), r)).collect(),
            series: HashMap::new(),
        }
    }

    /// Reads `Ticker,Name,Sector,Industry,Country,IPO_Year,Exchange`.
    /// Only `Ticker` is required; blank cells become missing attributes.
    pub fn from_csv<P: AsRef<Path>>(path: P) -> Result<Self, RegtraderError> {
        let mut reader = csv::Reader::from_path(path.as_ref())?;
        let records = reader
            .deserialize::<CompanyRecord>()
            .collect::<Result<Vec<_>, _>>()?;
        info!(
            "Loaded {} company records from {}",
            records.len(),
            path.as_ref().display()
        );
        Ok(Self::from_records(records))
    }

    /// Copies the market-cap and size-category columns out of the panel.
    pub fn with_panel(mut self, panel: &Panel) -> Self {
        for name in [fields::MARKET_CAP, fields::SIZE_CATEGORY] {
            let field = Field::raw(name);
            for ticker in panel.tickers() {
                let Some(column) = panel.column(&ColumnKey::new(field.clone(), &ticker)) else {
                    continue;
                };
                let values: BTreeMap<NaiveDate, TimeseriesValue> = match column {
                    ColumnData::Numeric(v) => panel
                        .dates()
                        .iter()
                        .zip(v)
                        .filter_map(|(d, x)| Some((*d, TimeseriesValue::Number((*x)?))))
                        .collect(),
                    ColumnData::Categorical(v) => panel
                        .dates()
                        .iter()
                        .zip(v)
                        .filter_map(|(d, x)| Some((*d, TimeseriesValue::Category(x.clone()?))))
                        .collect(),
                };
                self.series.insert((ticker, name.to_string()), values);
            }
        }
        self
    }

    pub fn insert_value(&mut self, ticker: &str, field: &str, date: NaiveDate, value: TimeseriesValue) {
        self.series
            .entry((ticker.to_string(), field.to_string()))
            .or_default()
            .insert(date, value);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl CompanyDataPort for InMemoryCompanyData {
    fn lookup_static(&self, ticker: &str) -> Option<CompanyRecord> {
        self.records.get(ticker).cloned()
    }

    fn lookup_timeseries(&self, ticker: &str, field: &str, date: NaiveDate) -> Option<TimeseriesValue> {
        self.series
            .get(&(ticker.to_string(), field.to_string()))?
            .get(&date)
            .cloned()
    }
}
