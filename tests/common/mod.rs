#![allow(dead_code)]

use chrono::{Duration, NaiveDate};
use regtrader::adapters::csv_panel_adapter::CsvPanelAdapter;
use regtrader::domain::panel::{fields, ColumnData, ColumnKey, Field, Panel};
use regtrader::ports::company_port::{CompanyDataPort, CompanyRecord, TimeseriesValue};
use regtrader::ports::data_port::DataPort;
use std::collections::HashMap;
use std::io::Write;
use std::path::Path;

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Small deterministic noise so rolling fits have non-zero residuals.
pub fn wobble(i: usize) -> f64 {
    [0.0, 0.6, -0.4, 0.9, -0.7][i % 5]
}

/// `base + slope * i + wobble(i)` for `count` rows.
pub fn noisy_trend(base: f64, slope: f64, count: usize) -> Vec<f64> {
    (0..count)
        .map(|i| base + slope * i as f64 + wobble(i))
        .collect()
}

/// Builds a panel over consecutive calendar days.
pub struct PanelBuilder {
    dates: Vec<NaiveDate>,
    columns: Vec<(ColumnKey, ColumnData)>,
}

impl PanelBuilder {
    pub fn new(start: NaiveDate, days: usize) -> Self {
        Self {
            dates: (0..days).map(|i| start + Duration::days(i as i64)).collect(),
            columns: Vec::new(),
        }
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    /// Adj_Close, Volume and Size_Category for one ticker.
    pub fn ticker(self, ticker: &str, prices: &[f64], size: &str) -> Self {
        assert_eq!(prices.len(), self.dates.len());
        let rows = self.dates.len();
        self.numeric(fields::ADJ_CLOSE, ticker, prices.iter().map(|p| Some(*p)).collect())
            .numeric(fields::VOLUME, ticker, vec![Some(1_000_000.0); rows])
            .categorical(fields::SIZE_CATEGORY, ticker, vec![Some(size.to_string()); rows])
    }

    pub fn numeric(mut self, field: &str, ticker: &str, values: Vec<Option<f64>>) -> Self {
        self.columns.push((
            ColumnKey::new(Field::raw(field), ticker),
            ColumnData::Numeric(values),
        ));
        self
    }

    pub fn categorical(mut self, field: &str, ticker: &str, values: Vec<Option<String>>) -> Self {
        self.columns.push((
            ColumnKey::new(Field::raw(field), ticker),
            ColumnData::Categorical(values),
        ));
        self
    }

    pub fn build(self) -> Panel {
        let mut panel = Panel::new(self.dates);
        for (key, data) in self.columns {
            panel.insert(key, data).unwrap();
        }
        panel
    }
}

/// Two tickers over 40 days: a steady riser and a noisier laggard.
pub fn two_ticker_panel() -> Panel {
    PanelBuilder::new(date(2024, 1, 1), 40)
        .ticker("AAA", &noisy_trend(50.0, 0.5, 40), "mega")
        .ticker("BBB", &noisy_trend(20.0, 0.1, 40), "small")
        .build()
}

pub fn write_panel_csv(panel: &Panel, path: &Path) {
    CsvPanelAdapter::new(path).save_panel(panel).unwrap();
}

pub fn write_temp_ini(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

/// Company data with static records only.
#[derive(Default)]
pub struct MockCompanyData {
    pub records: HashMap<String, CompanyRecord>,
}

impl MockCompanyData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_company(mut self, ticker: &str, sector: &str, country: &str) -> Self {
        self.records.insert(
            ticker.to_string(),
            CompanyRecord {
                ticker: ticker.to_string(),
                name: Some(format!("{ticker} Holdings")),
                sector: Some(sector.to_string()),
                country: Some(country.to_string()),
                ..CompanyRecord::default()
            },
        );
        self
    }
}

impl CompanyDataPort for MockCompanyData {
    fn lookup_static(&self, ticker: &str) -> Option<CompanyRecord> {
        self.records.get(ticker).cloned()
    }

    fn lookup_timeseries(&self, _ticker: &str, _field: &str, _date: NaiveDate) -> Option<TimeseriesValue> {
        None
    }
}
