//! Wide panel table: trading dates x (field, ticker) columns.
//!
//! Columns are keyed structurally. Regression outputs carry their window and
//! role in the key itself, so nothing downstream has to parse column names.

use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

use super::date_numbers::date_to_ordinal;
use super::error::PanelError;

/// Ticker slot used by ticker-independent fields (calendar features etc.).
pub const TICKER_INDEPENDENT: &str = "";

/// Field names the rest of the crate relies on.
pub mod fields {
    pub const ADJ_CLOSE: &str = "Adj_Close";
    pub const VOLUME: &str = "Volume";
    pub const VOLUME_VALUE: &str = "Volume_Value";
    pub const MARKET_CAP: &str = "Market_Cap";
    pub const SIZE_CATEGORY: &str = "Size_Category";
    pub const DATES_NUMERIC: &str = "Dates_Numeric";
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RegressionRole {
    Intercept,
    /// Slope on the named predictor field.
    Coefficient(String),
    /// Population standard deviation of the regression target.
    StdDev,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Field {
    Raw(String),
    Regression { window: usize, role: RegressionRole },
}

impl Field {
    pub fn raw(name: impl Into<String>) -> Self {
        Field::Raw(name.into())
    }

    pub fn intercept(window: usize) -> Self {
        Field::Regression {
            window,
            role: RegressionRole::Intercept,
        }
    }

    pub fn coefficient(predictor: impl Into<String>, window: usize) -> Self {
        Field::Regression {
            window,
            role: RegressionRole::Coefficient(predictor.into()),
        }
    }

    pub fn std_dev(window: usize) -> Self {
        Field::Regression {
            window,
            role: RegressionRole::StdDev,
        }
    }

    pub fn window(&self) -> Option<usize> {
        match self {
            Field::Raw(_) => None,
            Field::Regression { window, .. } => Some(*window),
        }
    }

    pub fn raw_name(&self) -> Option<&str> {
        match self {
            Field::Raw(name) => Some(name),
            Field::Regression { .. } => None,
        }
    }

    pub fn is_std_dev(&self) -> bool {
        matches!(
            self,
            Field::Regression {
                role: RegressionRole::StdDev,
                ..
            }
        )
    }

    /// Intercept or coefficient.
    pub fn is_regression_param(&self) -> bool {
        matches!(
            self,
            Field::Regression {
                role: RegressionRole::Intercept | RegressionRole::Coefficient(_),
                ..
            }
        )
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Field::Raw(name) => write!(f, "{name}"),
            Field::Regression { window, role } => match role {
                RegressionRole::Intercept => write!(f, "Intercept_{window}"),
                RegressionRole::Coefficient(p) => write!(f, "{p}_Coeff_{window}"),
                RegressionRole::StdDev => write!(f, "Std_Dev_{window}"),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ColumnKey {
    pub field: Field,
    pub ticker: String,
}

impl ColumnKey {
    pub fn new(field: Field, ticker: impl Into<String>) -> Self {
        Self {
            field,
            ticker: ticker.into(),
        }
    }

    pub fn shared(field: Field) -> Self {
        Self::new(field, TICKER_INDEPENDENT)
    }

    pub fn is_shared(&self) -> bool {
        self.ticker == TICKER_INDEPENDENT
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    Numeric(Vec<Option<f64>>),
    Categorical(Vec<Option<String>>),
}

impl ColumnData {
    pub fn len(&self) -> usize {
        match self {
            ColumnData::Numeric(v) => v.len(),
            ColumnData::Categorical(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn select_rows(&self, rows: &[usize]) -> ColumnData {
        match self {
            ColumnData::Numeric(v) => ColumnData::Numeric(rows.iter().map(|&i| v[i]).collect()),
            ColumnData::Categorical(v) => {
                ColumnData::Categorical(rows.iter().map(|&i| v[i].clone()).collect())
            }
        }
    }
}

/// New columns computed against a panel, merged back with [`Panel::merge`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PanelFragment {
    pub dates: Vec<NaiveDate>,
    pub columns: Vec<(ColumnKey, ColumnData)>,
}

impl PanelFragment {
    pub fn new(dates: Vec<NaiveDate>) -> Self {
        Self {
            dates,
            columns: Vec::new(),
        }
    }

    pub fn push(&mut self, key: ColumnKey, data: ColumnData) {
        self.columns.push((key, data));
    }

    pub fn extend(&mut self, other: PanelFragment) {
        self.columns.extend(other.columns);
    }

    pub fn has_column(&self, key: &ColumnKey) -> bool {
        self.columns.iter().any(|(k, _)| k == key)
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// Composable column/row filters for [`Panel::select`]. `None` keeps everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubsetFilter {
    pub tickers: Option<Vec<String>>,
    pub exclude_fields: Vec<String>,
    pub std_dev_windows: Option<Vec<usize>>,
    pub regression_windows: Option<Vec<usize>>,
    /// Keep only dates strictly after this one.
    pub start_after: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Panel {
    dates: Vec<NaiveDate>,
    date_index: HashMap<NaiveDate, usize>,
    columns: BTreeMap<ColumnKey, ColumnData>,
}

impl Panel {
    /// Builds an empty panel over the given dates, sorted and de-duplicated.
    pub fn new(dates: impl IntoIterator<Item = NaiveDate>) -> Self {
        let dates: Vec<NaiveDate> = dates
            .into_iter()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let date_index = dates.iter().enumerate().map(|(i, d)| (*d, i)).collect();
        Self {
            dates,
            date_index,
            columns: BTreeMap::new(),
        }
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn row_count(&self) -> usize {
        self.dates.len()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn date_position(&self, date: NaiveDate) -> Option<usize> {
        self.date_index.get(&date).copied()
    }

    pub fn insert(&mut self, key: ColumnKey, data: ColumnData) -> Result<(), PanelError> {
        if data.len() != self.dates.len() {
            return Err(PanelError::LengthMismatch {
                field: key.field.to_string(),
                ticker: key.ticker.clone(),
                expected: self.dates.len(),
                got: data.len(),
            });
        }
        if self.columns.contains_key(&key) {
            return Err(PanelError::DuplicateColumn {
                field: key.field.to_string(),
                ticker: key.ticker,
            });
        }
        self.columns.insert(key, data);
        Ok(())
    }

    pub fn contains(&self, key: &ColumnKey) -> bool {
        self.columns.contains_key(key)
    }

    pub fn column(&self, key: &ColumnKey) -> Option<&ColumnData> {
        self.columns.get(key)
    }

    pub fn columns(&self) -> impl Iterator<Item = (&ColumnKey, &ColumnData)> {
        self.columns.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &ColumnKey> {
        self.columns.keys()
    }

    pub fn numeric(&self, key: &ColumnKey) -> Option<&[Option<f64>]> {
        match self.columns.get(key) {
            Some(ColumnData::Numeric(v)) => Some(v),
            _ => None,
        }
    }

    /// The ticker's own column, falling back to the ticker-independent one.
    pub fn numeric_for(&self, field: &Field, ticker: &str) -> Option<&[Option<f64>]> {
        self.numeric(&ColumnKey::new(field.clone(), ticker))
            .or_else(|| self.numeric(&ColumnKey::shared(field.clone())))
    }

    /// Sorted tickers, excluding the ticker-independent slot.
    pub fn tickers(&self) -> Vec<String> {
        self.columns
            .keys()
            .filter(|k| !k.is_shared())
            .map(|k| k.ticker.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Fields present for `ticker` (not including ticker-independent ones).
    pub fn fields_for(&self, ticker: &str) -> Vec<&Field> {
        self.columns
            .keys()
            .filter(|k| k.ticker == ticker)
            .map(|k| &k.field)
            .collect()
    }

    pub fn value(&self, date: NaiveDate, field: &Field, ticker: &str) -> Result<f64, PanelError> {
        let row = self
            .date_position(date)
            .ok_or(PanelError::MissingDate(date))?;
        let column = self
            .numeric_for(field, ticker)
            .ok_or_else(|| self.missing_column(field, ticker))?;
        column[row].ok_or_else(|| PanelError::MissingValue {
            field: field.to_string(),
            ticker: ticker.to_string(),
            date,
        })
    }

    pub fn category(&self, date: NaiveDate, field: &Field, ticker: &str) -> Result<&str, PanelError> {
        let row = self
            .date_position(date)
            .ok_or(PanelError::MissingDate(date))?;
        let key = ColumnKey::new(field.clone(), ticker);
        match self.columns.get(&key) {
            Some(ColumnData::Categorical(v)) => {
                v[row].as_deref().ok_or_else(|| PanelError::MissingValue {
                    field: field.to_string(),
                    ticker: ticker.to_string(),
                    date,
                })
            }
            Some(ColumnData::Numeric(_)) => Err(PanelError::WrongKind {
                field: field.to_string(),
                ticker: ticker.to_string(),
                expected: "categorical",
            }),
            None => Err(self.missing_column(field, ticker)),
        }
    }

    fn missing_column(&self, field: &Field, ticker: &str) -> PanelError {
        PanelError::MissingColumn {
            field: field.to_string(),
            ticker: ticker.to_string(),
        }
    }

    /// Returns a new panel with the fragment's columns added.
    pub fn merge(mut self, fragment: PanelFragment) -> Result<Panel, PanelError> {
        if !fragment.columns.is_empty() && fragment.dates != self.dates {
            return Err(PanelError::DateMismatch);
        }
        for (key, data) in fragment.columns {
            self.insert(key, data)?;
        }
        Ok(self)
    }

    /// Adds a ticker-independent column of day ordinals relative to `epoch`.
    pub fn with_date_ordinals(mut self, name: &str, epoch: NaiveDate) -> Result<Panel, PanelError> {
        let values = self
            .dates
            .iter()
            .map(|d| Some(date_to_ordinal(*d, epoch) as f64))
            .collect();
        self.insert(
            ColumnKey::shared(Field::raw(name)),
            ColumnData::Numeric(values),
        )?;
        Ok(self)
    }

    /// Projects the panel through every predicate of `filter`.
    pub fn select(&self, filter: &SubsetFilter) -> Panel {
        let rows: Vec<usize> = (0..self.dates.len())
            .filter(|&i| filter.start_after.is_none_or(|start| self.dates[i] > start))
            .collect();

        let keep = |key: &ColumnKey| -> bool {
            if let Some(tickers) = &filter.tickers {
                if !key.is_shared() && !tickers.contains(&key.ticker) {
                    return false;
                }
            }
            if let Some(name) = key.field.raw_name() {
                if filter.exclude_fields.iter().any(|f| f == name) {
                    return false;
                }
            }
            if let (Some(windows), Some(w)) = (&filter.std_dev_windows, key.field.window()) {
                if key.field.is_std_dev() && !windows.contains(&w) {
                    return false;
                }
            }
            if let (Some(windows), Some(w)) = (&filter.regression_windows, key.field.window()) {
                if key.field.is_regression_param() && !windows.contains(&w) {
                    return false;
                }
            }
            true
        };

        let dates: Vec<NaiveDate> = rows.iter().map(|&i| self.dates[i]).collect();
        let mut out = Panel::new(dates);
        for (key, data) in &self.columns {
            if keep(key) {
                out.columns.insert(key.clone(), data.select_rows(&rows));
            }
        }
        out
    }
}
