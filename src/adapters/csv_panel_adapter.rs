//! Long-format CSV storage for the panel.
//!
//! One row per present cell: `date,ticker,field,role,window,value`. `role` is
//! empty for data columns and `intercept`, `coeff` or `std_dev` for
//! regression outputs, in which case `window` is set and, for `coeff`,
//! `field` names the predictor. Missing cells are not written.

use chrono::NaiveDate;
use log::info;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::domain::error::RegtraderError;
use crate::domain::panel::{ColumnData, ColumnKey, Field, Panel, RegressionRole};
use crate::ports::data_port::DataPort;

#[derive(Debug, Serialize, Deserialize)]
struct PanelRow {
    date: NaiveDate,
    ticker: String,
    field: String,
    role: String,
    window: Option<usize>,
    value: String,
}

pub struct CsvPanelAdapter {
    path: PathBuf,
}

impl CsvPanelAdapter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

fn data_error(reason: String) -> RegtraderError {
    RegtraderError::Data { reason }
}

fn key_of(row: &PanelRow) -> Result<ColumnKey, RegtraderError> {
    let window = || {
        row.window.ok_or_else(|| {
            data_error(format!(
                "{} row for {}/{} on {} has no window",
                row.role, row.field, row.ticker, row.date
            ))
        })
    };
    let field = match row.role.as_str() {
        "" => Field::raw(&row.field),
        "intercept" => Field::intercept(window()?),
        "coeff" => Field::coefficient(&row.field, window()?),
        "std_dev" => Field::std_dev(window()?),
        other => return Err(data_error(format!("unknown role {other:?}"))),
    };
    Ok(ColumnKey::new(field, &row.ticker))
}

fn row_parts(field: &Field) -> (String, &'static str, Option<usize>) {
    match field {
        Field::Raw(name) => (name.clone(), "", None),
        Field::Regression { window, role } => match role {
            RegressionRole::Intercept => (String::new(), "intercept", Some(*window)),
            RegressionRole::Coefficient(p) => (p.clone(), "coeff", Some(*window)),
            RegressionRole::StdDev => (String::new(), "std_dev", Some(*window)),
        },
    }
}

/// Numeric if every present value parses as a float, categorical otherwise.
fn build_column(dates: &[NaiveDate], cells: BTreeMap<NaiveDate, String>) -> ColumnData {
    let numeric: Option<BTreeMap<NaiveDate, f64>> = cells
        .iter()
        .map(|(d, v)| v.trim().parse::<f64>().ok().map(|f| (*d, f)))
        .collect();
    match numeric {
        Some(values) => ColumnData::Numeric(dates.iter().map(|d| values.get(d).copied()).collect()),
        None => ColumnData::Categorical(dates.iter().map(|d| cells.get(d).cloned()).collect()),
    }
}

impl DataPort for CsvPanelAdapter {
    fn load_panel(&self) -> Result<Panel, RegtraderError> {
        let mut reader = csv::Reader::from_path(&self.path)?;
        let mut cells: BTreeMap<ColumnKey, BTreeMap<NaiveDate, String>> = BTreeMap::new();

        for row in reader.deserialize::<PanelRow>() {
            let row = row?;
            if row.value.trim().is_empty() {
                continue;
            }
            let key = key_of(&row)?;
            let column = cells.entry(key).or_default();
            if column.insert(row.date, row.value).is_some() {
                return Err(data_error(format!(
                    "duplicate cell {}/{} on {}",
                    row.field, row.ticker, row.date
                )));
            }
        }

        let mut panel = Panel::new(cells.values().flat_map(|c| c.keys().copied()));
        let dates = panel.dates().to_vec();
        let columns = cells.len();
        for (key, column) in cells {
            panel.insert(key, build_column(&dates, column))?;
        }
        info!(
            "Loaded panel {}: {} dates, {columns} columns",
            self.path.display(),
            dates.len()
        );
        Ok(panel)
    }

    fn save_panel(&self, panel: &Panel) -> Result<(), RegtraderError> {
        let mut writer = csv::Writer::from_path(&self.path)?;
        for (key, data) in panel.columns() {
            let (field, role, window) = row_parts(&key.field);
            let values: Box<dyn Iterator<Item = Option<String>> + '_> = match data {
                ColumnData::Numeric(v) => Box::new(v.iter().map(|x| x.map(|f| f.to_string()))),
                ColumnData::Categorical(v) => Box::new(v.iter().cloned()),
            };
            for (date, value) in panel.dates().iter().zip(values) {
                let Some(value) = value else { continue };
                writer.serialize(PanelRow {
                    date: *date,
                    ticker: key.ticker.clone(),
                    field: field.clone(),
                    role: role.to_string(),
                    window,
                    value,
                })?;
            }
        }
        writer.flush()?;
        info!(
            "Wrote panel {}: {} dates, {} columns",
            self.path.display(),
            panel.row_count(),
            panel.column_count()
        );
        Ok(())
    }
}
