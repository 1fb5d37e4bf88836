//! Panel storage port trait.

use crate::domain::error::RegtraderError;
use crate::domain::panel::Panel;
use chrono::NaiveDate;

pub trait DataPort {
    fn load_panel(&self) -> Result<Panel, RegtraderError>;

    fn save_panel(&self, panel: &Panel) -> Result<(), RegtraderError>;

    /// First date, last date and row count of the stored panel.
    fn get_data_range(&self) -> Result<Option<(NaiveDate, NaiveDate, usize)>, RegtraderError> {
        let panel = self.load_panel()?;
        let dates = panel.dates();
        Ok(match (dates.first(), dates.last()) {
            (Some(first), Some(last)) => Some((*first, *last, dates.len())),
            _ => None,
        })
    }

    fn list_tickers(&self) -> Result<Vec<String>, RegtraderError> {
        Ok(self.load_panel()?.tickers())
    }
}
