//! Date <-> day-ordinal conversion against an explicit epoch.
//!
//! Used to build a numeric time-trend predictor for the rolling regressions.

use chrono::{Duration, NaiveDate};

/// Default epoch for date ordinals.
pub fn default_epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(2000, 1, 1).unwrap_or(NaiveDate::MIN)
}

/// Whole days from `epoch` to `date`; negative before the epoch.
pub fn date_to_ordinal(date: NaiveDate, epoch: NaiveDate) -> i64 {
    (date - epoch).num_days()
}

pub fn ordinal_to_date(ordinal: i64, epoch: NaiveDate) -> NaiveDate {
    epoch + Duration::days(ordinal)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn epoch_is_zero() {
        assert_eq!(date_to_ordinal(default_epoch(), default_epoch()), 0);
    }

    #[test]
    fn after_epoch() {
        assert_eq!(date_to_ordinal(d(2024, 1, 1), default_epoch()), 8766);
    }

    #[test]
    fn before_epoch_is_negative() {
        assert_eq!(date_to_ordinal(d(1997, 1, 1), default_epoch()), -1095);
    }

    #[test]
    fn inverse_conversion() {
        assert_eq!(ordinal_to_date(8766 + 71, default_epoch()), d(2024, 3, 12));
        assert_eq!(ordinal_to_date(-1095, default_epoch()), d(1997, 1, 1));
    }

    #[test]
    fn custom_epoch() {
        let epoch = d(2024, 1, 1);
        assert_eq!(date_to_ordinal(d(2024, 1, 31), epoch), 30);
    }
}
