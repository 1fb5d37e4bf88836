//! Configuration parsing and validation.
//!
//! Every check runs before any data is loaded. The `parse_*` helpers are
//! shared with the CLI builders so a config that validates also builds.

use crate::domain::error::RegtraderError;
use crate::domain::position::{SizeCategory, TakeProfit};
use crate::domain::regression::DEFAULT_WINDOWS;
use crate::domain::selection::{Rank, ShortfallPolicy};
use crate::domain::trading_history::OpenRowPolicy;
use crate::ports::config_port::ConfigPort;
use chrono::NaiveDate;

fn invalid(section: &str, key: &str, reason: impl Into<String>) -> RegtraderError {
    RegtraderError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.into(),
    }
}

fn missing(section: &str, key: &str) -> RegtraderError {
    RegtraderError::ConfigMissing {
        section: section.to_string(),
        key: key.to_string(),
    }
}

/// Keys of `[selection]` that hold an optional number.
pub const SELECTION_BOUNDS: [&str; 6] = [
    "extreme_filter",
    "min_share_price",
    "max_share_price",
    "min_market_cap",
    "min_volume",
    "min_volume_value",
];

pub fn validate_regress_config(config: &dyn ConfigPort) -> Result<(), RegtraderError> {
    parse_date_key(config, "data", "start_after")?;
    let windows = parse_windows(config)?;
    parse_date_key(config, "regression", "date_epoch")?;
    let signal_window = parse_signal_window(config)?;
    if !windows.contains(&signal_window) {
        return Err(invalid(
            "signal",
            "window",
            format!("window {signal_window} is not one of the regression windows {windows:?}"),
        ));
    }
    Ok(())
}

pub fn validate_backtest_config(config: &dyn ConfigPort) -> Result<(), RegtraderError> {
    validate_initial_capital(config)?;
    validate_risk_free_rate(config)?;
    validate_dates(config)?;
    validate_position_size(config)?;
    validate_stop_loss(config)?;
    parse_take_profit(config)?;
    parse_max_age(config)?;
    parse_open_trades(config)?;
    parse_signal_window(config)?;
    validate_selection_config(config)?;
    Ok(())
}

pub fn validate_selection_config(config: &dyn ConfigPort) -> Result<(), RegtraderError> {
    if config.get_int("selection", "how_many", 1) < 1 {
        return Err(invalid("selection", "how_many", "how_many must be at least 1"));
    }
    parse_rank(config)?;
    parse_shortfall(config)?;
    parse_size_categories(config)?;
    for key in SELECTION_BOUNDS {
        parse_optional_number(config, "selection", key)?;
    }
    let min = parse_optional_number(config, "selection", "min_share_price")?;
    let max = parse_optional_number(config, "selection", "max_share_price")?;
    if let (Some(min), Some(max)) = (min, max)
        && min > max
    {
        return Err(invalid(
            "selection",
            "min_share_price",
            "min_share_price must not exceed max_share_price",
        ));
    }
    Ok(())
}

/// A number when the key is set, `None` when it is absent or blank.
pub fn parse_optional_number(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
) -> Result<Option<f64>, RegtraderError> {
    config
        .get_string(section, key)
        .map(|raw| {
            raw.trim()
                .parse::<f64>()
                .map_err(|_| invalid(section, key, format!("{key} must be a number")))
        })
        .transpose()
}

fn validate_initial_capital(config: &dyn ConfigPort) -> Result<(), RegtraderError> {
    let value = config.get_double("backtest", "initial_capital", 0.0);
    if value <= 0.0 {
        return Err(invalid("backtest", "initial_capital", "initial_capital must be positive"));
    }
    Ok(())
}

fn validate_risk_free_rate(config: &dyn ConfigPort) -> Result<(), RegtraderError> {
    let value = config.get_double("backtest", "risk_free_rate", 0.0);
    if !(0.0..1.0).contains(&value) {
        return Err(invalid(
            "backtest",
            "risk_free_rate",
            "risk_free_rate must be between 0 and 1",
        ));
    }
    Ok(())
}

fn validate_position_size(config: &dyn ConfigPort) -> Result<(), RegtraderError> {
    let value = config.get_double("backtest", "position_size", 0.1);
    if value <= 0.0 || value > 1.0 {
        return Err(invalid(
            "backtest",
            "position_size",
            "position_size must be in (0, 1]",
        ));
    }
    Ok(())
}

fn validate_stop_loss(config: &dyn ConfigPort) -> Result<(), RegtraderError> {
    let value = config.get_double("backtest", "stop_loss", 0.0);
    if !(0.0..1.0).contains(&value) {
        return Err(invalid("backtest", "stop_loss", "stop_loss must be in [0, 1)"));
    }
    Ok(())
}

fn validate_dates(config: &dyn ConfigPort) -> Result<(), RegtraderError> {
    let start = parse_date(config, "backtest", "start_date")?;
    let end = parse_date(config, "backtest", "end_date")?;
    if start >= end {
        return Err(invalid("backtest", "start_date", "start_date must be before end_date"));
    }
    Ok(())
}

pub fn parse_date(config: &dyn ConfigPort, section: &str, key: &str) -> Result<NaiveDate, RegtraderError> {
    parse_date_key(config, section, key)?.ok_or_else(|| missing(section, key))
}

/// Optional `YYYY-MM-DD` value.
pub fn parse_date_key(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
) -> Result<Option<NaiveDate>, RegtraderError> {
    config
        .get_string(section, key)
        .map(|s| {
            NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").map_err(|_| {
                invalid(section, key, format!("invalid {key} format, expected YYYY-MM-DD"))
            })
        })
        .transpose()
}

/// `[regression] windows`, defaulting to 5, 10, 30, 60, 90.
pub fn parse_windows(config: &dyn ConfigPort) -> Result<Vec<usize>, RegtraderError> {
    let raw = config.get_list("regression", "windows");
    if raw.is_empty() {
        return Ok(DEFAULT_WINDOWS.to_vec());
    }
    raw.iter()
        .map(|w| match w.parse::<usize>() {
            Ok(n) if n >= 2 => Ok(n),
            _ => Err(invalid(
                "regression",
                "windows",
                format!("window {w:?} must be an integer of at least 2"),
            )),
        })
        .collect()
}

pub fn parse_signal_window(config: &dyn ConfigPort) -> Result<usize, RegtraderError> {
    match config.get_int("signal", "window", 30) {
        w if w >= 2 => Ok(w as usize),
        _ => Err(invalid("signal", "window", "window must be at least 2")),
    }
}

/// A ratio, `theoretical` for the entry theoretical value, or `none`.
pub fn parse_take_profit(config: &dyn ConfigPort) -> Result<TakeProfit, RegtraderError> {
    let Some(raw) = config.get_string("backtest", "take_profit") else {
        return Ok(TakeProfit::Disabled);
    };
    match raw.trim().to_lowercase().as_str() {
        "none" => Ok(TakeProfit::Disabled),
        "theoretical" => Ok(TakeProfit::RelativeToEntryTheo),
        other => match other.parse::<f64>() {
            Ok(ratio) if ratio > 0.0 => Ok(TakeProfit::Fixed(ratio)),
            _ => Err(invalid(
                "backtest",
                "take_profit",
                "take_profit must be a positive ratio, 'theoretical' or 'none'",
            )),
        },
    }
}

/// Calendar days, or `none` to disable the age rule.
pub fn parse_max_age(config: &dyn ConfigPort) -> Result<Option<i64>, RegtraderError> {
    let Some(raw) = config.get_string("backtest", "max_age_days") else {
        return Ok(None);
    };
    if raw.trim().eq_ignore_ascii_case("none") {
        return Ok(None);
    }
    match raw.trim().parse::<i64>() {
        Ok(days) if days > 0 => Ok(Some(days)),
        _ => Err(invalid(
            "backtest",
            "max_age_days",
            "max_age_days must be a positive integer or 'none'",
        )),
    }
}

/// Trades still open at the end of a run: `reject` fails, `exclude` drops them.
pub fn parse_open_trades(config: &dyn ConfigPort) -> Result<OpenRowPolicy, RegtraderError> {
    match config.get_string("backtest", "open_trades").as_deref().map(str::trim) {
        None | Some("reject") => Ok(OpenRowPolicy::Reject),
        Some("exclude") => Ok(OpenRowPolicy::Exclude),
        Some(_) => Err(invalid(
            "backtest",
            "open_trades",
            "open_trades must be 'reject' or 'exclude'",
        )),
    }
}

pub fn parse_rank(config: &dyn ConfigPort) -> Result<Rank, RegtraderError> {
    match config.get_string("selection", "rank").as_deref().map(str::trim) {
        None | Some("max") => Ok(Rank::Max),
        Some("min") => Ok(Rank::Min),
        Some(_) => Err(invalid("selection", "rank", "rank must be 'max' or 'min'")),
    }
}

pub fn parse_shortfall(config: &dyn ConfigPort) -> Result<ShortfallPolicy, RegtraderError> {
    match config.get_string("selection", "shortfall").as_deref().map(str::trim) {
        None | Some("strict") => Ok(ShortfallPolicy::Strict),
        Some("permissive") => Ok(ShortfallPolicy::Permissive),
        Some(_) => Err(invalid(
            "selection",
            "shortfall",
            "shortfall must be 'strict' or 'permissive'",
        )),
    }
}

pub fn parse_size_categories(config: &dyn ConfigPort) -> Result<Vec<SizeCategory>, RegtraderError> {
    config
        .get_list("selection", "size_categories")
        .iter()
        .map(|s| s.parse().map_err(|e: String| invalid("selection", "size_categories", e)))
        .collect()
}
