//! Core domain types and logic.

pub mod error;
pub mod date_numbers;
pub mod panel;
pub mod regression;
pub mod signals;
pub mod position;
pub mod portfolio;
pub mod trading_history;
pub mod selection;
pub mod performance;
pub mod backtest;
pub mod config_validation;
