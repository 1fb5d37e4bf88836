//! Concrete adapter implementations for ports.

pub mod company_data;
pub mod csv_panel_adapter;
pub mod csv_report_adapter;
pub mod file_config_adapter;
