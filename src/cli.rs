//! CLI definition and dispatch.

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use log::{error, info, warn};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use crate::adapters::company_data::InMemoryCompanyData;
use crate::adapters::csv_panel_adapter::CsvPanelAdapter;
use crate::adapters::csv_report_adapter::CsvReportAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::domain::backtest::{self as backtest_engine, BacktestConfig};
use crate::domain::config_validation::{
    parse_date, parse_date_key, parse_max_age, parse_open_trades, parse_optional_number,
    parse_rank, parse_shortfall, parse_signal_window, parse_size_categories, parse_take_profit,
    parse_windows, validate_backtest_config, validate_regress_config,
};
use crate::domain::date_numbers::default_epoch;
use crate::domain::error::RegtraderError;
use crate::domain::panel::{fields, ColumnKey, Field, Panel, SubsetFilter};
use crate::domain::position::RiskParams;
use crate::domain::regression::{enrich_with_regressions, RegressionSpec};
use crate::domain::selection::SelectionCriteria;
use crate::domain::signals::{derive_signals, SignalSpec};
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::DataPort;
use crate::ports::report_port::ReportPort;

const DEFAULT_REPORT_DIR: &str = "reports";

#[derive(Parser, Debug)]
#[command(name = "regtrader", about = "Rolling-regression equity backtester")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Add date ordinals, rolling regressions and signals to a panel
    Regress {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        input: Option<PathBuf>,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Run a backtest over a processed panel
    Backtest {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        panel: Option<PathBuf>,
        /// Directory for trades.csv, portfolio_values.csv and stats.csv
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Check a configuration without loading any data
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Show the date range and tickers of a panel file
    Info {
        #[arg(short, long)]
        panel: PathBuf,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    let result = match cli.command {
        Command::Regress {
            config,
            input,
            output,
        } => run_regress(&config, input.as_deref(), output.as_deref()),
        Command::Backtest {
            config,
            panel,
            output,
        } => run_backtest(&config, panel.as_deref(), output.as_deref()),
        Command::Validate { config } => run_validate(&config),
        Command::Info { panel } => run_info(&panel),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            (&e).into()
        }
    }
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, RegtraderError> {
    info!("Loading config from {}", path.display());
    FileConfigAdapter::from_file(path)
}

/// The command-line override if given, the config value otherwise.
pub fn resolve_path(
    override_path: Option<&Path>,
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
) -> Result<PathBuf, RegtraderError> {
    if let Some(path) = override_path {
        return Ok(path.to_path_buf());
    }
    config
        .get_string(section, key)
        .map(PathBuf::from)
        .ok_or_else(|| RegtraderError::ConfigMissing {
            section: section.into(),
            key: key.into(),
        })
}

fn run_regress(
    config_path: &Path,
    input: Option<&Path>,
    output: Option<&Path>,
) -> Result<(), RegtraderError> {
    let config = load_config(config_path)?;
    validate_regress_config(&config)?;

    let input = resolve_path(input, &config, "data", "panel_path")?;
    let output = resolve_path(output, &config, "data", "output_panel_path")?;
    let spec = build_regression_spec(&config)?;
    let signal = build_signal_spec(&config)?;
    let epoch = parse_date_key(&config, "regression", "date_epoch")?.unwrap_or_else(default_epoch);

    let filter = build_subset_filter(&config)?;
    let panel = CsvPanelAdapter::new(&input).load_panel()?.select(&filter);
    let panel = prepare_panel(panel, &spec, epoch)?;
    let panel = enrich_with_regressions(panel, &spec)?;
    let panel = derive_signals(panel, &signal)?;

    CsvPanelAdapter::new(&output).save_panel(&panel)?;
    info!(
        "Regression panel ready: {} dates, {} columns",
        panel.row_count(),
        panel.column_count()
    );
    Ok(())
}

/// Adds the date-ordinal column when it is a predictor the panel lacks.
pub fn prepare_panel(
    panel: Panel,
    spec: &RegressionSpec,
    epoch: NaiveDate,
) -> Result<Panel, RegtraderError> {
    let wants_ordinals = spec.predictors.iter().any(|p| p == fields::DATES_NUMERIC);
    let has_ordinals = panel.contains(&ColumnKey::shared(Field::raw(fields::DATES_NUMERIC)));
    if wants_ordinals && !has_ordinals {
        info!("Adding {} column with epoch {epoch}", fields::DATES_NUMERIC);
        return Ok(panel.with_date_ordinals(fields::DATES_NUMERIC, epoch)?);
    }
    Ok(panel)
}

fn run_backtest(
    config_path: &Path,
    panel_path: Option<&Path>,
    output: Option<&Path>,
) -> Result<(), RegtraderError> {
    let config = load_config(config_path)?;
    validate_backtest_config(&config)?;
    let bt_config = build_backtest_config(&config)?;

    let panel_path = resolve_path(panel_path, &config, "data", "output_panel_path")?;
    let panel = CsvPanelAdapter::new(&panel_path).load_panel()?;

    let company = match config.get_string("data", "company_path") {
        Some(path) => InMemoryCompanyData::from_csv(path)?,
        None => {
            warn!("No company_path configured; company attributes will be uncategorized");
            InMemoryCompanyData::new()
        }
    }
    .with_panel(&panel);

    let result = backtest_engine::run_backtest(&panel, &company, &bt_config)?;

    let report_dir = match output {
        Some(dir) => dir.to_path_buf(),
        None => config
            .get_string("data", "report_dir")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_REPORT_DIR)),
    };
    fs::create_dir_all(&report_dir)?;
    CsvReportAdapter::new().write_all(&result, &report_dir)?;

    match result.final_value() {
        Some(value) => info!(
            "Final portfolio value {value:.2} from {:.2}",
            bt_config.initial_capital
        ),
        None => warn!("Backtest produced no value history"),
    }
    Ok(())
}

fn run_validate(config_path: &Path) -> Result<(), RegtraderError> {
    let config = load_config(config_path)?;
    validate_regress_config(&config)?;
    validate_backtest_config(&config)?;
    build_backtest_config(&config)?;
    info!("Configuration is valid");
    Ok(())
}

fn run_info(panel_path: &Path) -> Result<(), RegtraderError> {
    let adapter = CsvPanelAdapter::new(panel_path);
    match adapter.get_data_range()? {
        Some((first, last, rows)) => info!("{first} to {last} ({rows} dates)"),
        None => warn!("{} has no dates", panel_path.display()),
    }
    let tickers = adapter.list_tickers()?;
    info!("{} tickers: {}", tickers.len(), tickers.join(", "));
    Ok(())
}

/// Input restrictions from `[data]`: tickers, excluded fields, first date.
pub fn build_subset_filter(config: &dyn ConfigPort) -> Result<SubsetFilter, RegtraderError> {
    let tickers = config.get_list("data", "tickers");
    Ok(SubsetFilter {
        tickers: (!tickers.is_empty()).then_some(tickers),
        exclude_fields: config.get_list("data", "exclude_fields"),
        start_after: parse_date_key(config, "data", "start_after")?,
        ..SubsetFilter::default()
    })
}

pub fn build_regression_spec(config: &dyn ConfigPort) -> Result<RegressionSpec, RegtraderError> {
    let defaults = RegressionSpec::default();
    let predictors = config.get_list("regression", "predictors");
    Ok(RegressionSpec {
        windows: parse_windows(config)?,
        predictors: if predictors.is_empty() {
            defaults.predictors
        } else {
            predictors
        },
        target: config
            .get_string("regression", "target")
            .unwrap_or(defaults.target),
    })
}

pub fn build_signal_spec(config: &dyn ConfigPort) -> Result<SignalSpec, RegtraderError> {
    let mut spec = SignalSpec::new(parse_signal_window(config)?);
    if let Some(name) = config.get_string("signal", "theoretical_field") {
        spec.theoretical_field = name;
    }
    if let Some(name) = config.get_string("signal", "price_diff_field") {
        spec.price_diff_field = name;
    }
    Ok(spec)
}

pub fn build_selection_criteria(
    config: &dyn ConfigPort,
) -> Result<SelectionCriteria, RegtraderError> {
    let number = |key: &str| parse_optional_number(config, "selection", key);
    Ok(SelectionCriteria {
        how_many: config.get_int("selection", "how_many", 1).max(1) as usize,
        rank: parse_rank(config)?,
        abs_val: config.get_bool("selection", "abs_val", false),
        shortfall: parse_shortfall(config)?,
        extreme_filter: number("extreme_filter")?,
        min_share_price: number("min_share_price")?,
        max_share_price: number("max_share_price")?,
        min_market_cap: number("min_market_cap")?,
        size_categories: parse_size_categories(config)?,
        min_volume: number("min_volume")?,
        min_volume_value: number("min_volume_value")?,
        avoid_sectors: config.get_list("selection", "avoid_sectors"),
        avoid_industries: config.get_list("selection", "avoid_industries"),
        avoid_countries: config.get_list("selection", "avoid_countries"),
    })
}

pub fn build_backtest_config(config: &dyn ConfigPort) -> Result<BacktestConfig, RegtraderError> {
    let signal = build_signal_spec(config)?;
    let portfolio_tag = config
        .get_string("backtest", "portfolio_name")
        .unwrap_or_else(|| format!("regression_{}", signal.window));
    Ok(BacktestConfig {
        start_date: parse_date(config, "backtest", "start_date")?,
        end_date: parse_date(config, "backtest", "end_date")?,
        initial_capital: config.get_double("backtest", "initial_capital", 100_000.0),
        risk_free_rate: config.get_double("backtest", "risk_free_rate", 0.0),
        benchmark: config.get_string("backtest", "benchmark"),
        position_size: config.get_double("backtest", "position_size", 0.1),
        risk: RiskParams {
            stop_loss: config.get_double("backtest", "stop_loss", 0.0),
            take_profit: parse_take_profit(config)?,
            max_age_days: parse_max_age(config)?,
        },
        signal,
        selection: build_selection_criteria(config)?,
        portfolio_tag,
        liquidate_at_end: config.get_bool("backtest", "liquidate_at_end", true),
        open_rows: parse_open_trades(config)?,
    })
}
