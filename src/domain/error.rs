//! Domain error types.

use chrono::NaiveDate;

/// Shape and lookup failures against the panel table.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PanelError {
    #[error("column {field}/{ticker} already exists")]
    DuplicateColumn { field: String, ticker: String },

    #[error("column {field}/{ticker} has {got} rows, panel has {expected}")]
    LengthMismatch {
        field: String,
        ticker: String,
        expected: usize,
        got: usize,
    },

    #[error("date {0} is not in the panel")]
    MissingDate(NaiveDate),

    #[error("no column {field}/{ticker}")]
    MissingColumn { field: String, ticker: String },

    #[error("no value for {field}/{ticker} on {date}")]
    MissingValue {
        field: String,
        ticker: String,
        date: NaiveDate,
    },

    #[error("column {field}/{ticker} is not {expected}")]
    WrongKind {
        field: String,
        ticker: String,
        expected: &'static str,
    },

    #[error("fragment dates do not match the panel")]
    DateMismatch,
}

/// A single ticker/window fit failure. Reported and skipped by the engine.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RegressionError {
    #[error("design matrix is rank deficient ({rank} < {columns}) in window ending {date}")]
    Singular {
        rank: usize,
        columns: usize,
        date: NaiveDate,
    },

    #[error("least-squares solve failed: {0}")]
    Solve(String),
}

/// Naming contract violations between regression outputs and panel data.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SignalError {
    #[error("coefficient for predictor {predictor} (window {window}) has no matching value column")]
    PredictorMissing { predictor: String, window: usize },

    #[error("no intercept column for window {0}")]
    NoIntercept(usize),

    #[error("column {0} is missing")]
    MissingField(String),
}

/// Lookup failures while marking a position to market.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PositionError {
    #[error("{ticker}: {source}")]
    Lookup {
        ticker: String,
        #[source]
        source: PanelError,
    },

    #[error("{ticker}: unknown size category {category:?} on {date}")]
    UnknownSizeCategory {
        ticker: String,
        category: String,
        date: NaiveDate,
    },
}

/// Analytics were requested over a history that still has open rows.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("trading history incomplete: {} position(s) without exit: {}", open.len(), open.join(", "))]
pub struct IncompleteHistory {
    pub open: Vec<String>,
}

/// Top-level error type for regtrader.
#[derive(Debug, thiserror::Error)]
pub enum RegtraderError {
    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("data error: {reason}")]
    Data { reason: String },

    #[error(transparent)]
    Panel(#[from] PanelError),

    #[error(transparent)]
    Signal(#[from] SignalError),

    #[error(transparent)]
    Position(#[from] PositionError),

    #[error(transparent)]
    Incomplete(#[from] IncompleteHistory),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<&RegtraderError> for std::process::ExitCode {
    fn from(err: &RegtraderError) -> Self {
        let code: u8 = match err {
            RegtraderError::Io(_) | RegtraderError::Csv(_) => 1,
            RegtraderError::ConfigParse { .. }
            | RegtraderError::ConfigMissing { .. }
            | RegtraderError::ConfigInvalid { .. } => 2,
            RegtraderError::Data { .. }
            | RegtraderError::Panel(_)
            | RegtraderError::Position(_) => 3,
            RegtraderError::Signal(_) => 4,
            RegtraderError::Incomplete(_) => 5,
        };
        std::process::ExitCode::from(code)
    }
}
