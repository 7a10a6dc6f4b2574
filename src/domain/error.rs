//! Domain error types.

use chrono::NaiveDate;

/// Broad classification used for exit codes and propagation policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Data,
    Model,
    Arithmetic,
    Io,
}

/// Top-level error type for factortrader.
#[derive(Debug, thiserror::Error)]
pub enum FactorTraderError {
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

    #[error("need at least 2 rebalance dates, found {found}")]
    InsufficientPeriods { found: usize },

    #[error("selection of {top_pct}% from {universe} tickers yields no holdings")]
    EmptySelection { universe: usize, top_pct: f64 },

    #[error("data source error: {reason}")]
    DataSource { reason: String },

    #[error("{code}: {date} is not a trading day")]
    DateNotFound { code: String, date: NaiveDate },

    #[error("{code}: need {requested} trading days around {date}, only {available} available")]
    InsufficientHistory {
        code: String,
        date: NaiveDate,
        requested: usize,
        available: usize,
    },

    #[error("{code}: invalid price {price} on {date}")]
    InvalidPrice {
        code: String,
        date: NaiveDate,
        price: f64,
    },

    #[error("no ticker has usable data for period {period}")]
    EmptyUniverse { period: String },

    #[error("degenerate regression fit: {reason}")]
    DegenerateFit { reason: String },

    #[error("division by zero computing {what}")]
    DivisionByZero { what: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl FactorTraderError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            FactorTraderError::ConfigParse { .. }
            | FactorTraderError::ConfigMissing { .. }
            | FactorTraderError::ConfigInvalid { .. }
            | FactorTraderError::InsufficientPeriods { .. }
            | FactorTraderError::EmptySelection { .. } => ErrorCategory::Configuration,
            FactorTraderError::DataSource { .. }
            | FactorTraderError::DateNotFound { .. }
            | FactorTraderError::InsufficientHistory { .. }
            | FactorTraderError::InvalidPrice { .. }
            | FactorTraderError::EmptyUniverse { .. } => ErrorCategory::Data,
            FactorTraderError::DegenerateFit { .. } => ErrorCategory::Model,
            FactorTraderError::DivisionByZero { .. } => ErrorCategory::Arithmetic,
            FactorTraderError::Io(_) => ErrorCategory::Io,
        }
    }

    /// Per-ticker data gaps the engine resolves locally by exclusion.
    pub fn is_ticker_gap(&self) -> bool {
        matches!(
            self,
            FactorTraderError::DateNotFound { .. }
                | FactorTraderError::InsufficientHistory { .. }
                | FactorTraderError::InvalidPrice { .. }
        )
    }
}

impl From<&FactorTraderError> for std::process::ExitCode {
    fn from(err: &FactorTraderError) -> Self {
        let code: u8 = match err.category() {
            ErrorCategory::Io => 1,
            ErrorCategory::Configuration => 2,
            ErrorCategory::Data => match err {
                FactorTraderError::DataSource { .. } => 3,
                _ => 5,
            },
            ErrorCategory::Model => 6,
            ErrorCategory::Arithmetic => 7,
        };
        std::process::ExitCode::from(code)
    }
}
