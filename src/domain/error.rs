//! Domain error types.

use chrono::NaiveDate;

/// Fatal problems with the input series or the derived feature table.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FeatureError {
    #[error("price series is empty")]
    EmptySeries,

    #[error("bars out of order at {date}: dates must be strictly increasing")]
    Unordered { date: NaiveDate },

    #[error("invalid close price {close} on {date}")]
    InvalidClose { date: NaiveDate, close: f64 },

    #[error("window size must be at least 1")]
    ZeroWindow,

    #[error("feature table too short: have {rows} rows, need at least {minimum}")]
    TooShort { rows: usize, minimum: usize },

    #[error("train fraction {0} must be in (0, 1]")]
    InvalidFraction(f64),

    #[error("unknown feature column: {0}")]
    UnknownColumn(String),

    #[error("duplicate feature column: {0}")]
    DuplicateColumn(String),

    #[error("final bar has no finite feature row to score")]
    NoLatestRow,
}

/// Top-level error type for vaultsim.
#[derive(Debug, thiserror::Error)]
pub enum VaultsimError {
    #[error("data error: {reason}")]
    Data { reason: String },

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

    #[error("no data for {symbol}")]
    NoData { symbol: String },

    #[error(transparent)]
    Feature(#[from] FeatureError),

    #[error("metrics sink error: {reason}")]
    Metrics { reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<&VaultsimError> for std::process::ExitCode {
    fn from(err: &VaultsimError) -> Self {
        let code: u8 = match err {
            VaultsimError::Io(_) | VaultsimError::Metrics { .. } => 1,
            VaultsimError::ConfigParse { .. }
            | VaultsimError::ConfigMissing { .. }
            | VaultsimError::ConfigInvalid { .. } => 2,
            VaultsimError::Data { .. } => 3,
            VaultsimError::NoData { .. } | VaultsimError::Feature(_) => 5,
        };
        std::process::ExitCode::from(code)
    }
}
