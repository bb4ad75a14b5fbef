use thiserror::Error as ThisError;

/// Every failure the engine can surface to a caller.
#[derive(ThisError, Debug)]
pub enum EngineError {
    #[error("Data file not found: {0}")]
    DataNotFound(String),

    #[error("Parse error at byte {offset}: {message}")]
    Parse { offset: u64, message: String },

    #[error("Not enough data points in range: found {found}, need {needed}")]
    EmptyRange { found: usize, needed: usize },

    #[error("Invalid range: {0}")]
    InvalidRange(String),

    #[error("Invalid funds: {0}")]
    InvalidFunds(String),

    #[error("No profitable trade found in the given range")]
    NoProfitableTrade,

    #[error("Stats not ready yet")]
    StatsNotReady,

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Index file error: {0}")]
    IndexFile(String),
}

impl From<bincode::Error> for EngineError {
    fn from(err: bincode::Error) -> Self {
        EngineError::IndexFile(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
