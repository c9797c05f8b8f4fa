use chrono::NaiveDate;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FinancialFlowError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid date window: end_date {end} is before start_date {start}")]
    InvalidDateWindow { start: NaiveDate, end: NaiveDate },

    #[error("Date calculation error: {0}")]
    DateError(String),

    #[error("Transport failure while fetching {source_name}: {details}")]
    Transport {
        source_name: String,
        details: String,
    },

    #[error("Malformed {kind} record{}: {details}", id.as_ref().map(|id| format!(" (Id {})", id)).unwrap_or_default())]
    MalformedRecord {
        kind: String,
        id: Option<String>,
        details: String,
    },

    #[error("Malformed profit and loss report: {0}")]
    MalformedReport(String),

    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, FinancialFlowError>;
