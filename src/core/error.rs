//! Error types for the billing engine

use chrono::NaiveDate;
use thiserror::Error;

/// Application-wide error type
///
/// Every variant is fatal for a billing run: the engine never emits a
/// partial invoice. Scheme/era mismatches are diagnostics, not errors.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid date '{0}'")]
    InvalidDate(String),

    #[error("Hour {0} out of range")]
    InvalidHour(u32),

    #[error("Malformed consumption row: {0}")]
    MalformedRow(String),

    #[error("No consumption records in export")]
    EmptyExport,

    #[error("Prices unavailable for {date}: {reason}")]
    PriceUnavailable { date: NaiveDate, reason: String },

    #[error("No cached price for {date} hour {hour}")]
    PriceMissing { date: NaiveDate, hour: u32 },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias using our Error
pub type Result<T> = std::result::Result<T, Error>;
