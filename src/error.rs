//! Error types for the trade-data pipeline
//!
//! Every fallible operation has a local fallback branch at its call site;
//! nothing here is expected to escape as an uncaught panic.

use thiserror::Error;

/// Crate-wide result alias
pub type Result<T> = std::result::Result<T, TradeDataError>;

/// Error taxonomy for dataset loading, remote fetches and series building
#[derive(Debug, Error)]
pub enum TradeDataError {
    /// Remote API request failed (connect, status or body decode)
    #[error("trade API request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The all-partners snapshot is missing the World aggregate,
    /// so partner shares cannot be computed
    #[error("no World observation in latest-period snapshot for HS code {hs6}")]
    MissingWorld { hs6: String },

    /// A record from the remote API failed boundary validation
    #[error("malformed API record: {0}")]
    MalformedRecord(String),

    /// Local dataset file could not be read
    #[error("dataset IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Local dataset file could not be parsed
    #[error("dataset parse error: {0}")]
    Csv(#[from] csv::Error),

    /// Local dataset is missing a required column
    #[error("dataset is missing required column {0:?}")]
    MissingColumn(String),
}
