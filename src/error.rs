//! Crate-wide error type.

use thiserror::Error;

use crate::canon::validate::CanonError;
use crate::config::ConfigError;

/// Errors surfaced by scenario runs, configuration loading, and CSV I/O.
#[derive(Debug, Error)]
pub enum Error {
    /// The input (or reconstructed) series broke a canonical invariant.
    #[error(transparent)]
    Canon(#[from] CanonError),

    #[error("invalid time \"{0}\": expected HH:MM between 00:00 and 24:00")]
    InvalidTime(String),

    #[error("unknown EV charging strategy \"{0}\", expected \"immediate\" or \"scheduled\"")]
    UnknownStrategy(String),

    #[error("unknown day filter \"{0}\", expected \"ALL\", \"MF\" or \"MS\"")]
    UnknownDayFilter(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("series contains {count} meters ({ids}); filter to a single meter first")]
    MultipleMeters { count: usize, ids: String },

    #[error("timestamp \"{0}\" has no UTC offset and no timezone was supplied")]
    NaiveTimestamp(String),

    #[error("timestamp \"{0}\" does not exist in timezone {1}")]
    NonexistentLocalTime(String, String),

    #[error("row {row}: {message}")]
    Row { row: usize, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
