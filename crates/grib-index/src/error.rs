//! Error types for the GRIB index client.

use thiserror::Error;

/// Errors that can occur while fetching or decoding indexed messages.
#[derive(Error, Debug)]
pub enum GribIndexError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP status {status} for {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("Index for {url} stopped advancing")]
    IndexStalled { url: String },

    #[error("Deadline exceeded while waiting for {url}")]
    DeadlineExceeded { url: String },

    #[error("Selectors not found in index for {url}: {patterns:?}")]
    SelectorNotFound { url: String, patterns: Vec<String> },

    #[error("Failed to decode GRIB2 message: {0}")]
    Decode(String),

    #[error("Decoded message has {actual} values, expected {expected}")]
    ShapeMismatch { expected: usize, actual: usize },
}

/// Result type for index client operations.
pub type Result<T> = std::result::Result<T, GribIndexError>;
