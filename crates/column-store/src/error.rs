//! Error types for the column store.

use thiserror::Error;

/// Errors that can occur reading or writing store files.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt store file {path}: {reason}")]
    CorruptFile { path: String, reason: String },

    #[error("Shape mismatch: expected {expected} values, got {actual}")]
    ShapeMismatch { expected: usize, actual: usize },

    #[error("Invalid layout: {0}")]
    InvalidLayout(String),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
