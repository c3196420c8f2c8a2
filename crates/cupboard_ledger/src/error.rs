//! Error types for ledger operations.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Errors that can occur while reading or writing a ledger file.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A record could not be serialized to JSON.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The ledger path has no parent directory or file name.
    #[error("invalid ledger path: {}", path.display())]
    InvalidPath {
        /// The rejected path.
        path: PathBuf,
    },

    /// A record passed to a write was not a JSON object.
    #[error("ledger records must be JSON objects")]
    NotAnObject,
}
