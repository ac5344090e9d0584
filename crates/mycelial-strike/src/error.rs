//! Error types for the strike engine.

use thiserror::Error;

/// Result type for strike engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in strike engine operations.
///
/// Policy outcomes (low trust, whitelisted target, duplicate delivery) are
/// not errors; see [`crate::gate::GateOutcome`].
#[derive(Debug, Error)]
pub enum Error {
    /// Storage error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Rejected input, never partially applied
    #[error("Validation error: {0}")]
    Validation(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<rocksdb::Error> for Error {
    fn from(e: rocksdb::Error) -> Self {
        Error::Storage(e.to_string())
    }
}

/// Reject blank free-text fields.
pub(crate) fn require_text(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::Validation(format!("{} must not be empty", field)));
    }
    Ok(())
}
