//! Error types for diskstore core.

use diskstore_codec::{CodecError, Value};
use rusqlite::ErrorCode;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Key is not present.
    #[error("key not found: {key}")]
    KeyNotFound {
        /// The key that was looked up.
        key: Value,
    },

    /// The store holds no entries.
    #[error("store is empty")]
    Empty,

    /// A key or value does not match the declared shape.
    #[error("invalid value: {message}")]
    InvalidValue {
        /// Description of the mismatch.
        message: String,
    },

    /// The value schema description is invalid.
    #[error("schema error: {message}")]
    Schema {
        /// Description of the problem.
        message: String,
    },

    /// The engine could not acquire a lock before the timeout.
    #[error("database busy: {message}")]
    Busy {
        /// Engine message.
        message: String,
    },

    /// A read-only view was opened on a file that does not exist.
    #[error("database file not found: {}", path.display())]
    DatabaseNotFound {
        /// Path that was opened.
        path: PathBuf,
    },

    /// Value conversion error.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// Engine error.
    #[error("sqlite error: {0}")]
    Sqlite(rusqlite::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl StoreError {
    /// Creates a key not found error.
    pub fn key_not_found(key: impl Into<Value>) -> Self {
        Self::KeyNotFound { key: key.into() }
    }

    /// Creates an invalid value error.
    pub fn invalid_value(message: impl Into<String>) -> Self {
        Self::InvalidValue {
            message: message.into(),
        }
    }

    /// Creates a schema error.
    pub fn schema(message: impl Into<String>) -> Self {
        Self::Schema {
            message: message.into(),
        }
    }

    /// Creates a busy error.
    pub fn busy(message: impl Into<String>) -> Self {
        Self::Busy {
            message: message.into(),
        }
    }

    /// Returns true for errors raised by lookups of absent entries.
    #[must_use]
    pub fn is_key_error(&self) -> bool {
        matches!(self, Self::KeyNotFound { .. } | Self::Empty)
    }

    /// Returns true if the engine reported lock contention.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::Busy { .. })
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match err.sqlite_error_code() {
            Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) => Self::busy(err.to_string()),
            _ => Self::Sqlite(err),
        }
    }
}
