//! Error types for the svcwatch-store crate.
//!
//! Every engine operation surfaces failures through [`StoreError`]. Callers
//! of the request façade only ever observe two outcomes per request: the
//! typed value, or [`StoreError::Cancelled`]. The richer variants are what
//! the worker logs and what the initialization report carries back.

use std::path::PathBuf;

use thiserror::Error;

/// Alias for `Result<T, StoreError>`.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in the storage engine.
#[derive(Debug, Error)]
pub enum StoreError {
    /// SQLite operation failed.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Filesystem operation failed (creating the data directory, etc.).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The configuration file could not be parsed.
    #[error("invalid configuration: {0}")]
    Config(#[from] toml::de::Error),

    /// Storage is not ready: the engine was never initialized, the last
    /// initialization failed, or the connection could not be reopened.
    #[error("storage unavailable: {reason}")]
    Unavailable { reason: String },

    /// The stored version tag does not match the compiled-in value.
    #[error("incompatible database version (found {}, expected {expected})", .found.as_deref().unwrap_or("none"))]
    SchemaIncompatible {
        found: Option<String>,
        expected: &'static str,
    },

    /// Formatting a brand-new storage file failed.
    #[error("error formatting database {}: {source}", .path.display())]
    Bootstrap {
        path: PathBuf,
        #[source]
        source: Box<StoreError>,
    },

    /// The request was cancelled before a value was produced.
    #[error("request cancelled")]
    Cancelled,

    /// An invalid argument was provided to a store operation.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The system random source failed.
    #[error("crypto error: {0}")]
    Crypto(String),

    /// The worker thread could not be started or stopped cleanly.
    #[error("worker error: {0}")]
    Worker(String),
}

impl StoreError {
    /// Whether this failure means the cached connection handle can no longer
    /// be trusted and must be disposed before the next request.
    pub fn is_connection_fault(&self) -> bool {
        match self {
            Self::Sqlite(rusqlite::Error::SqliteFailure(err, _)) => matches!(
                err.code,
                rusqlite::ErrorCode::SystemIoFailure
                    | rusqlite::ErrorCode::DatabaseCorrupt
                    | rusqlite::ErrorCode::NotADatabase
                    | rusqlite::ErrorCode::CannotOpen
                    | rusqlite::ErrorCode::FileLockingProtocolFailed
            ),
            Self::Sqlite(_) => false,
            Self::Io(_) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_incompatible_message_names_both_versions() {
        let err = StoreError::SchemaIncompatible {
            found: Some("0.9".into()),
            expected: "1.0",
        };
        assert_eq!(
            err.to_string(),
            "incompatible database version (found 0.9, expected 1.0)"
        );

        let missing = StoreError::SchemaIncompatible {
            found: None,
            expected: "1.0",
        };
        assert!(missing.to_string().contains("found none"));
    }

    #[test]
    fn corruption_is_a_connection_fault() {
        let err = StoreError::Sqlite(rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_CORRUPT),
            None,
        ));
        assert!(err.is_connection_fault());
    }

    #[test]
    fn constraint_violation_is_not_a_connection_fault() {
        let err = StoreError::Sqlite(rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_CONSTRAINT),
            None,
        ));
        assert!(!err.is_connection_fault());
        assert!(!StoreError::Cancelled.is_connection_fault());
    }
}
