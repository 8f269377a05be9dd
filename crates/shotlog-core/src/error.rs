//! Core error types for shotlog-core.
//!
//! Transport and telemetry failures are absorbed inside the delivery and
//! workout layers; what reaches callers is defined here.

use std::path::PathBuf;
use thiserror::Error;

use crate::session::SessionPhase;

/// Core error type for shotlog-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Session lifecycle violations
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Incoming payload rejected by the receiver
    #[error("Payload error: {0}")]
    Payload(#[from] PayloadError),

    /// Outbox persistence errors
    #[error("Outbox error: {0}")]
    Outbox(#[from] OutboxError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic errors with context
    #[error("{0}")]
    Custom(String),
}

/// Rejected session state transitions.
///
/// This is the only lifecycle failure surfaced to callers; every other
/// out-of-order input is ignored.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("a session is already in progress (state: {0})")]
    AlreadyActive(SessionPhase),

    #[error("invalid session mode: {0}")]
    InvalidMode(String),
}

/// Database-specific errors.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Failed to open database connection
    #[error("Failed to open database at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Stored row could not be decoded
    #[error("Corrupt row for session {id}: {message}")]
    CorruptRow { id: String, message: String },

    /// Database is locked
    #[error("Database is locked")]
    Locked,

    /// Data directory unavailable
    #[error("Failed to access data directory: {0}")]
    DataDir(String),
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Unknown configuration key
    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),
}

/// Reasons an incoming watch/phone payload is rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PayloadError {
    #[error("missing required field '{0}'")]
    MissingField(&'static str),

    #[error("invalid value for '{field}': {message}")]
    InvalidField {
        field: &'static str,
        message: String,
    },
}

/// Device-to-device channel failures. Never surfaced past the bridge.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("counterpart device is not reachable")]
    Unreachable,

    #[error("transport session is not activated")]
    NotActivated,

    #[error("message delivery failed: {0}")]
    SendFailed(String),
}

/// External workout subsystem failures. Reported as advisory events only.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WorkoutError {
    #[error("workout tracking unavailable on this device")]
    Unavailable,

    #[error("workout authorization denied")]
    AuthorizationDenied,

    #[error("workout session failed: {0}")]
    SessionFailed(String),
}

/// Outbox persistence errors.
#[derive(Error, Debug)]
pub enum OutboxError {
    #[error("Failed to read/write outbox file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse outbox file: {0}")]
    Parse(#[from] serde_json::Error),
}

// Helper implementations for converting from other error types

impl From<rusqlite::Error> for DatabaseError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(inner, _msg) => {
                if inner.code == rusqlite::ErrorCode::DatabaseLocked {
                    DatabaseError::Locked
                } else {
                    DatabaseError::QueryFailed(err.to_string())
                }
            }
            _ => DatabaseError::QueryFailed(err.to_string()),
        }
    }
}

impl From<rusqlite::Error> for CoreError {
    fn from(err: rusqlite::Error) -> Self {
        CoreError::Database(err.into())
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locked_sqlite_maps_to_locked() {
        let err = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_LOCKED),
            None,
        );
        let mapped: DatabaseError = err.into();
        assert!(matches!(mapped, DatabaseError::Locked));
    }

    #[test]
    fn session_error_reads_naturally() {
        let err = CoreError::from(SessionError::AlreadyActive(SessionPhase::Running));
        assert_eq!(
            err.to_string(),
            "Session error: a session is already in progress (state: running)"
        );
    }
}
