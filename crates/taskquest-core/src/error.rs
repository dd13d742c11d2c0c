//! Core error types for taskquest-core.
//!
//! Every failure in the engine degrades to "local-only, eventually
//! reconciled" mode; none of these errors are fatal to the process.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for taskquest-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Remote or local store errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Optimistic sync errors
    #[error("Sync error: {0}")]
    Sync(#[from] SyncError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors raised by the Profile/Task/Cohort/Object stores and the
/// change feed.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The remote could not be reached or rejected the request.
    #[error("Store unreachable: {0}")]
    Unreachable(String),

    /// A keyed record does not exist.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// A record with the same key already exists.
    #[error("{kind} already exists: {id}")]
    Conflict { kind: &'static str, id: String },

    /// A stored row could not be mapped back to a domain value.
    #[error("Failed to decode column '{column}': {message}")]
    Decode { column: String, message: String },

    /// Local SQLite backend failure.
    #[error("Database error: {0}")]
    Database(String),

    /// Local filesystem failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    pub fn decode(column: impl Into<String>, message: impl Into<String>) -> Self {
        StoreError::Decode {
            column: column.into(),
            message: message.into(),
        }
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(e, _)
                if e.code == rusqlite::ErrorCode::DatabaseBusy
                    || e.code == rusqlite::ErrorCode::DatabaseLocked =>
            {
                StoreError::Unreachable(err.to_string())
            }
            _ => StoreError::Database(err.to_string()),
        }
    }
}

/// Errors surfaced by the optimistic sync layer to the initiating flow.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Persisting an optimistic mutation failed; local state was kept or
    /// rolled back as documented on the operation.
    #[error("Remote persistence failed: {0}")]
    Store(#[from] StoreError),

    /// The task id is not part of the local snapshot.
    #[error("Task not found: {0}")]
    TaskNotFound(String),

    /// An evidence or avatar upload failed. Recoverable: retry with a
    /// new upload.
    #[error("Upload failed for {path}: {message}")]
    Upload { path: String, message: String },

    /// An operation needed the profile before `load()` completed.
    #[error("Profile not loaded")]
    NotLoaded,

    /// The local week marker could not be read or written.
    #[error("Week marker error: {0}")]
    Marker(#[from] MarkerError),
}

/// Local week marker persistence errors.
#[derive(Error, Debug)]
pub enum MarkerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid marker file {path}: {message}")]
    InvalidFormat { path: PathBuf, message: String },
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

    /// Unknown dotted configuration key
    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),

    /// Data directory could not be resolved or created
    #[error("Failed to access data directory: {0}")]
    DataDir(String),
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
