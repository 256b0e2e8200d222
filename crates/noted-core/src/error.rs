//! Core error types for noted-core.
//!
//! One thiserror enum per concern, folded into [`CoreError`] for callers
//! that only need to report a failure.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for noted-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Local storage errors
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Relay (backend) call errors
    #[error("Relay error: {0}")]
    Relay(#[from] RelayError),

    /// Summarize/save flow errors
    #[error("Clip error: {0}")]
    Clip(#[from] ClipError),

    /// API key failed the local format check
    #[error("Invalid API key: {0}")]
    Credential(#[from] crate::credentials::KeyFormatError),

    /// OS keyring errors
    #[error("Credential store error: {0}")]
    Keyring(#[from] keyring::Error),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Key-value storage errors.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Failed to open database
    #[error("Failed to open database at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Database is locked by another writer
    #[error("Database is locked")]
    Locked,

    /// Stored document could not be decoded
    #[error("Corrupt value under '{key}': {source}")]
    Corrupt {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// Value could not be encoded
    #[error("Failed to encode value: {0}")]
    Encode(#[from] serde_json::Error),

    /// Backend unavailable (lock poisoned, directory missing)
    #[error("Storage unavailable: {0}")]
    Unavailable(String),
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

    /// Unknown dotted key
    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),

    /// Data directory could not be determined or created
    #[error("Data directory unavailable: {0}")]
    DataDir(String),
}

/// Errors from calls to the relay backend.
#[derive(Error, Debug)]
pub enum RelayError {
    /// Transport failure (DNS, connect, timeout, TLS)
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The relay rejected the caller's identity (HTTP 401/403)
    #[error("Authentication rejected: {detail}")]
    Unauthorized { detail: String },

    /// Any other non-success status
    #[error("Relay returned HTTP {status}: {detail}")]
    Server { status: u16, detail: String },

    /// Response body did not have the expected shape
    #[error("Unexpected response body: {0}")]
    Decode(String),

    /// Base URL or path could not be joined
    #[error("Invalid relay URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl RelayError {
    /// True when the relay says the linked identity is no longer accepted.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, RelayError::Unauthorized { .. })
    }

    /// True for failures that say nothing about linkage and may succeed on retry.
    pub fn is_transient(&self) -> bool {
        match self {
            RelayError::Network(_) | RelayError::Decode(_) => true,
            RelayError::Server { status, .. } => *status >= 500 || *status == 429,
            RelayError::Unauthorized { .. } | RelayError::InvalidUrl(_) => false,
        }
    }
}

/// Errors from the summarize-and-save flow.
#[derive(Error, Debug)]
pub enum ClipError {
    /// The link is not confirmed or the API key has not been validated
    #[error("Not ready: {0}")]
    NotReady(String),

    /// Article had no usable text
    #[error("Article text is empty")]
    EmptyContent,

    /// Summarization failed
    #[error("Summarization failed: {0}")]
    Summarize(#[source] RelayError),

    /// Save was rejected for auth reasons and the follow-up check found the link gone
    #[error("Workspace link was revoked; link again to continue")]
    LinkLost,

    /// Save was rejected for auth reasons but the link still checks out
    #[error("Save rejected: {0}")]
    SaveRejected(#[source] RelayError),

    /// Save failed for a server or network reason; retry by user action
    #[error("Save failed: {0}")]
    Save(#[source] RelayError),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(e, _msg)
                if e.code == rusqlite::ErrorCode::DatabaseBusy
                    || e.code == rusqlite::ErrorCode::DatabaseLocked =>
            {
                StoreError::Locked
            }
            _ => StoreError::QueryFailed(err.to_string()),
        }
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
