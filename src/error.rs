//! Error types for picsync
//!
//! This module provides the error hierarchy for the library:
//! - [`Error`] - top-level error returned by store, resolver and sync operations
//! - [`DatabaseError`] - failures inside the SQLite record store
//! - [`ResolveError`] - failures of a single redirect resolution

use std::time::Duration;
use thiserror::Error;

/// Result type alias for picsync operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for picsync
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "resolver.endpoint")
        key: Option<String>,
    },

    /// Database operation failed
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    /// SQLx database error
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// HTTP client error outside of a resolution attempt (e.g. building the client)
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Redirect resolution failed after the resolver exhausted its retries
    #[error("resolve error: {0}")]
    Resolve(#[from] ResolveError),

    /// An operation exceeded its time budget
    #[error("{operation} timed out after {elapsed:?}")]
    Timeout {
        /// What timed out (e.g. "record attempt", "chunk", "populate")
        operation: &'static str,
        /// The budget that was exceeded
        elapsed: Duration,
    },

    /// The sync was cancelled by its host
    #[error("sync cancelled")]
    Cancelled,

    /// A populate run finished without resolving a single record
    #[error("all {failed} records failed to resolve: {first_error}")]
    AllRecordsFailed {
        /// Number of failed records
        failed: usize,
        /// Cause of the first failure
        first_error: String,
    },

    /// Every permitted sync attempt failed
    #[error("sync failed after {attempts} attempts: {last_error}")]
    SyncFailed {
        /// Number of attempts made
        attempts: u32,
        /// Error of the final attempt
        last_error: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Shorthand for a configuration error tied to a specific key
    pub(crate) fn config(key: &str, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.to_string()),
        }
    }

    /// Whether this error represents a cancellation rather than a failure
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}

/// Database-related errors
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Failed to connect to database
    #[error("failed to connect to database: {0}")]
    ConnectionFailed(String),

    /// Failed to run migrations
    #[error("failed to run migrations: {0}")]
    MigrationFailed(String),

    /// Query failed
    #[error("query failed: {0}")]
    QueryFailed(String),

    /// Record not found
    #[error("record not found: {0}")]
    NotFound(String),
}

/// Failure of a single redirect resolution
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    /// The endpoint answered with a redirect status but no usable `Location` header
    #[error("redirect response but no Location header")]
    MissingLocation,

    /// The endpoint answered with a status that is neither 200 nor a redirect
    #[error("unexpected response code: {0}")]
    UnexpectedStatus(u16),

    /// The request never produced a response (connect error, transport timeout, ...)
    #[error("request failed: {0}")]
    Transport(String),
}
