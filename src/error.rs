//! Error types for roster-bulk
//!
//! This module provides the crate-wide error type. Failures reported by the remote
//! platform are *not* represented here: they are classified at the batch executor
//! boundary (see [`crate::remote::RemoteOutcome`]) and never escape a running job.
//! The variants below cover what can actually refuse or break a job request:
//! - Configuration problems
//! - Progress Store (SQLite) failures
//! - Job admission errors (already running, shutting down, invalid request)

use crate::types::AccountId;
use thiserror::Error;

/// Result type alias for roster-bulk operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for roster-bulk
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "import.batch_size")
        key: Option<String>,
    },

    /// Database operation failed
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    /// Job request was refused
    #[error("job error: {0}")]
    Job(#[from] JobError),
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

/// Reasons a job request is refused before it reaches `Running`
#[derive(Debug, Error)]
pub enum JobError {
    /// Another job already owns this account's Progress Store
    #[error("a job is already running for account {account}")]
    AlreadyRunning {
        /// The account with an in-flight job
        account: AccountId,
    },

    /// Shutdown in progress - not accepting new jobs
    #[error("shutdown in progress: not accepting new jobs")]
    ShuttingDown,

    /// The request itself is malformed (e.g. zero invite count)
    #[error("invalid job request: {0}")]
    InvalidRequest(String),
}

impl Error {
    /// Machine-readable error code (e.g., "database_error", "already_running")
    ///
    /// Used in event payloads and operator-facing abort reasons.
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::Config { .. } => "config_error",
            Error::Database(e) => match e {
                DatabaseError::ConnectionFailed(_) => "database_connection_failed",
                DatabaseError::MigrationFailed(_) => "database_migration_failed",
                DatabaseError::QueryFailed(_) => "database_error",
                DatabaseError::NotFound(_) => "not_found",
            },
            Error::Job(e) => match e {
                JobError::AlreadyRunning { .. } => "already_running",
                JobError::ShuttingDown => "shutting_down",
                JobError::InvalidRequest(_) => "invalid_request",
            },
        }
    }

    /// Build a configuration error for the given key
    pub(crate) fn config(key: &str, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.to_string()),
        }
    }
}
