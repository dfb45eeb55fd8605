//! Error types for db-chores.
//!
//! Defines the error enum shared by every stage of a task invocation, plus the
//! separate warning type produced while releasing a connection.

use thiserror::Error;

/// Main error type for task invocations.
#[derive(Error, Debug, Clone)]
pub enum TaskError {
    /// Bad or missing command-line input. Never reaches the database.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Database connection errors (host unreachable, auth failed, missing credentials, etc.)
    #[error("Connection error: {0}")]
    Connection(String),

    /// Statement errors (syntax errors, constraint violations, type mismatches, etc.)
    #[error("Query error: {0}")]
    Query(String),

    /// Configuration errors (invalid config file, malformed connection string, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal application errors (unexpected states, bugs, etc.)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl TaskError {
    /// Creates a validation error with the given message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Creates a connection error with the given message.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Creates a query error with the given message.
    pub fn query(msg: impl Into<String>) -> Self {
        Self::Query(msg.into())
    }

    /// Creates a configuration error with the given message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Creates an internal error with the given message.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Returns the error category as a string for display purposes.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Validation(_) => "Validation Error",
            Self::Connection(_) => "Connection Error",
            Self::Query(_) => "Query Error",
            Self::Config(_) => "Configuration Error",
            Self::Internal(_) => "Internal Error",
        }
    }

    /// Returns the message without the category prefix.
    pub fn message(&self) -> &str {
        match self {
            Self::Validation(m)
            | Self::Connection(m)
            | Self::Query(m)
            | Self::Config(m)
            | Self::Internal(m) => m,
        }
    }
}

/// Failure while closing a connection.
///
/// Logged and folded into the exit code, but never reported as the outcome
/// of the invocation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Release warning: {0}")]
pub struct ReleaseWarning(pub String);

/// Result type alias using TaskError.
pub type Result<T> = std::result::Result<T, TaskError>;
