//! Error types for exec-match.
//!
//! Defines the main error enum used throughout the crate. Execution errors are
//! usually carried as data inside `ExecutionOutcome::Failure`; only gold-side
//! failures escape the judge as hard errors.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Main error type for exec-match operations.
#[derive(Error, Debug)]
pub enum EvalError {
    /// Sandbox setup errors (missing database file, copy failure, temp dir creation).
    #[error("Sandbox error: {0}")]
    Sandbox(String),

    /// Query execution errors (syntax errors, constraint violations, etc.)
    #[error("Query error: {0}")]
    Query(String),

    /// SQL text could not be parsed by the rewriting collaborators.
    #[error("Parse error: {0}")]
    Parse(String),

    /// A single execution attempt exceeded its wall-clock budget.
    #[error("Query timed out after {}s", .0.as_secs_f64())]
    Timeout(Duration),

    /// The gold query failed on a database file. This is bad reference data.
    #[error("Gold query `{query}` failed on database file {}: {detail}", database.display())]
    GoldFailed {
        database: PathBuf,
        query: String,
        detail: String,
    },

    /// Configuration errors (invalid config file, unreadable batch file, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal errors (unexpected states, bugs, etc.)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl EvalError {
    /// Creates a sandbox error with the given message.
    pub fn sandbox(msg: impl Into<String>) -> Self {
        Self::Sandbox(msg.into())
    }

    /// Creates a query error with the given message.
    pub fn query(msg: impl Into<String>) -> Self {
        Self::Query(msg.into())
    }

    /// Creates a parse error with the given message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    /// Creates a configuration error with the given message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Creates an internal error with the given message.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Creates the fatal error raised when the gold query fails on a database.
    pub fn gold_failed(
        database: impl Into<PathBuf>,
        query: impl Into<String>,
        detail: impl ToString,
    ) -> Self {
        Self::GoldFailed {
            database: database.into(),
            query: query.into(),
            detail: detail.to_string(),
        }
    }

    /// Returns true if this error came from a timed-out execution.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    /// Returns the error category as a string for display purposes.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Sandbox(_) => "Sandbox Error",
            Self::Query(_) => "Query Error",
            Self::Parse(_) => "Parse Error",
            Self::Timeout(_) => "Timeout",
            Self::GoldFailed { .. } => "Gold Query Failure",
            Self::Config(_) => "Configuration Error",
            Self::Internal(_) => "Internal Error",
        }
    }
}

/// Result type alias using EvalError.
pub type Result<T> = std::result::Result<T, EvalError>;
