//! Error types for alchemy-db
//!
//! Every failure the core can report falls into one of four groups:
//! a missing run, a rejected input, an engine failure mid-run, or a storage
//! failure. Messages are written for the person looking at the dashboard.

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// alchemy-db error types
#[derive(Error, Debug)]
pub enum Error {
    /// Requested run has no row in the run store
    #[error("Run {run_id} not found")]
    NotFound {
        /// The id that was looked up
        run_id: i64,
    },

    /// Input rejected before any store mutation
    #[error("Invalid input: {0}")]
    Validation(String),

    /// External simulation engine failed or returned malformed data.
    ///
    /// Rows already written for the run are left in place so the partial run
    /// can be inspected or discarded.
    #[error("Simulation engine failed during run {run_id}: {message}\nRows written so far are kept; inspect or discard the run")]
    Engine {
        /// Run that was in progress
        run_id: i64,
        /// Engine-provided description
        message: String,
    },

    /// Storage error not covered by a more specific variant
    #[error("Storage error: {0}")]
    Storage(String),

    /// SQLite error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Arrow error
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// Parquet error
    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Shorthand for a [`Error::Validation`] with a formatted message.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Whether this error reports a missing run.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Whether this error reports rejected input.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Run id carried by the error, if any.
    #[must_use]
    pub const fn run_id(&self) -> Option<i64> {
        match self {
            Self::NotFound { run_id } | Self::Engine { run_id, .. } => Some(*run_id),
            _ => None,
        }
    }
}
