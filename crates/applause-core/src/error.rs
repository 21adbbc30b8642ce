//! Error types for the applause engine.

use thiserror::Error;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while reading or toggling applause.
#[derive(Error, Debug)]
pub enum Error {
    /// The input could not be parsed as an absolute URL.
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// A mutating request carried no acceptable member token.
    #[error("unauthorized")]
    Unauthorized,

    /// SQLite failed while running a store operation. Nothing was committed.
    #[error("storage error during {operation}: {source}")]
    Storage {
        /// The store primitive that failed (e.g. "toggle", "get_count").
        operation: &'static str,
        /// The underlying SQLite error.
        #[source]
        source: rusqlite::Error,
    },

    /// I/O error (e.g. creating the database directory).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Wrap a SQLite error with the name of the operation that produced it.
    pub fn storage(operation: &'static str) -> impl FnOnce(rusqlite::Error) -> Self {
        move |source| Self::Storage { operation, source }
    }

    /// Returns true for failures of the storage layer.
    pub fn is_storage(&self) -> bool {
        matches!(self, Self::Storage { .. } | Self::Io(_))
    }
}
