//! Common error types for NoteKeep

use thiserror::Error;

/// Common result type for NoteKeep operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy shared by repository, organizer, overlay and reconciler
#[derive(Error, Debug)]
pub enum Error {
    /// Unknown note id or album
    #[error("Not found: {0}")]
    NotFound(String),

    /// Duplicate album name, reserved view name, or note already in album
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Invalid album name, unsafe path segment, or operation not applicable
    #[error("Validation error: {0}")]
    Validation(String),

    /// Disk or filesystem failure (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Network or remote failure; retryable by the fetch layer, not by the core
    #[error("Transient fetch error: {0}")]
    TransientFetch(String),

    /// Database operation error (wraps sqlx::Error)
    #[cfg(feature = "sqlx")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Metadata or listing could not be encoded/decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Wrap an I/O error with the operation and target it failed on
    pub fn io_context(operation: &str, target: impl std::fmt::Display, err: std::io::Error) -> Self {
        Error::Io(std::io::Error::new(
            err.kind(),
            format!("{} {}: {}", operation, target, err),
        ))
    }

    /// True for errors a caller may retry later without changing input
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::TransientFetch(_))
    }
}
