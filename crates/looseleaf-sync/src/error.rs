//! Error types for looseleaf-sync

use thiserror::Error;

/// Result type alias using looseleaf-sync's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in looseleaf-sync operations
///
/// Nothing here is fatal: local persistence failures are recovered without
/// interrupting an edit, and remote failures mean "temporarily unavailable"
/// until the next reconciliation pass.
#[derive(Error, Debug)]
pub enum Error {
    /// Local persistence failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// SQLite error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Network or auth failure talking to the remote store
    #[error("Remote store unavailable: {0}")]
    RemoteUnavailable(String),

    /// Live change feed subscription lost
    #[error("Change feed dropped: {0}")]
    FeedDropped(String),

    /// Record not found
    #[error("Record not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
