//! Error types for binome-core

use thiserror::Error;

use crate::gateway::GatewayError;

/// Result type alias using binome-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in binome-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Local store error
    #[error("Database error: {0}")]
    Database(String),

    /// `SQLite` error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Record not found
    #[error("Record not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Remote table request failed
    #[error("Remote table error: {0}")]
    Gateway(#[from] GatewayError),

    /// A whole reconciliation cycle was skipped
    #[error("Sync aborted: {0}")]
    SyncAborted(String),

    /// The stored session is past its expiry
    #[error("Session expired")]
    SessionExpired,
}
