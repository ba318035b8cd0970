//! Error types for oppstats-core

use thiserror::Error;

/// Main error type for the oppstats-core library
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Caller passed a value outside the accepted domain
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Unknown ordering key for top-N queries
    #[error("unknown ordering: {0}")]
    UnknownOrdering(String),
}

/// Result type alias for oppstats-core
pub type Result<T> = std::result::Result<T, Error>;
