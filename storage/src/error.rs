//! Storage error types

use thiserror::Error;

/// Storage error
#[derive(Debug, Error)]
pub enum Error {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Invalid status code read from storage
    #[error("Invalid {entity} status code: {code}")]
    InvalidStatus {
        /// Entity name
        entity: &'static str,
        /// Unrecognized code
        code: i16,
    },
}

/// Result type
pub type Result<T> = std::result::Result<T, Error>;
