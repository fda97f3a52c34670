//! Ledger error types

use rust_decimal::Decimal;
use thiserror::Error;

/// Ledger error
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Balance below the requested amount
    #[error("Insufficient credits: required {required}, available {available}")]
    InsufficientCredits {
        /// Amount requested
        required: Decimal,
        /// Balance at the time of the check
        available: Decimal,
    },

    /// No balance row exists for the user
    #[error("No credit account for user {0}")]
    NoAccount(i64),
}

/// Result type
pub type Result<T> = std::result::Result<T, LedgerError>;
