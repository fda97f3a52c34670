//! Webhook error types

use thiserror::Error;

/// Webhook error
#[derive(Debug, Error)]
pub enum WebhookError {
    /// Storage error
    #[error("Storage error: {0}")]
    Storage(#[from] storage::Error),

    /// Message bus error
    #[error("Bus error: {0}")]
    Bus(#[from] message_bus::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type
pub type Result<T> = std::result::Result<T, WebhookError>;
