//! Error types for the message bus

use thiserror::Error;

/// Message bus error
#[derive(Debug, Error)]
pub enum Error {
    /// Broker connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Connection attempts exhausted
    #[error("Broker unreachable after {0} attempts")]
    ConnectExhausted(u32),

    /// JetStream error
    #[error("JetStream error: {0}")]
    JetStream(String),

    /// Publish error
    #[error("Publish error: {0}")]
    Publish(String),

    /// Subscribe error
    #[error("Subscribe error: {0}")]
    Subscribe(String),

    /// Consumer error
    #[error("Consumer error: {0}")]
    Consumer(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Handler error surfaced by a consumer
    #[error("Handler error: {0}")]
    Handler(String),
}

/// Result type
pub type Result<T> = std::result::Result<T, Error>;
