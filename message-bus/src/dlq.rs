//! Dead-letter routing
//!
//! Messages that exhaust the retry budget are copied to the owning domain's
//! failed stream with failure metadata. Entries expire with the stream's
//! 7-day retention; reprocessing is operator-driven.

use crate::{client::NatsClient, metrics::MESSAGE_DEAD_LETTER_TOTAL, topology::Queue, Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

/// Failed-message entry with failure metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DlqEntry {
    pub id: String,
    /// Logical queue the message was consumed from
    pub queue: String,
    /// Original payload, when it was valid JSON; raw text otherwise
    pub payload: serde_json::Value,
    pub failure_reason: String,
    pub retry_count: u32,
    pub failed_at: DateTime<Utc>,
    /// Transient failures are safe to republish as-is
    pub reprocessable: bool,
}

/// Routes exhausted messages to the failed stream of their domain
pub struct DlqRouter {
    client: Arc<NatsClient>,
    queue: Queue,
}

impl DlqRouter {
    /// Create a router for one queue
    pub fn new(client: Arc<NatsClient>, queue: Queue) -> Self {
        Self { client, queue }
    }

    /// Copy a payload to the failed stream.
    ///
    /// Queues without a dead-letter path (notifications) drop the message
    /// with a warning instead.
    pub async fn route(&self, payload: &[u8], reason: &str, retry_count: u32) -> Result<String> {
        if self.queue.failed_stream().is_none() {
            warn!(
                "Dropping exhausted message from {} (no dead-letter path): {}",
                self.queue, reason
            );
            return Ok(String::new());
        }

        let entry = DlqEntry {
            id: Uuid::new_v4().to_string(),
            queue: self.queue.to_string(),
            payload: serde_json::from_slice(payload)
                .unwrap_or_else(|_| serde_json::Value::String(String::from_utf8_lossy(payload).into_owned())),
            failure_reason: reason.to_string(),
            retry_count,
            failed_at: Utc::now(),
            reprocessable: is_reprocessable(reason),
        };

        let js = self.client.jetstream().await?;
        let bytes = serde_json::to_vec(&entry)?;

        js.publish(self.queue.failed_subject(), bytes.into())
            .await
            .map_err(|e| Error::Publish(e.to_string()))?
            .await
            .map_err(|e| Error::Publish(e.to_string()))?;

        MESSAGE_DEAD_LETTER_TOTAL
            .with_label_values(&[self.queue.subject()])
            .inc();

        warn!(
            "Message from {} moved to {} after {} attempts: {}",
            self.queue,
            self.queue.failed_subject(),
            retry_count,
            reason
        );

        Ok(entry.id)
    }
}

/// Transient failures are safe to replay; permanent ones need a human first.
fn is_reprocessable(reason: &str) -> bool {
    let transient = [
        "timeout",
        "connection",
        "unavailable",
        "rate limit",
        "temporary",
    ];

    let lowered = reason.to_lowercase();
    transient.iter().any(|t| lowered.contains(t))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_reprocessable() {
        assert!(is_reprocessable("connection timeout"));
        assert!(is_reprocessable("service temporarily unavailable"));
        assert!(is_reprocessable("Rate limit exceeded"));
        assert!(!is_reprocessable("invalid payload shape"));
        assert!(!is_reprocessable("contact opted out"));
    }

    #[test]
    fn test_dlq_entry_serializes_raw_payload() {
        let entry = DlqEntry {
            id: "x".to_string(),
            queue: "drip.messages".to_string(),
            payload: serde_json::Value::String("not json".to_string()),
            failure_reason: "parse".to_string(),
            retry_count: 3,
            failed_at: Utc::now(),
            reprocessable: false,
        };

        let bytes = serde_json::to_vec(&entry).unwrap();
        let back: DlqEntry = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(back.retry_count, 3);
        assert!(!back.reprocessable);
    }
}
