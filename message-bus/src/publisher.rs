//! Persistent publisher with retry logic

use crate::{
    client::NatsClient,
    metrics::{MESSAGE_PUBLISH_DURATION, MESSAGE_PUBLISH_TOTAL},
    topology::Queue,
    Error, Result,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, warn};

/// Publisher configuration
#[derive(Debug, Clone)]
pub struct PublisherConfig {
    /// Max attempts per publish
    pub max_retry_attempts: u32,

    /// Initial retry delay
    pub initial_retry_delay: Duration,

    /// Max retry delay
    pub max_retry_delay: Duration,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            max_retry_attempts: 3,
            initial_retry_delay: Duration::from_millis(100),
            max_retry_delay: Duration::from_secs(2),
        }
    }
}

/// Persistent publisher.
///
/// Every publish goes through JetStream and waits for the stream ack, so a
/// returned `Ok` means the broker has the message on disk.
pub struct Publisher {
    client: Arc<NatsClient>,
    config: PublisherConfig,
}

impl Publisher {
    /// Create new publisher
    pub fn new(client: Arc<NatsClient>, config: PublisherConfig) -> Self {
        Self { client, config }
    }

    /// Serialize and publish a payload to a queue.
    ///
    /// `msg_id` becomes the broker-level `Nats-Msg-Id`, enabling server-side
    /// de-duplication for re-published work items.
    pub async fn publish<T: Serialize>(
        &self,
        queue: Queue,
        payload: &T,
        msg_id: Option<&str>,
    ) -> Result<()> {
        let start = Instant::now();
        let bytes = serde_json::to_vec(payload)?;

        let result = self.publish_with_retry(queue, bytes, msg_id).await;

        let duration = start.elapsed().as_secs_f64();
        MESSAGE_PUBLISH_DURATION
            .with_label_values(&[queue.subject()])
            .observe(duration);

        let status = if result.is_ok() { "success" } else { "error" };
        MESSAGE_PUBLISH_TOTAL
            .with_label_values(&[queue.subject(), status])
            .inc();

        result
    }

    async fn publish_with_retry(
        &self,
        queue: Queue,
        payload: Vec<u8>,
        msg_id: Option<&str>,
    ) -> Result<()> {
        let mut attempts = 0;
        let mut delay = self.config.initial_retry_delay;

        loop {
            attempts += 1;

            match self.publish_once(queue, &payload, msg_id).await {
                Ok(_) => return Ok(()),
                Err(e) => {
                    if attempts >= self.config.max_retry_attempts {
                        error!(
                            "❌ Failed to publish to {} after {} attempts: {}",
                            queue, attempts, e
                        );
                        return Err(e);
                    }

                    warn!(
                        "⚠️  Publish to {} failed (attempt {}), retrying in {:?}: {}",
                        queue, attempts, delay, e
                    );
                    tokio::time::sleep(delay).await;
                    delay = (delay * 2).min(self.config.max_retry_delay);
                }
            }
        }
    }

    async fn publish_once(&self, queue: Queue, payload: &[u8], msg_id: Option<&str>) -> Result<()> {
        let js = self.client.jetstream().await?;

        let ack = match msg_id {
            Some(id) => {
                let mut headers = async_nats::HeaderMap::new();
                headers.insert("Nats-Msg-Id", id);
                js.publish_with_headers(
                    queue.subject(),
                    headers,
                    bytes::Bytes::copy_from_slice(payload),
                )
                .await
            }
            None => {
                js.publish(queue.subject(), bytes::Bytes::copy_from_slice(payload))
                    .await
            }
        }
        .map_err(|e| Error::Publish(e.to_string()))?;

        // The ack confirms the stream persisted the message
        ack.await
            .map_err(|e| Error::Publish(format!("Publish ack failed: {}", e)))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::BusConfig;

    #[tokio::test]
    async fn test_publisher_config_default() {
        let config = PublisherConfig::default();
        assert_eq!(config.max_retry_attempts, 3);
        assert_eq!(config.initial_retry_delay, Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_publish_without_connection_fails() {
        let client = Arc::new(NatsClient::new(BusConfig::default()));
        let publisher = Publisher::new(client, PublisherConfig::default());

        let result = publisher
            .publish(Queue::DripMessages, &serde_json::json!({"x": 1}), None)
            .await;
        assert!(result.is_err());
    }
}
