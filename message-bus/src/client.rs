//! NATS client wrapper with connection management

use crate::{metrics::BROKER_CONNECTION_STATUS, Error, Result};
use async_nats::jetstream;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// Broker client configuration
#[derive(Debug, Clone)]
pub struct BusConfig {
    /// Broker server URLs
    pub urls: Vec<String>,

    /// Connection name
    pub name: String,

    /// Max connect attempts before giving up
    pub max_connect_attempts: u32,

    /// Initial backoff between attempts (doubles per attempt)
    pub initial_backoff: Duration,

    /// Backoff ceiling
    pub max_backoff: Duration,

    /// Connection timeout per attempt
    pub connection_timeout: Duration,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            urls: vec!["nats://localhost:4222".to_string()],
            name: "sengine".to_string(),
            max_connect_attempts: 10,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
            connection_timeout: Duration::from_secs(5),
        }
    }
}

/// Broker client wrapper shared by publishers and consumers
pub struct NatsClient {
    config: BusConfig,
    client: Arc<RwLock<Option<async_nats::Client>>>,
    jetstream: Arc<RwLock<Option<jetstream::Context>>>,
}

impl NatsClient {
    /// Create new client (not yet connected)
    pub fn new(config: BusConfig) -> Self {
        Self {
            config,
            client: Arc::new(RwLock::new(None)),
            jetstream: Arc::new(RwLock::new(None)),
        }
    }

    /// Connect with exponential backoff.
    ///
    /// Retries up to `max_connect_attempts` times, doubling the delay from
    /// `initial_backoff` to the `max_backoff` ceiling. When every attempt
    /// fails the caller is expected to exit the process non-zero.
    pub async fn connect(&self) -> Result<()> {
        let mut backoff = self.config.initial_backoff;

        for attempt in 1..=self.config.max_connect_attempts {
            info!(
                "Connecting to broker (attempt {}/{}): {:?}",
                attempt, self.config.max_connect_attempts, self.config.urls
            );

            let options = async_nats::ConnectOptions::new()
                .name(&self.config.name)
                .connection_timeout(self.config.connection_timeout);

            match async_nats::connect_with_options(self.config.urls.join(","), options).await {
                Ok(client) => {
                    info!("✅ Connected to broker");
                    BROKER_CONNECTION_STATUS
                        .with_label_values(&["connected"])
                        .inc();

                    let js = jetstream::new(client.clone());
                    *self.client.write().await = Some(client);
                    *self.jetstream.write().await = Some(js);
                    return Ok(());
                }
                Err(e) => {
                    BROKER_CONNECTION_STATUS
                        .with_label_values(&["failed"])
                        .inc();
                    warn!(
                        "⚠️  Broker connect failed (attempt {}), retrying in {:?}: {}",
                        attempt, backoff, e
                    );

                    if attempt < self.config.max_connect_attempts {
                        tokio::time::sleep(backoff).await;
                        backoff = (backoff * 2).min(self.config.max_backoff);
                    }
                }
            }
        }

        Err(Error::ConnectExhausted(self.config.max_connect_attempts))
    }

    /// Get underlying client
    pub async fn client(&self) -> Result<async_nats::Client> {
        self.client
            .read()
            .await
            .clone()
            .ok_or_else(|| Error::Connection("Not connected".to_string()))
    }

    /// Get JetStream context
    pub async fn jetstream(&self) -> Result<jetstream::Context> {
        self.jetstream
            .read()
            .await
            .clone()
            .ok_or_else(|| Error::JetStream("JetStream not initialized".to_string()))
    }

    /// Check if the connection is live
    pub async fn is_connected(&self) -> bool {
        match self.client.read().await.as_ref() {
            Some(client) => {
                client.connection_state() == async_nats::connection::State::Connected
            }
            None => false,
        }
    }

    /// Flush pending traffic and drop the connection
    pub async fn disconnect(&self) -> Result<()> {
        if let Some(client) = self.client.write().await.take() {
            client
                .flush()
                .await
                .map_err(|e| Error::Connection(e.to_string()))?;
            info!("Disconnected from broker");
        }

        *self.jetstream.write().await = None;
        Ok(())
    }

    /// Round-trip health check
    pub async fn health_check(&self) -> Result<()> {
        let client = self.client().await?;

        client
            .publish("sengine.health", bytes::Bytes::from_static(b"ping"))
            .await
            .map_err(|e| Error::Connection(format!("Health check failed: {}", e)))?;

        client
            .flush()
            .await
            .map_err(|e| Error::Connection(format!("Flush failed: {}", e)))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bus_config_default() {
        let config = BusConfig::default();
        assert_eq!(config.name, "sengine");
        assert_eq!(config.max_connect_attempts, 10);
        assert_eq!(config.initial_backoff, Duration::from_secs(1));
        assert_eq!(config.max_backoff, Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_client_starts_disconnected() {
        let client = NatsClient::new(BusConfig::default());
        assert!(!client.is_connected().await);
        assert!(client.client().await.is_err());
    }
}
