//! Durable consumers with manual acknowledgement
//!
//! Every queue is consumed through a durable pull consumer. Handlers decide
//! the outcome: `Ok` acks the message, a handler error negative-acks for
//! redelivery until the retry budget is spent, after which the payload is
//! copied to the domain's failed stream and terminated. Malformed payloads
//! are terminated immediately — the broker is never the long-term log of
//! outcomes.

use crate::{
    client::NatsClient,
    dlq::DlqRouter,
    metrics::{MESSAGE_PROCESS_DURATION, MESSAGE_RECEIVE_TOTAL},
    topology::Queue,
    Error, Result,
};
use async_nats::jetstream::{consumer, AckKind};
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{error, info, warn};

/// A single delivered message
pub struct Delivery {
    /// Raw payload bytes
    pub payload: Bytes,

    /// Redelivery count: 0 on first delivery
    pub retry_count: u32,
}

impl Delivery {
    /// Parse the payload as JSON.
    ///
    /// A parse failure is terminal for the message: the consumer terminates
    /// it instead of requeueing.
    pub fn parse<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.payload).map_err(Error::Serialization)
    }
}

/// Message handler seam implemented by each worker
#[async_trait]
pub trait JobHandler: Send + Sync {
    /// Handle one delivery. `Ok` acknowledges the message.
    async fn handle(&self, delivery: Delivery) -> Result<()>;
}

/// Subscriber configuration
#[derive(Debug, Clone)]
pub struct SubscriberConfig {
    /// Max outstanding unacked messages (prefetch)
    pub prefetch: i64,

    /// Redelivery wait after a missing ack
    pub ack_wait: Duration,

    /// Attempts before a message is dead-lettered
    pub max_deliver: i64,

    /// Consumer tag suffix, unique per process
    pub consumer_tag: String,
}

impl Default for SubscriberConfig {
    fn default() -> Self {
        Self {
            prefetch: 50,
            ack_wait: Duration::from_secs(30),
            max_deliver: 3,
            consumer_tag: "worker".to_string(),
        }
    }
}

/// Queue consumer bound to one durable consumer
pub struct Subscriber {
    client: Arc<NatsClient>,
    config: SubscriberConfig,
    queue: Queue,
    dlq: DlqRouter,
}

impl Subscriber {
    /// Create new subscriber for a queue
    pub fn new(client: Arc<NatsClient>, config: SubscriberConfig, queue: Queue) -> Self {
        let dlq = DlqRouter::new(client.clone(), queue);
        Self {
            client,
            config,
            queue,
            dlq,
        }
    }

    /// Consume until the shutdown signal flips.
    ///
    /// The in-flight handler finishes before the loop returns, so shutdown
    /// never abandons a half-processed message.
    pub async fn run<H>(&self, handler: Arc<H>, mut shutdown: watch::Receiver<bool>) -> Result<()>
    where
        H: JobHandler + 'static,
    {
        let js = self.client.jetstream().await?;

        let consumer_config = consumer::pull::Config {
            durable_name: Some(self.queue.durable_name().to_string()),
            filter_subject: self.queue.subject().to_string(),
            ack_policy: consumer::AckPolicy::Explicit,
            ack_wait: self.config.ack_wait,
            // One above the budget so the explicit dead-letter pass always
            // sees the final delivery before JetStream stops redelivering.
            max_deliver: self.config.max_deliver + 1,
            max_ack_pending: self.config.prefetch,
            deliver_policy: consumer::DeliverPolicy::All,
            ..Default::default()
        };

        let consumer = js
            .get_stream(self.queue.stream_name())
            .await
            .map_err(|e| Error::JetStream(e.to_string()))?
            .get_or_create_consumer(self.queue.durable_name(), consumer_config)
            .await
            .map_err(|e| Error::Consumer(e.to_string()))?;

        let mut messages = consumer
            .messages()
            .await
            .map_err(|e| Error::Subscribe(e.to_string()))?;

        info!(
            "📡 Consuming {} (durable: {}, tag: {}, prefetch: {})",
            self.queue,
            self.queue.durable_name(),
            self.config.consumer_tag,
            self.config.prefetch
        );

        loop {
            let msg = tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Consumer for {} stopping", self.queue);
                        break;
                    }
                    continue;
                }
                next = messages.next() => match next {
                    Some(Ok(msg)) => msg,
                    Some(Err(e)) => {
                        warn!("⚠️  Consume error on {}: {}", self.queue, e);
                        continue;
                    }
                    None => {
                        warn!("⚠️  Subscription for {} ended", self.queue);
                        break;
                    }
                },
            };

            self.process(&*handler, msg).await;
        }

        Ok(())
    }

    async fn process<H: JobHandler>(&self, handler: &H, msg: async_nats::jetstream::Message) {
        let retry_count = msg
            .info()
            .map(|info| info.delivered.saturating_sub(1) as u32)
            .unwrap_or(0);

        let delivery = Delivery {
            payload: msg.payload.clone(),
            retry_count,
        };

        let start = Instant::now();
        let outcome = handler.handle(delivery).await;

        MESSAGE_PROCESS_DURATION
            .with_label_values(&[self.queue.subject()])
            .observe(start.elapsed().as_secs_f64());

        match outcome {
            Ok(()) => {
                MESSAGE_RECEIVE_TOTAL
                    .with_label_values(&[self.queue.subject(), "success"])
                    .inc();

                if let Err(e) = msg.ack().await {
                    error!("Failed to ack message on {}: {}", self.queue, e);
                }
            }
            Err(Error::Serialization(e)) => {
                // Malformed payload: drop without redelivery
                MESSAGE_RECEIVE_TOTAL
                    .with_label_values(&[self.queue.subject(), "parse_error"])
                    .inc();
                warn!("Dropping malformed payload on {}: {}", self.queue, e);

                if let Err(term_err) = msg.ack_with(AckKind::Term).await {
                    error!("Failed to terminate bad message: {}", term_err);
                }
            }
            Err(e) => {
                MESSAGE_RECEIVE_TOTAL
                    .with_label_values(&[self.queue.subject(), "error"])
                    .inc();
                error!("Error handling message on {}: {}", self.queue, e);

                if i64::from(retry_count) + 1 >= self.config.max_deliver {
                    self.dead_letter(&msg, retry_count + 1, &e.to_string()).await;
                } else if let Err(nak_err) = msg.ack_with(AckKind::Nak(None)).await {
                    error!("Failed to nak message on {}: {}", self.queue, nak_err);
                }
            }
        }
    }

    async fn dead_letter(&self, msg: &async_nats::jetstream::Message, attempts: u32, reason: &str) {
        if let Err(dlq_err) = self.dlq.route(&msg.payload, reason, attempts).await {
            error!(
                "Failed to dead-letter message on {}: {}; requeueing",
                self.queue, dlq_err
            );
            if let Err(nak_err) = msg.ack_with(AckKind::Nak(None)).await {
                error!("Failed to nak message on {}: {}", self.queue, nak_err);
            }
            return;
        }

        if let Err(term_err) = msg.ack_with(AckKind::Term).await {
            error!("Failed to terminate dead-lettered message: {}", term_err);
        }
    }
}
