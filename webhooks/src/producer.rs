//! Subscription matching and job enqueueing

use crate::{event::WebhookEvent, Result};
use message_bus::{payload::WebhookDeliveryJob, Publisher, Queue};
use std::sync::Arc;
use storage::Database;
use tracing::{debug, warn};

/// Matches subscriptions and enqueues signed delivery jobs
pub struct WebhookProducer {
    db: Arc<Database>,
    publisher: Arc<Publisher>,
}

impl WebhookProducer {
    /// Create a producer over the shared database and publisher
    pub fn new(db: Arc<Database>, publisher: Arc<Publisher>) -> Self {
        Self { db, publisher }
    }

    /// Fan an event out to every matching subscription.
    ///
    /// Each subscription gets its own delivery row and dispatch job, so one
    /// slow endpoint never delays another. Returns the number of jobs
    /// enqueued.
    pub async fn publish_event(
        &self,
        user_id: i64,
        workspace_id: i64,
        event: &str,
        data: serde_json::Value,
    ) -> Result<usize> {
        let subscriptions = self
            .db
            .active_webhooks_for_event(user_id, workspace_id, event)
            .await?;

        if subscriptions.is_empty() {
            debug!("No active webhooks for {} (user {})", event, user_id);
            return Ok(0);
        }

        let mut enqueued = 0;

        for webhook in subscriptions {
            let envelope = WebhookEvent::new(event, data.clone());

            let delivery_id = self
                .db
                .insert_webhook_delivery(
                    webhook.id,
                    &envelope.event_id,
                    event,
                    &serde_json::to_value(&envelope)?,
                )
                .await?;

            let job = WebhookDeliveryJob {
                delivery_id,
                webhook_id: webhook.id,
                event_id: envelope.event_id.clone(),
                event: event.to_string(),
                url: webhook.url.clone(),
                secret: webhook.secret.clone(),
                payload: serde_json::to_value(&envelope)?,
            };

            self.publisher
                .publish(Queue::InboxWebhook, &job, Some(&envelope.event_id))
                .await?;

            enqueued += 1;
        }

        debug!("Enqueued {} webhook deliveries for {}", enqueued, event);
        Ok(enqueued)
    }

    /// Fire-and-forget variant for hot paths.
    ///
    /// Webhook fan-out must never fail a send, so errors are logged and
    /// swallowed.
    pub async fn publish_event_nonblocking(
        self: Arc<Self>,
        user_id: i64,
        workspace_id: i64,
        event: &'static str,
        data: serde_json::Value,
    ) {
        tokio::spawn(async move {
            if let Err(e) = self.publish_event(user_id, workspace_id, event, data).await {
                warn!("Webhook fan-out for {} failed: {}", event, e);
            }
        });
    }
}
