//! Delivery reconciler
//!
//! Resolves the eventually-consistent outcome of each send from the
//! provider's status callbacks. Callbacks are best-effort: every delivery is
//! acked, because the provider re-posts on its own schedule and a missed
//! callback is not fatal.

use crate::metrics::STATUS_OUTCOME_TOTAL;
use async_trait::async_trait;
use message_bus::{payload::StatusCallbackJob, Delivery, JobHandler};
use serde_json::json;
use std::sync::Arc;
use storage::Database;
use tracing::{debug, warn};
use webhooks::{events, WebhookProducer};

/// Map a provider status to (coarse code, textual status).
///
/// Unknown statuses return `None` for the coarse code and propagate as
/// textual only.
pub fn map_provider_status(status: &str) -> (Option<i16>, &str) {
    match status {
        "queued" => (Some(0), "queued"),
        "sending" => (Some(1), "sending"),
        "sent" => (Some(1), "sent"),
        "delivered" => (Some(2), "delivered"),
        "undelivered" => (Some(4), "undelivered"),
        "failed" => (Some(3), "failed"),
        "read" => (Some(2), "read"),
        other => (None, other),
    }
}

/// Consumes `inbox.status`
pub struct StatusReconciler {
    db: Arc<Database>,
    webhooks: Arc<WebhookProducer>,
}

impl StatusReconciler {
    /// Wire the reconciler
    pub fn new(db: Arc<Database>, webhooks: Arc<WebhookProducer>) -> Self {
        Self { db, webhooks }
    }

    async fn process(&self, job: StatusCallbackJob) {
        let data = job.data;
        let (coarse, textual) = map_provider_status(&data.status);

        let message = match self
            .db
            .find_message_for_callback(data.b_ref.as_deref(), &data.message_sid)
            .await
        {
            Ok(Some(message)) => message,
            Ok(None) => {
                warn!(
                    "No message for callback {} (bRef {:?}); provider will re-post",
                    data.message_sid, data.b_ref
                );
                STATUS_OUTCOME_TOTAL
                    .with_label_values(&["unmatched"])
                    .inc();
                return;
            }
            Err(e) => {
                warn!("Callback lookup failed for {}: {}", data.message_sid, e);
                STATUS_OUTCOME_TOTAL.with_label_values(&["error"]).inc();
                return;
            }
        };

        if let Err(e) = self
            .db
            .update_delivery_status(message.id, coarse, textual)
            .await
        {
            warn!("Status update failed for message {}: {}", message.id, e);
            STATUS_OUTCOME_TOTAL.with_label_values(&["error"]).inc();
            return;
        }

        debug!(
            "Message {} delivery status → {} (coarse {:?})",
            message.id, textual, coarse
        );
        STATUS_OUTCOME_TOTAL.with_label_values(&[textual]).inc();

        let event = match textual {
            "delivered" => {
                if message.is_drip {
                    if let Err(e) = self.db.mark_drip_contact_delivered(message.id).await {
                        warn!("Drip contact update failed for message {}: {}", message.id, e);
                    }
                }
                Some(events::MESSAGE_DELIVERED)
            }
            "failed" | "undelivered" => Some(events::MESSAGE_FAILED),
            _ => None,
        };

        if let Some(event) = event {
            self.webhooks
                .clone()
                .publish_event_nonblocking(
                    message.user_id,
                    message.workspace_id,
                    event,
                    json!({
                        "message_id": message.id,
                        "b_ref": message.b_ref,
                        "provider_message_id": data.message_sid,
                        "status": textual,
                        "error_code": data.error_code,
                        "error_message": data.error_message,
                    }),
                )
                .await;
        }
    }
}

#[async_trait]
impl JobHandler for StatusReconciler {
    async fn handle(&self, delivery: Delivery) -> message_bus::Result<()> {
        let job: StatusCallbackJob = delivery.parse()?;
        // Always ack: a missed callback is re-posted by the provider
        self.process(job).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_status_mapping_table() {
        assert_eq!(map_provider_status("queued"), (Some(0), "queued"));
        assert_eq!(map_provider_status("sending"), (Some(1), "sending"));
        assert_eq!(map_provider_status("sent"), (Some(1), "sent"));
        assert_eq!(map_provider_status("delivered"), (Some(2), "delivered"));
        assert_eq!(map_provider_status("undelivered"), (Some(4), "undelivered"));
        assert_eq!(map_provider_status("failed"), (Some(3), "failed"));
        assert_eq!(map_provider_status("read"), (Some(2), "read"));
    }

    #[test]
    fn test_unknown_status_propagates_textual_only() {
        let (coarse, textual) = map_provider_status("canceled");
        assert_eq!(coarse, None);
        assert_eq!(textual, "canceled");
    }
}
