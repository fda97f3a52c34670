//! Direct send worker
//!
//! Consumes `inbox.send` jobs created by the upstream API. The `messages`
//! row already exists; this worker pays for the send when a cost is
//! attached, calls the gateway and records the provider's answer in a
//! single statement. Re-deliveries are detected by the row's
//! `provider_message_id`.

use crate::metrics::DISPATCH_OUTCOME_TOTAL;
use crate::ratelimit::TokenBucket;
use async_trait::async_trait;
use credit_ledger::{CreditLedger, LedgerError};
use message_bus::{
    payload::{InboxSendJob, SendSmsData},
    Delivery, JobHandler,
};
use rand::Rng;
use serde_json::json;
use sms_gateway::{Credentials, SendRequest, SmsSender};
use std::sync::Arc;
use std::time::Duration;
use storage::Database;
use tracing::{debug, info, warn};
use webhooks::{events, WebhookProducer};

/// Consumes `inbox.send`
pub struct SendWorker {
    db: Arc<Database>,
    ledger: Arc<CreditLedger>,
    gateway: Arc<dyn SmsSender>,
    webhooks: Arc<WebhookProducer>,
    bucket: Arc<TokenBucket>,
}

impl SendWorker {
    /// Wire the worker
    pub fn new(
        db: Arc<Database>,
        ledger: Arc<CreditLedger>,
        gateway: Arc<dyn SmsSender>,
        webhooks: Arc<WebhookProducer>,
        bucket: Arc<TokenBucket>,
    ) -> Self {
        Self {
            db,
            ledger,
            gateway,
            webhooks,
            bucket,
        }
    }

    async fn process(&self, data: SendSmsData) -> message_bus::Result<()> {
        if data.is_load_test {
            let pause = {
                let mut rng = rand::thread_rng();
                Duration::from_millis(rng.gen_range(50..=200))
            };
            tokio::time::sleep(pause).await;
            return Ok(());
        }

        let message = match self.db.get_message(data.message_id).await {
            Ok(Some(message)) => message,
            Ok(None) => {
                warn!("Message {} missing, dropping send job", data.message_id);
                return Ok(());
            }
            Err(e) => return Err(handler_err(e)),
        };

        if message.provider_message_id.is_some() {
            debug!("Message {} already sent, acking duplicate", message.id);
            DISPATCH_OUTCOME_TOTAL
                .with_label_values(&["duplicate"])
                .inc();
            return Ok(());
        }

        // Direct sends are pre-personalized by the API; only pay when the
        // job carries a cost
        let mut charged = None;
        if let Some(cost) = data.credit_cost {
            match self
                .ledger
                .deduct(
                    data.user_id,
                    cost,
                    &format!("Send to {}", data.to_number),
                    "sms",
                    data.message_id,
                )
                .await
            {
                Ok(_) => charged = Some(cost),
                Err(LedgerError::InsufficientCredits { .. }) => {
                    self.db
                        .mark_message_failed(message.id, "Insufficient credits")
                        .await
                        .map_err(handler_err)?;
                    DISPATCH_OUTCOME_TOTAL.with_label_values(&["failed"]).inc();
                    return Ok(());
                }
                Err(e) => return Err(handler_err(e)),
            }
        }

        self.bucket.acquire().await;

        let result = self
            .gateway
            .send(SendRequest {
                from: data.from_number.clone(),
                to: data.to_number.clone(),
                body: data.message.clone(),
                media_url: data.media_url.clone(),
                status_callback: data.status_callback_url.clone(),
                credentials: data.twilio_credentials.as_ref().map(|c| Credentials {
                    account_sid: c.account_sid.clone(),
                    auth_token: c.auth_token.clone(),
                }),
            })
            .await;

        if result.success {
            let sid = result.provider_message_id.unwrap_or_default();
            let delivery_status = result.status.as_deref().unwrap_or("sent");

            if let Err(e) = self
                .db
                .set_message_provider_id(message.id, &sid, 1, delivery_status, charged.is_some())
                .await
            {
                // Gateway accepted but the row update failed; requeueing is
                // safe because the next delivery re-reads the row
                return Err(handler_err(e));
            }

            if let Err(e) = self
                .db
                .touch_contact_last_message(data.contact_id, &data.message)
                .await
            {
                warn!("Failed to update contact {} preview: {}", data.contact_id, e);
            }

            info!("✅ Message {} sent (provider {})", message.id, sid);
            DISPATCH_OUTCOME_TOTAL.with_label_values(&["sent"]).inc();

            self.webhooks
                .clone()
                .publish_event_nonblocking(
                    data.user_id,
                    data.workspace_id,
                    events::OUTBOUND_MESSAGE,
                    json!({
                        "message_id": message.id,
                        "b_ref": data.b_ref,
                        "provider_message_id": sid,
                        "from_number": data.from_number,
                        "to_number": data.to_number,
                        "contact_id": data.contact_id,
                    }),
                )
                .await;
        } else {
            let provider_error = result
                .error_message
                .unwrap_or_else(|| "Unknown gateway error".to_string());
            let reason = match result.error_code {
                Some(code) => format!("Gateway error {}: {}", code, provider_error),
                None => format!("Gateway error: {}", provider_error),
            };

            if let Some(cost) = charged {
                if let Err(e) = self
                    .ledger
                    .refund(
                        data.user_id,
                        cost,
                        &format!("Refund: {}", reason),
                        "sms",
                        data.message_id,
                    )
                    .await
                {
                    warn!("Refund failed for message {}: {}", data.message_id, e);
                }
            }

            self.db
                .mark_message_failed(message.id, &reason)
                .await
                .map_err(handler_err)?;

            warn!("Message {} failed: {}", message.id, reason);
            DISPATCH_OUTCOME_TOTAL.with_label_values(&["failed"]).inc();
        }

        Ok(())
    }
}

#[async_trait]
impl JobHandler for SendWorker {
    async fn handle(&self, delivery: Delivery) -> message_bus::Result<()> {
        let InboxSendJob::SendSms { data, .. } = delivery.parse()?;
        self.process(data).await
    }
}

fn handler_err(e: impl std::fmt::Display) -> message_bus::Error {
    message_bus::Error::Handler(e.to_string())
}
