//! Outbound drip dispatcher
//!
//! Consumes `drip.messages` and walks each payload through the ordered send
//! pipeline: idempotency check, contact and user validation, sender
//! resolution, credit reservation, token-bucket pacing, personalization,
//! the gateway call, and the storage reconciliation that follows it.
//!
//! Application-level failures transition the work item to a terminal state
//! and ack the broker message — the database is authoritative, the broker is
//! never used for application retry. Only infrastructure errors before the
//! charge surface as handler errors for redelivery.

use crate::metrics::DISPATCH_OUTCOME_TOTAL;
use crate::personalize::{personalize, TemplateVars};
use crate::ratelimit::TokenBucket;
use async_trait::async_trait;
use credit_ledger::{CreditLedger, LedgerError};
use message_bus::{payload::DripSendJob, Delivery, JobHandler};
use rand::Rng;
use rust_decimal::Decimal;
use serde_json::json;
use sms_gateway::{phone::digits_only, Credentials, SendRequest, SmsSender};
use std::sync::Arc;
use std::time::Duration;
use storage::models::{Contact, User};
use storage::{queries::messages::NewOutboundMessage, Database};
use tracing::{debug, info, warn};
use uuid::Uuid;
use webhooks::{events, WebhookProducer};

/// Coarse message status codes used on `messages.status`
mod coarse {
    pub const SENT: i16 = 1;
}

/// Dispatcher dependencies
pub struct DripDispatcher {
    db: Arc<Database>,
    ledger: Arc<CreditLedger>,
    gateway: Arc<dyn SmsSender>,
    webhooks: Arc<WebhookProducer>,
    bucket: Arc<TokenBucket>,
    status_callback_url: Option<String>,
    /// Extra per-send delay hint, on top of the token bucket
    send_delay: Duration,
}

/// Terminal outcome of one payload
enum Outcome {
    Sent,
    Duplicate,
    Skipped(&'static str),
    Failed(String),
}

impl DripDispatcher {
    /// Wire the dispatcher
    pub fn new(
        db: Arc<Database>,
        ledger: Arc<CreditLedger>,
        gateway: Arc<dyn SmsSender>,
        webhooks: Arc<WebhookProducer>,
        bucket: Arc<TokenBucket>,
        status_callback_url: Option<String>,
        send_delay: Duration,
    ) -> Self {
        Self {
            db,
            ledger,
            gateway,
            webhooks,
            bucket,
            status_callback_url,
            send_delay,
        }
    }

    async fn process(&self, job: DripSendJob) -> message_bus::Result<()> {
        // Load-test payloads exercise the queue without touching anything
        if job.is_load_test {
            let pause = {
                let mut rng = rand::thread_rng();
                Duration::from_millis(rng.gen_range(50..=200))
            };
            tokio::time::sleep(pause).await;
            return Ok(());
        }

        // Idempotency: the scheduled row is the source of truth. A row that
        // already reached the gateway is done regardless of redelivery.
        let row = match self.db.get_scheduled_message(job.scheduled_message_id).await {
            Ok(Some(row)) => row,
            Ok(None) => {
                warn!(
                    "Scheduled row {} missing, dropping payload",
                    job.scheduled_message_id
                );
                return Ok(());
            }
            Err(e) => return Err(handler_err(e)),
        };

        if row.provider_message_id.is_some() || row.message_id.is_some() {
            debug!(
                "Scheduled row {} already sent, acking duplicate delivery",
                row.id
            );
            record(Outcome::Duplicate);
            return Ok(());
        }

        if let Ok(status) = row.scheduled_status() {
            if status.is_terminal() {
                debug!("Scheduled row {} already terminal ({:?})", row.id, status);
                return Ok(());
            }
        }

        // Contact validity: no charge happens for invalid recipients
        let contact = match self.db.get_contact(job.contact_id).await {
            Ok(Some(contact)) if contact.deleted_at.is_none() => contact,
            Ok(_) => return self.finish(&job, Outcome::Failed("Contact not found".into())).await,
            Err(e) => return Err(handler_err(e)),
        };

        if contact.opted_out {
            return self.finish(&job, Outcome::Skipped("Contact opted out")).await;
        }
        if contact.is_block {
            return self.finish(&job, Outcome::Skipped("Contact blocked")).await;
        }

        let user = match self.db.get_user(job.user_id).await {
            Ok(Some(user)) => user,
            Ok(None) => return self.finish(&job, Outcome::Failed("User not found".into())).await,
            Err(e) => return Err(handler_err(e)),
        };

        if !user.messaging_active() {
            return self
                .finish(&job, Outcome::Failed("Messaging disabled for user".into()))
                .await;
        }

        let from_number = match self.resolve_sender(&job, &user).await {
            Ok(Some(from)) => from,
            Ok(None) => {
                return self
                    .finish(&job, Outcome::Failed("No active sending number".into()))
                    .await
            }
            Err(e) => return Err(handler_err(e)),
        };

        // Credit reservation. The pre-check avoids pointless work; the row
        // lock inside deduct resolves the race.
        let cost = job.credit_cost.unwrap_or(Decimal::ONE);

        match self.ledger.has_enough_credits(job.user_id, cost).await {
            Ok(true) => {}
            Ok(false) => {
                return self
                    .finish(&job, Outcome::Failed("Insufficient credits".into()))
                    .await
            }
            Err(e) => return Err(handler_err(e)),
        }

        match self
            .ledger
            .deduct(
                job.user_id,
                cost,
                &format!("Drip send to {}", job.to_number),
                "drip_sms",
                job.drip_id,
            )
            .await
        {
            Ok(_) => {}
            Err(LedgerError::InsufficientCredits { .. }) => {
                return self
                    .finish(&job, Outcome::Failed("Insufficient credits".into()))
                    .await
            }
            Err(e) => return Err(handler_err(e)),
        }

        // Past this point the user has paid: any error path must refund
        // before the message is acked.
        let outcome = match self.send_and_record(&job, &contact, &user, &from_number, cost).await {
            Ok(outcome) => outcome,
            Err(e) => {
                self.refund(&job, cost, &format!("Send error: {}", e)).await;
                Outcome::Failed(format!("Send error: {}", e))
            }
        };

        self.finish(&job, outcome).await
    }

    /// Steps 7–12: pace, personalize, send, reconcile storage
    async fn send_and_record(
        &self,
        job: &DripSendJob,
        contact: &Contact,
        user: &User,
        from_number: &str,
        cost: Decimal,
    ) -> Result<Outcome, Box<dyn std::error::Error + Send + Sync>> {
        if !self.send_delay.is_zero() {
            tokio::time::sleep(self.send_delay).await;
        }
        self.bucket.acquire().await;

        let campaign = self
            .db
            .get_campaign_name(job.campaign_id)
            .await
            .unwrap_or(None);

        let vars = TemplateVars {
            first: contact.first_name.clone(),
            name: contact.full_name(),
            phone: Some(contact.phone.clone()),
            email: contact.email.clone(),
            campaign,
        };
        let body = personalize(&job.message, &vars);

        let b_ref = mint_b_ref();
        let uid = Uuid::new_v4().to_string();

        let credentials = match (&user.provider_account_id, &user.provider_auth_token) {
            (Some(sid), Some(token)) => Some(Credentials {
                account_sid: sid.clone(),
                auth_token: token.clone(),
            }),
            _ => None,
        };

        let status_callback = self
            .status_callback_url
            .as_ref()
            .map(|base| format!("{}?bRef={}", base, b_ref));

        let result = self
            .gateway
            .send(SendRequest {
                from: from_number.to_string(),
                to: job.to_number.clone(),
                body: body.clone(),
                media_url: job.media_url.clone(),
                status_callback,
                credentials,
            })
            .await;

        if !result.success {
            let provider_error = result
                .error_message
                .unwrap_or_else(|| "Unknown gateway error".to_string());
            let reason = match result.error_code {
                Some(code) => format!("Gateway error {}: {}", code, provider_error),
                None => format!("Gateway error: {}", provider_error),
            };

            self.refund(job, cost, &reason).await;
            return Ok(Outcome::Failed(reason));
        }

        let sid = result
            .provider_message_id
            .unwrap_or_default();
        let delivery_status = result.status.as_deref().unwrap_or("sent");

        // Written in a single statement immediately after the gateway call so
        // the idempotency key is durable before any other bookkeeping
        let message = self
            .db
            .insert_outbound_message(NewOutboundMessage {
                uid: &uid,
                b_ref: &b_ref,
                provider_message_id: Some(&sid),
                from_number,
                to_number: &job.to_number,
                body: &body,
                media_url: job.media_url.as_deref(),
                status: coarse::SENT,
                delivery_status: Some(delivery_status),
                is_drip: true,
                drip_id: Some(job.drip_id),
                user_id: job.user_id,
                workspace_id: job.workspace_id,
                contact_id: job.contact_id,
                message_type: if job.media_url.is_some() {
                    storage::models::message_type::MMS
                } else {
                    storage::models::message_type::SMS
                },
                is_charged: true,
            })
            .await?;

        self.db
            .mark_scheduled_sent(job.scheduled_message_id, message.id, &sid)
            .await?;
        self.db
            .mark_drip_contact_sent(job.drip_contact_id, message.id, &b_ref)
            .await?;
        self.db
            .touch_contact_last_message(contact.id, &body)
            .await?;

        info!(
            "✅ Drip {} sent to {} (message {}, provider {})",
            job.drip_id, job.to_number, message.id, sid
        );

        self.webhooks
            .clone()
            .publish_event_nonblocking(
                job.user_id,
                job.workspace_id,
                events::OUTBOUND_MESSAGE,
                json!({
                    "message_id": message.id,
                    "uid": uid,
                    "b_ref": b_ref,
                    "provider_message_id": sid,
                    "from_number": from_number,
                    "to_number": job.to_number,
                    "body": body,
                    "drip_id": job.drip_id,
                    "campaign_id": job.campaign_id,
                    "contact_id": job.contact_id,
                }),
            )
            .await;

        Ok(Outcome::Sent)
    }

    /// Prefer the enrollment's pinned number, fall back to any active number
    async fn resolve_sender(
        &self,
        job: &DripSendJob,
        user: &User,
    ) -> storage::Result<Option<String>> {
        if let Some(from) = &job.from_number {
            let digits = digits_only(from);
            if !digits.is_empty() {
                if let Some(number) = self
                    .db
                    .find_user_number_by_digits(user.id, &digits)
                    .await?
                {
                    return Ok(Some(number.phone));
                }
            }
        }

        Ok(self
            .db
            .active_number_for_user(user.id)
            .await?
            .map(|n| n.phone))
    }

    async fn refund(&self, job: &DripSendJob, cost: Decimal, reason: &str) {
        if let Err(e) = self
            .ledger
            .refund(
                job.user_id,
                cost,
                &format!("Refund: {}", reason),
                "drip_sms",
                job.drip_id,
            )
            .await
        {
            // The debit stands without its refund; surfaced loudly for ops
            warn!(
                "Refund failed for drip {} (user {}): {}",
                job.drip_id, job.user_id, e
            );
        }
    }

    /// Write the terminal outcome and ack
    async fn finish(&self, job: &DripSendJob, outcome: Outcome) -> message_bus::Result<()> {
        match &outcome {
            Outcome::Sent | Outcome::Duplicate => {}
            Outcome::Skipped(reason) => {
                warn!(
                    "Drip {} to contact {} skipped: {}",
                    job.drip_id, job.contact_id, reason
                );
                self.db
                    .mark_scheduled_failed(job.scheduled_message_id, reason)
                    .await
                    .map_err(handler_err)?;
                self.db
                    .mark_drip_contact_skipped(job.drip_contact_id, reason)
                    .await
                    .map_err(handler_err)?;
            }
            Outcome::Failed(reason) => {
                warn!(
                    "Drip {} to contact {} failed: {}",
                    job.drip_id, job.contact_id, reason
                );
                self.db
                    .mark_scheduled_failed(job.scheduled_message_id, reason)
                    .await
                    .map_err(handler_err)?;
                self.db
                    .mark_drip_contact_failed(job.drip_contact_id, reason)
                    .await
                    .map_err(handler_err)?;
            }
        }

        record(outcome);
        Ok(())
    }
}

#[async_trait]
impl JobHandler for DripDispatcher {
    async fn handle(&self, delivery: Delivery) -> message_bus::Result<()> {
        let job: DripSendJob = delivery.parse()?;
        self.process(job).await
    }
}

fn record(outcome: Outcome) {
    let label = match outcome {
        Outcome::Sent => "sent",
        Outcome::Duplicate => "duplicate",
        Outcome::Skipped(_) => "skipped",
        Outcome::Failed(_) => "failed",
    };
    DISPATCH_OUTCOME_TOTAL.with_label_values(&[label]).inc();
}

fn handler_err(e: impl std::fmt::Display) -> message_bus::Error {
    message_bus::Error::Handler(e.to_string())
}

/// Tracking token minted per send: `DM-<ms>-<6 random digits>`
pub fn mint_b_ref() -> String {
    let millis = chrono::Utc::now().timestamp_millis();
    let salt: u32 = rand::thread_rng().gen_range(0..1_000_000);
    format!("DM-{}-{:06}", millis, salt)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_b_ref_format() {
        let b_ref = mint_b_ref();
        let parts: Vec<&str> = b_ref.split('-').collect();

        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "DM");
        assert!(parts[1].parse::<i64>().is_ok());
        assert_eq!(parts[2].len(), 6);
        assert!(parts[2].chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn test_b_refs_are_distinct() {
        let a = mint_b_ref();
        let b = mint_b_ref();
        // Same millisecond is likely; the random salt still separates them
        assert_ne!(a, b);
    }
}
