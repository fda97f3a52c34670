//! Inbound ingestor
//!
//! Persists messages arriving from the provider, finds or creates the
//! sending contact, and applies the opt-out/opt-in keyword contract. Keyword
//! matching is exact on the trimmed, lowercased body — "please stop" is a
//! conversation, "STOP" is a legal obligation.

use crate::metrics::INBOUND_OUTCOME_TOTAL;
use async_trait::async_trait;
use message_bus::{
    payload::{InboundSmsData, InboundSmsJob, NotifyEvent},
    Delivery, JobHandler, Publisher, Queue,
};
use serde_json::json;
use sms_gateway::{normalize_phone, phone::digits_only};
use std::sync::Arc;
use storage::models::message_type;
use storage::{queries::messages::NewInboundMessage, Database};
use tracing::{info, warn};
use uuid::Uuid;
use webhooks::{events, WebhookProducer};

const OPT_OUT_KEYWORDS: [&str; 6] = ["stop", "unsubscribe", "cancel", "end", "quit", "stopall"];
const OPT_IN_KEYWORDS: [&str; 4] = ["start", "unstop", "subscribe", "yes"];

/// Keyword classification of an inbound body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeywordAction {
    OptOut,
    OptIn,
    None,
}

/// Classify a body: exact match after trim + lowercase
pub fn classify_body(body: &str) -> KeywordAction {
    let normalized = body.trim().to_lowercase();

    if OPT_OUT_KEYWORDS.contains(&normalized.as_str()) {
        KeywordAction::OptOut
    } else if OPT_IN_KEYWORDS.contains(&normalized.as_str()) {
        KeywordAction::OptIn
    } else {
        KeywordAction::None
    }
}

/// Consumes `inbox.inbound`
pub struct InboundIngestor {
    db: Arc<Database>,
    publisher: Arc<Publisher>,
    webhooks: Arc<WebhookProducer>,
}

impl InboundIngestor {
    /// Wire the ingestor
    pub fn new(db: Arc<Database>, publisher: Arc<Publisher>, webhooks: Arc<WebhookProducer>) -> Self {
        Self {
            db,
            publisher,
            webhooks,
        }
    }

    async fn process(&self, data: InboundSmsData) -> message_bus::Result<()> {
        // Resolve which user owns the receiving number
        let number = match self
            .db
            .find_number_owner(&digits_only(&data.to_number))
            .await
            .map_err(handler_err)?
        {
            Some(number) => number,
            None => {
                warn!(
                    "Inbound to unknown number {}, dropping {}",
                    data.to_number, data.message_sid
                );
                INBOUND_OUTCOME_TOTAL
                    .with_label_values(&["unknown_number"])
                    .inc();
                return Ok(());
            }
        };

        let user = match self.db.get_user(number.user_id).await.map_err(handler_err)? {
            Some(user) => user,
            None => {
                warn!("Number {} owned by missing user {}", number.phone, number.user_id);
                return Ok(());
            }
        };

        // Find or create the sender's contact
        let from_digits = digits_only(&data.from_number);
        let contact = match self
            .db
            .find_contact_by_phone(user.id, user.workspace_id, &from_digits)
            .await
            .map_err(handler_err)?
        {
            Some(contact) => contact,
            None => {
                let normalized = normalize_phone(&data.from_number);
                info!("Creating contact for unknown sender {}", normalized);
                self.db
                    .create_contact(user.id, user.workspace_id, &normalized)
                    .await
                    .map_err(handler_err)?
            }
        };

        // Opt-out/opt-in keywords mutate the contact and the deny-list
        let normalized_phone = normalize_phone(&contact.phone);
        match classify_body(&data.body) {
            KeywordAction::OptOut => {
                self.db
                    .set_contact_opted_out(contact.id, true)
                    .await
                    .map_err(handler_err)?;
                self.db
                    .add_opt_out(user.id, &normalized_phone)
                    .await
                    .map_err(handler_err)?;

                info!("Contact {} opted out", contact.id);
                INBOUND_OUTCOME_TOTAL.with_label_values(&["opt_out"]).inc();

                self.webhooks
                    .clone()
                    .publish_event_nonblocking(
                        user.id,
                        user.workspace_id,
                        events::CONTACT_OPTOUT,
                        json!({ "contact_id": contact.id, "phone": normalized_phone }),
                    )
                    .await;
            }
            KeywordAction::OptIn => {
                self.db
                    .set_contact_opted_out(contact.id, false)
                    .await
                    .map_err(handler_err)?;
                self.db
                    .remove_opt_out(user.id, &normalized_phone)
                    .await
                    .map_err(handler_err)?;

                info!("Contact {} opted back in", contact.id);
                INBOUND_OUTCOME_TOTAL.with_label_values(&["opt_in"]).inc();

                self.webhooks
                    .clone()
                    .publish_event_nonblocking(
                        user.id,
                        user.workspace_id,
                        events::CONTACT_OPTIN,
                        json!({ "contact_id": contact.id, "phone": normalized_phone }),
                    )
                    .await;
            }
            KeywordAction::None => {}
        }

        // Persist the message, unread, classified SMS vs MMS
        let uid = Uuid::new_v4().to_string();
        let message = self
            .db
            .insert_inbound_message(NewInboundMessage {
                uid: &uid,
                provider_message_id: &data.message_sid,
                from_number: &data.from_number,
                to_number: &data.to_number,
                body: &data.body,
                media_url: data.media_url.as_deref(),
                user_id: user.id,
                workspace_id: user.workspace_id,
                contact_id: contact.id,
                message_type: if data.num_media > 0 {
                    message_type::MMS
                } else {
                    message_type::SMS
                },
            })
            .await
            .map_err(handler_err)?;

        self.db
            .touch_contact_last_message(contact.id, &data.body)
            .await
            .map_err(handler_err)?;

        INBOUND_OUTCOME_TOTAL.with_label_values(&["stored"]).inc();
        info!(
            "📥 Inbound {} from {} stored as message {}",
            data.message_sid, data.from_number, message.id
        );

        self.webhooks
            .clone()
            .publish_event_nonblocking(
                user.id,
                user.workspace_id,
                events::MESSAGE_INBOUND,
                json!({
                    "message_id": message.id,
                    "from_number": data.from_number,
                    "to_number": data.to_number,
                    "body": data.body,
                    "contact_id": contact.id,
                    "message_type": if data.num_media > 0 { "mms" } else { "sms" },
                }),
            )
            .await;

        // Internal notification with the recomputed unread count
        let unread = self
            .db
            .unread_count(user.id, user.workspace_id)
            .await
            .unwrap_or(0);

        let notify = NotifyEvent {
            event: "message:new".to_string(),
            user_id: user.id,
            workspace_id: user.workspace_id,
            data: json!({
                "message_id": message.id,
                "contact_id": contact.id,
                "unread_count": unread,
            }),
            timestamp: chrono::Utc::now(),
        };

        if let Err(e) = self
            .publisher
            .publish(Queue::InboxNotify, &notify, None)
            .await
        {
            warn!("Notification publish failed: {}", e);
        }

        Ok(())
    }
}

#[async_trait]
impl JobHandler for InboundIngestor {
    async fn handle(&self, delivery: Delivery) -> message_bus::Result<()> {
        let job: InboundSmsJob = delivery.parse()?;
        self.process(job.data).await
    }
}

fn handler_err(e: impl std::fmt::Display) -> message_bus::Error {
    message_bus::Error::Handler(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opt_out_keywords_exact_match() {
        for keyword in ["stop", "unsubscribe", "cancel", "end", "quit", "stopall"] {
            assert_eq!(classify_body(keyword), KeywordAction::OptOut);
        }
    }

    #[test]
    fn test_opt_in_keywords_exact_match() {
        for keyword in ["start", "unstop", "subscribe", "yes"] {
            assert_eq!(classify_body(keyword), KeywordAction::OptIn);
        }
    }

    #[test]
    fn test_trim_and_case_folding() {
        assert_eq!(classify_body("  STOP  "), KeywordAction::OptOut);
        assert_eq!(classify_body("Start"), KeywordAction::OptIn);
        assert_eq!(classify_body("\tYES\n"), KeywordAction::OptIn);
    }

    #[test]
    fn test_non_exact_bodies_are_conversation() {
        assert_eq!(classify_body("please stop"), KeywordAction::None);
        assert_eq!(classify_body("stopped"), KeywordAction::None);
        assert_eq!(classify_body("yes please"), KeywordAction::None);
        assert_eq!(classify_body(""), KeywordAction::None);
    }
}
