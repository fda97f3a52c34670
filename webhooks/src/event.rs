//! Webhook event envelope and tags

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Event tags users can subscribe to
pub mod events {
    /// Outbound message accepted by the gateway
    pub const OUTBOUND_MESSAGE: &str = "outbound_message";
    /// Provider confirmed delivery
    pub const MESSAGE_DELIVERED: &str = "message.delivered";
    /// Provider reported failure or non-delivery
    pub const MESSAGE_FAILED: &str = "message.failed";
    /// Inbound message received
    pub const MESSAGE_INBOUND: &str = "message.inbound";
    /// Contact opted out
    pub const CONTACT_OPTOUT: &str = "contact.optout";
    /// Contact opted back in
    pub const CONTACT_OPTIN: &str = "contact.optin";
}

/// The body POSTed to subscriber endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEvent {
    pub event_id: String,
    pub event: String,
    pub timestamp: DateTime<Utc>,
    pub data: serde_json::Value,
}

impl WebhookEvent {
    /// Build an event with a fresh globally-unique id
    pub fn new(event: &str, data: serde_json::Value) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            event: event.to_string(),
            timestamp: Utc::now(),
            data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_ids_are_unique() {
        let a = WebhookEvent::new(events::MESSAGE_DELIVERED, json!({}));
        let b = WebhookEvent::new(events::MESSAGE_DELIVERED, json!({}));
        assert_ne!(a.event_id, b.event_id);
    }

    #[test]
    fn test_event_body_shape() {
        let event = WebhookEvent::new(events::CONTACT_OPTOUT, json!({"contact_id": 7}));
        let value = serde_json::to_value(&event).unwrap();

        assert!(value["event_id"].is_string());
        assert_eq!(value["event"], "contact.optout");
        assert!(value["timestamp"].is_string());
        assert_eq!(value["data"]["contact_id"], 7);
    }
}
