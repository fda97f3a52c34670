//! Wire payloads carried by the broker
//!
//! Field names are camelCase on the wire; the upstream API publishes the same
//! shapes. Every payload is plain JSON — a message that fails to parse is
//! terminated by the consumer, never redelivered.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Scheduled drip send, published by the pre-queue worker on `drip.messages`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DripSendJob {
    pub scheduled_message_id: i64,
    pub drip_contact_id: i64,
    pub user_id: i64,
    pub workspace_id: i64,
    pub contact_id: i64,
    pub drip_id: i64,
    pub campaign_id: i64,
    pub from_number: Option<String>,
    pub to_number: String,
    /// Sender-number id from the enrollment, when one was pinned
    pub sid: Option<i64>,
    pub message: String,
    pub media_url: Option<String>,
    pub scheduled_at: DateTime<Utc>,
    pub queued_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_load_test: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credit_cost: Option<Decimal>,
}

/// Envelope on `inbox.send`: `{ type: "SEND_SMS", retryCount, data: {..} }`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum InboxSendJob {
    #[serde(rename = "SEND_SMS")]
    SendSms {
        #[serde(rename = "retryCount", default)]
        retry_count: u32,
        data: SendSmsData,
    },
}

/// Direct send request, created by the upstream API
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendSmsData {
    pub message_id: i64,
    pub b_ref: String,
    pub from_number: String,
    pub to_number: String,
    pub message: String,
    pub media_url: Option<String>,
    pub contact_id: i64,
    pub user_id: i64,
    pub workspace_id: i64,
    pub status_callback_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub twilio_credentials: Option<TwilioCredentials>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_load_test: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credit_cost: Option<Decimal>,
}

/// Tenant-provided gateway credentials, overriding the process defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TwilioCredentials {
    pub account_sid: String,
    pub auth_token: String,
}

/// Provider status callback on `inbox.status`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusCallbackJob {
    pub data: StatusCallbackData,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusCallbackData {
    pub message_sid: String,
    pub status: String,
    pub b_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// Inbound message event on `inbox.inbound`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundSmsJob {
    pub data: InboundSmsData,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundSmsData {
    pub message_sid: String,
    pub from_number: String,
    pub to_number: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub num_media: u32,
    pub media_url: Option<String>,
}

/// Webhook delivery job on `inbox.webhook`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookDeliveryJob {
    pub delivery_id: i64,
    pub webhook_id: i64,
    pub event_id: String,
    pub event: String,
    pub url: String,
    pub secret: String,
    pub payload: serde_json::Value,
}

/// Internal notification on `inbox.notify`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotifyEvent {
    pub event: String,
    pub user_id: i64,
    pub workspace_id: i64,
    pub data: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_drip_send_job_wire_names() {
        let job = DripSendJob {
            scheduled_message_id: 1,
            drip_contact_id: 2,
            user_id: 3,
            workspace_id: 4,
            contact_id: 5,
            drip_id: 6,
            campaign_id: 7,
            from_number: Some("+15551230000".to_string()),
            to_number: "+15551112222".to_string(),
            sid: None,
            message: "hi".to_string(),
            media_url: None,
            scheduled_at: Utc::now(),
            queued_at: Utc::now(),
            is_load_test: false,
            credit_cost: None,
        };

        let value = serde_json::to_value(&job).unwrap();
        assert_eq!(value["scheduledMessageId"], 1);
        assert_eq!(value["dripContactId"], 2);
        assert_eq!(value["toNumber"], "+15551112222");
        // Optional flags stay off the wire when unset
        assert!(value.get("isLoadTest").is_none());
        assert!(value.get("creditCost").is_none());
    }

    #[test]
    fn test_inbox_send_job_envelope_tag() {
        let raw = json!({
            "type": "SEND_SMS",
            "retryCount": 0,
            "data": {
                "messageId": 42,
                "bRef": "DM-1-000001",
                "fromNumber": "+15551230000",
                "toNumber": "+15551112222",
                "message": "hello",
                "mediaUrl": null,
                "contactId": 9,
                "userId": 3,
                "workspaceId": 4,
                "statusCallbackUrl": null
            }
        });

        let job: InboxSendJob = serde_json::from_value(raw).unwrap();
        let InboxSendJob::SendSms { retry_count, data } = job;
        assert_eq!(retry_count, 0);
        assert_eq!(data.message_id, 42);
        assert_eq!(data.b_ref, "DM-1-000001");
    }

    #[test]
    fn test_unknown_envelope_type_is_rejected() {
        let raw = json!({ "type": "SEND_FAX", "retryCount": 0, "data": {} });
        assert!(serde_json::from_value::<InboxSendJob>(raw).is_err());
    }
}
