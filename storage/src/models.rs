//! Row models for the messaging tables

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Scheduled message lifecycle.
///
/// Status is monotone along Pending → Queued → Sending → Sent → Delivered.
/// Failed is reachable from any non-terminal state; Cancelled only from
/// Pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[repr(i16)]
pub enum ScheduledStatus {
    Pending = 0,
    Queued = 1,
    Sending = 2,
    Sent = 3,
    Delivered = 4,
    Failed = 5,
    Cancelled = 6,
}

impl ScheduledStatus {
    /// Terminal states never transition again
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ScheduledStatus::Delivered | ScheduledStatus::Failed | ScheduledStatus::Cancelled
        )
    }
}

impl TryFrom<i16> for ScheduledStatus {
    type Error = i16;

    fn try_from(code: i16) -> Result<Self, i16> {
        match code {
            0 => Ok(ScheduledStatus::Pending),
            1 => Ok(ScheduledStatus::Queued),
            2 => Ok(ScheduledStatus::Sending),
            3 => Ok(ScheduledStatus::Sent),
            4 => Ok(ScheduledStatus::Delivered),
            5 => Ok(ScheduledStatus::Failed),
            6 => Ok(ScheduledStatus::Cancelled),
            other => Err(other),
        }
    }
}

/// Per-enrollment tracking row status (codes owned by the upstream API)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[repr(i16)]
pub enum DripContactStatus {
    Pending = 0,
    Sent = 1,
    Delivered = 2,
    Failed = 3,
    Skipped = 4,
    Cancelled = 5,
}

/// Message direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Outbound,
    Inbound,
}

/// Pre-queue work item
#[derive(Debug, Clone, FromRow)]
pub struct ScheduledMessage {
    pub id: i64,
    pub user_id: i64,
    pub workspace_id: i64,
    pub contact_id: i64,
    pub drip_id: i64,
    pub campaign_id: i64,
    pub drip_contact_id: i64,
    pub from_number: Option<String>,
    pub to_number: String,
    pub body: String,
    pub media_url: Option<String>,
    pub scheduled_at: DateTime<Utc>,
    pub status: i16,
    pub retry_count: i32,
    pub queued_at: Option<DateTime<Utc>>,
    pub sent_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub message_id: Option<i64>,
    pub provider_message_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ScheduledMessage {
    /// Typed view of the raw status code
    pub fn scheduled_status(&self) -> crate::Result<ScheduledStatus> {
        ScheduledStatus::try_from(self.status).map_err(|code| crate::Error::InvalidStatus {
            entity: "scheduled_message",
            code,
        })
    }
}

/// Per-enrollment tracking row
#[derive(Debug, Clone, FromRow)]
pub struct DripContact {
    pub id: i64,
    pub drip_id: i64,
    pub campaign_id: i64,
    pub contact_id: i64,
    pub user_id: i64,
    pub status: i16,
    pub sent_at: Option<DateTime<Utc>>,
    pub message_id: Option<i64>,
    pub b_ref: Option<String>,
    pub error_message: Option<String>,
}

/// Permanent record of one transmission
#[derive(Debug, Clone, FromRow)]
pub struct Message {
    pub id: i64,
    pub uid: String,
    pub b_ref: Option<String>,
    pub provider_message_id: Option<String>,
    pub from_number: Option<String>,
    pub to_number: String,
    pub body: String,
    pub media_url: Option<String>,
    pub status: i16,
    pub delivery_status: Option<String>,
    pub direction: Direction,
    pub is_drip: bool,
    pub drip_id: Option<i64>,
    pub user_id: i64,
    pub workspace_id: i64,
    pub contact_id: i64,
    pub message_type: i16,
    pub is_charged: bool,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Message type codes
pub mod message_type {
    /// Plain SMS
    pub const SMS: i16 = 1;
    /// Media message
    pub const MMS: i16 = 2;
}

/// Contact owned by a user/workspace
#[derive(Debug, Clone, FromRow)]
pub struct Contact {
    pub id: i64,
    pub user_id: i64,
    pub workspace_id: i64,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: String,
    pub opted_out: bool,
    pub is_block: bool,
    pub last_message: Option<String>,
    pub open_chat: bool,
    pub archive: bool,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Contact {
    /// Full display name, when any part is present
    pub fn full_name(&self) -> Option<String> {
        match (self.first_name.as_deref(), self.last_name.as_deref()) {
            (Some(f), Some(l)) => Some(format!("{} {}", f, l)),
            (Some(f), None) => Some(f.to_string()),
            (None, Some(l)) => Some(l.to_string()),
            (None, None) => None,
        }
    }
}

/// Provisioned sending number
#[derive(Debug, Clone, FromRow)]
pub struct UserNumber {
    pub id: i64,
    pub user_id: i64,
    pub phone: String,
    pub status: String,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Platform user
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: i64,
    pub workspace_id: i64,
    pub provider_account_id: Option<String>,
    pub provider_auth_token: Option<String>,
    pub messaging_status: String,
}

impl User {
    /// Whether outbound messaging is enabled for this user
    pub fn messaging_active(&self) -> bool {
        self.messaging_status == "active"
    }
}

/// Live credit balance
#[derive(Debug, Clone, FromRow)]
pub struct UserCredits {
    pub user_id: i64,
    pub balance: Decimal,
    pub total_spent: Decimal,
    pub updated_at: DateTime<Utc>,
}

/// Campaign row (name only; definitions live upstream)
#[derive(Debug, Clone, FromRow)]
pub struct Campaign {
    pub id: i64,
    pub name: String,
}

/// User-facing webhook subscription
#[derive(Debug, Clone, FromRow)]
pub struct Webhook {
    pub id: i64,
    pub user_id: i64,
    pub workspace_id: i64,
    pub url: String,
    pub secret: String,
    pub events: Vec<String>,
    pub status: String,
    pub failure_count: i32,
    pub last_triggered_at: Option<DateTime<Utc>>,
}

/// Immutable webhook attempt log
#[derive(Debug, Clone, FromRow)]
pub struct WebhookDelivery {
    pub id: i64,
    pub webhook_id: i64,
    pub event_id: String,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub status: String,
    pub response_status: Option<i32>,
    pub response_body: Option<String>,
    pub error_message: Option<String>,
    pub duration_ms: Option<i64>,
    pub attempted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Deny-list membership per (user, normalized phone)
#[derive(Debug, Clone, FromRow)]
pub struct OptOutEntry {
    pub id: i64,
    pub user_id: i64,
    pub phone: String,
    pub created_at: DateTime<Utc>,
}
