//! Broker topology shared by every worker
//!
//! Two logical domains share one connection:
//! - `inbox` — direct sends, inbound messages, provider status callbacks,
//!   internal notifications and webhook deliveries
//! - `drip` — scheduled sends promoted from storage by the pre-queue worker
//!
//! Each domain is a JetStream stream; every logical queue is a subject under
//! its stream consumed by a durable pull consumer. Messages that exhaust the
//! retry budget are copied to the domain's failed stream (7-day retention).

use crate::{client::NatsClient, Error, Result};
use async_nats::jetstream::stream::Config as StreamConfig;
use std::time::Duration;
use tracing::info;

/// Stream holding the inbox domain subjects
pub const INBOX_STREAM: &str = "SENGINE-INBOX";

/// Stream holding the drip domain subjects
pub const DRIP_STREAM: &str = "SENGINE-DRIP";

/// Failed-message stream for the inbox domain
pub const INBOX_FAILED_STREAM: &str = "SENGINE-INBOX-FAILED";

/// Failed-message stream for the drip domain
pub const DRIP_FAILED_STREAM: &str = "SENGINE-DRIP-FAILED";

const DAY: Duration = Duration::from_secs(24 * 60 * 60);

/// Logical queues of the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Queue {
    /// Direct (non-drip) outbound sends
    InboxSend,
    /// Inbound messages received by the provider
    InboxInbound,
    /// Provider delivery-status callbacks
    InboxStatus,
    /// Internal notifications (chat updates, unread counts)
    InboxNotify,
    /// Webhook delivery jobs
    InboxWebhook,
    /// Scheduled drip sends
    DripMessages,
}

impl Queue {
    /// All consumable queues, in supervisor start order
    pub const ALL: [Queue; 6] = [
        Queue::InboxSend,
        Queue::InboxInbound,
        Queue::InboxStatus,
        Queue::InboxNotify,
        Queue::InboxWebhook,
        Queue::DripMessages,
    ];

    /// Subject the queue is bound to
    pub fn subject(&self) -> &'static str {
        match self {
            Queue::InboxSend => "sengine.inbox.send",
            Queue::InboxInbound => "sengine.inbox.inbound",
            Queue::InboxStatus => "sengine.inbox.status",
            Queue::InboxNotify => "sengine.inbox.notify",
            Queue::InboxWebhook => "sengine.inbox.webhook",
            Queue::DripMessages => "sengine.drip.send",
        }
    }

    /// Stream the queue lives in
    pub fn stream_name(&self) -> &'static str {
        match self {
            Queue::DripMessages => DRIP_STREAM,
            _ => INBOX_STREAM,
        }
    }

    /// Durable consumer name
    pub fn durable_name(&self) -> &'static str {
        match self {
            Queue::InboxSend => "sengine-inbox-send",
            Queue::InboxInbound => "sengine-inbox-inbound",
            Queue::InboxStatus => "sengine-inbox-status",
            Queue::InboxNotify => "sengine-inbox-notify",
            Queue::InboxWebhook => "sengine-inbox-webhook",
            Queue::DripMessages => "sengine-drip-messages",
        }
    }

    /// Failed stream that exhausted messages are copied to, if any.
    ///
    /// Notifications are fire-and-forget and have no dead-letter path.
    pub fn failed_stream(&self) -> Option<&'static str> {
        match self {
            Queue::InboxNotify => None,
            Queue::DripMessages => Some(DRIP_FAILED_STREAM),
            _ => Some(INBOX_FAILED_STREAM),
        }
    }

    /// Subject failed messages are published on
    pub fn failed_subject(&self) -> &'static str {
        match self {
            Queue::DripMessages => "sengine.drip.failed",
            _ => "sengine.inbox.failed",
        }
    }
}

impl std::fmt::Display for Queue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Queue::InboxSend => "inbox.send",
            Queue::InboxInbound => "inbox.inbound",
            Queue::InboxStatus => "inbox.status",
            Queue::InboxNotify => "inbox.notify",
            Queue::InboxWebhook => "inbox.webhook",
            Queue::DripMessages => "drip.messages",
        };
        f.write_str(name)
    }
}

fn stream_config(name: &str, subjects: Vec<String>, max_age: Duration) -> StreamConfig {
    StreamConfig {
        name: name.to_string(),
        subjects,
        max_age,
        retention: async_nats::jetstream::stream::RetentionPolicy::Limits,
        storage: async_nats::jetstream::stream::StorageType::File,
        num_replicas: 1,
        ..Default::default()
    }
}

/// Declare all streams.
///
/// Idempotent: existing streams are left as they are. Consumers are declared
/// lazily by [`crate::Subscriber`] so a publisher-only process does not create
/// consumer state.
pub async fn declare(client: &NatsClient) -> Result<()> {
    let js = client.jetstream().await?;

    // Subjects are enumerated explicitly: JetStream rejects streams with
    // overlapping interest, and the failed subjects live in their own streams.
    let inbox_subjects = [
        Queue::InboxSend,
        Queue::InboxInbound,
        Queue::InboxStatus,
        Queue::InboxNotify,
        Queue::InboxWebhook,
    ]
    .iter()
    .map(|q| q.subject().to_string())
    .collect();

    let streams = [
        stream_config(INBOX_STREAM, inbox_subjects, DAY),
        stream_config(
            DRIP_STREAM,
            vec!["sengine.drip.send".to_string()],
            Duration::from_secs(60 * 60),
        ),
        stream_config(
            INBOX_FAILED_STREAM,
            vec!["sengine.inbox.failed".to_string()],
            7 * DAY,
        ),
        stream_config(
            DRIP_FAILED_STREAM,
            vec!["sengine.drip.failed".to_string()],
            7 * DAY,
        ),
    ];

    for config in streams {
        let name = config.name.clone();
        match js.get_stream(&name).await {
            Ok(_) => info!("Using existing stream: {}", name),
            Err(_) => {
                info!("Creating stream: {}", name);
                js.create_stream(config)
                    .await
                    .map_err(|e| Error::JetStream(e.to_string()))?;
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_subjects_are_distinct() {
        let mut subjects: Vec<&str> = Queue::ALL.iter().map(|q| q.subject()).collect();
        subjects.sort();
        subjects.dedup();
        assert_eq!(subjects.len(), Queue::ALL.len());
    }

    #[test]
    fn test_drip_queue_routes_to_drip_failed() {
        assert_eq!(Queue::DripMessages.stream_name(), DRIP_STREAM);
        assert_eq!(Queue::DripMessages.failed_stream(), Some(DRIP_FAILED_STREAM));
        assert_eq!(Queue::DripMessages.failed_subject(), "sengine.drip.failed");
    }

    #[test]
    fn test_notify_has_no_dead_letter_path() {
        assert_eq!(Queue::InboxNotify.failed_stream(), None);
    }
}
