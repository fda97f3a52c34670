//! Signed delivery dispatch
//!
//! POSTs the signed payload with a bounded timeout, records the attempt and
//! updates the parent webhook's failure counter. The broker message is
//! always acked — the deliveries table is the operator-visible history.

use crate::signing::signature_header;
use async_trait::async_trait;
use message_bus::{payload::WebhookDeliveryJob, Delivery, JobHandler};
use reqwest::redirect::Policy;
use std::sync::Arc;
use std::time::{Duration, Instant};
use storage::Database;
use tracing::{error, info, warn};

const USER_AGENT: &str = "Sengine-Webhook/1.0";

/// Response bodies are truncated before they hit the attempt log
const MAX_RESPONSE_BODY: usize = 5000;

/// Dispatcher configuration
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// POST timeout
    pub timeout: Duration,

    /// Max redirects followed
    pub max_redirects: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            max_redirects: 3,
        }
    }
}

/// Consumes `inbox.webhook` and performs deliveries
pub struct WebhookDispatcher {
    db: Arc<Database>,
    http: reqwest::Client,
}

impl WebhookDispatcher {
    /// Build a dispatcher with its own HTTP client
    pub fn new(db: Arc<Database>, config: DispatcherConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .redirect(Policy::limited(config.max_redirects))
            .build()
            .unwrap_or_default();

        Self { db, http }
    }

    async fn deliver(&self, job: &WebhookDeliveryJob) {
        let body = match serde_json::to_vec(&job.payload) {
            Ok(body) => body,
            Err(e) => {
                error!("Unserializable webhook payload for {}: {}", job.event_id, e);
                return;
            }
        };

        let signature = signature_header(job.secret.as_bytes(), &body);
        let started = Instant::now();

        let response = self
            .http
            .post(&job.url)
            .header("Content-Type", "application/json")
            .header("User-Agent", USER_AGENT)
            .header("X-Webhook-Event", &job.event)
            .header("X-Webhook-Delivery", &job.event_id)
            .header("X-Webhook-Signature", &signature)
            .body(body)
            .send()
            .await;

        let duration_ms = started.elapsed().as_millis() as i64;

        match response {
            Ok(response) => {
                let status = response.status();
                let response_body = response.text().await.unwrap_or_default();
                let truncated = truncate(&response_body, MAX_RESPONSE_BODY);

                if status.is_success() {
                    info!(
                        "✅ Webhook {} delivered ({} in {}ms)",
                        job.event_id, status, duration_ms
                    );
                    self.record(job, "success", Some(status.as_u16() as i32), Some(&truncated), None, duration_ms)
                        .await;

                    if let Err(e) = self.db.mark_webhook_success(job.webhook_id).await {
                        error!("Failed to reset webhook {} failures: {}", job.webhook_id, e);
                    }
                } else {
                    warn!(
                        "Webhook {} rejected by endpoint: {} ({}ms)",
                        job.event_id, status, duration_ms
                    );
                    self.record(job, "failed", Some(status.as_u16() as i32), Some(&truncated), None, duration_ms)
                        .await;

                    if let Err(e) = self.db.mark_webhook_failure(job.webhook_id).await {
                        error!("Failed to bump webhook {} failures: {}", job.webhook_id, e);
                    }
                }
            }
            Err(e) => {
                let message = if e.is_timeout() {
                    "Request timed out".to_string()
                } else {
                    e.to_string()
                };
                warn!("Webhook {} POST failed: {}", job.event_id, message);

                self.record(job, "failed", None, None, Some(&message), duration_ms)
                    .await;

                if let Err(db_err) = self.db.mark_webhook_failure(job.webhook_id).await {
                    error!("Failed to bump webhook {} failures: {}", job.webhook_id, db_err);
                }
            }
        }
    }

    async fn record(
        &self,
        job: &WebhookDeliveryJob,
        status: &str,
        response_status: Option<i32>,
        response_body: Option<&str>,
        error_message: Option<&str>,
        duration_ms: i64,
    ) {
        if let Err(e) = self
            .db
            .record_delivery_attempt(
                job.delivery_id,
                status,
                response_status,
                response_body,
                error_message,
                duration_ms,
            )
            .await
        {
            error!("Failed to record webhook attempt {}: {}", job.delivery_id, e);
        }
    }
}

#[async_trait]
impl JobHandler for WebhookDispatcher {
    async fn handle(&self, delivery: Delivery) -> message_bus::Result<()> {
        let job: WebhookDeliveryJob = delivery.parse()?;
        self.deliver(&job).await;
        // Always ack: retries are user-driven from the deliveries table
        Ok(())
    }
}

fn truncate(text: &str, limit: usize) -> String {
    if text.len() <= limit {
        return text.to_string();
    }

    // Cut on a char boundary at or below the limit
    let mut end = limit;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text[..end].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatcher_config_default() {
        let config = DispatcherConfig::default();
        assert_eq!(config.timeout, Duration::from_secs(10));
        assert_eq!(config.max_redirects, 3);
    }

    #[test]
    fn test_truncate_bounds_and_char_safety() {
        assert_eq!(truncate("short", MAX_RESPONSE_BODY), "short");

        let long = "x".repeat(MAX_RESPONSE_BODY + 100);
        assert_eq!(truncate(&long, MAX_RESPONSE_BODY).len(), MAX_RESPONSE_BODY);

        // Multi-byte characters never split
        let emoji = "é".repeat(3000);
        let cut = truncate(&emoji, MAX_RESPONSE_BODY);
        assert!(cut.len() <= MAX_RESPONSE_BODY);
        assert!(cut.chars().all(|c| c == 'é'));
    }
}
