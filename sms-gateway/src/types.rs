//! Gateway request/response types

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Gateway account credentials
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub account_sid: String,
    pub auth_token: String,
}

/// One outbound send
#[derive(Debug, Clone)]
pub struct SendRequest {
    pub from: String,
    pub to: String,
    pub body: String,
    pub media_url: Option<String>,
    /// Callback URL the provider posts delivery updates to
    pub status_callback: Option<String>,
    /// Tenant credentials; `None` uses the process defaults
    pub credentials: Option<Credentials>,
}

/// Normalized gateway outcome.
///
/// `success = false` carries the error fields; no call path returns an `Err`.
#[derive(Debug, Clone, Default)]
pub struct SendResult {
    pub success: bool,
    pub provider_message_id: Option<String>,
    pub status: Option<String>,
    pub segment_count: u32,
    pub media_count: u32,
    pub date_created: Option<DateTime<Utc>>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
}

impl SendResult {
    /// Failure with populated error fields
    pub fn failure(code: Option<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            error_code: code,
            error_message: Some(message.into()),
            ..Default::default()
        }
    }
}

/// Gateway seam; mocked in dispatcher tests
#[async_trait]
pub trait SmsSender: Send + Sync {
    /// Send one message. Errors are normalized into the result.
    async fn send(&self, request: SendRequest) -> SendResult;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_constructor_populates_error_fields() {
        let result = SendResult::failure(Some("21610".to_string()), "Unsubscribed recipient");
        assert!(!result.success);
        assert_eq!(result.error_code.as_deref(), Some("21610"));
        assert_eq!(result.error_message.as_deref(), Some("Unsubscribed recipient"));
        assert!(result.provider_message_id.is_none());
    }
}
