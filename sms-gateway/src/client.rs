//! HTTP client for the provider's Messages API

use crate::phone::normalize_phone;
use crate::types::{Credentials, SendRequest, SendResult, SmsSender};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{info, warn};

/// Gateway client configuration
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// API base URL
    pub base_url: String,

    /// Process-default credentials
    pub credentials: Credentials,

    /// Request timeout
    pub timeout: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.twilio.com".to_string(),
            credentials: Credentials {
                account_sid: String::new(),
                auth_token: String::new(),
            },
            timeout: Duration::from_secs(10),
        }
    }
}

/// Successful create-message response
#[derive(Debug, Deserialize)]
struct ProviderMessageResponse {
    sid: String,
    status: Option<String>,
    num_segments: Option<String>,
    num_media: Option<String>,
    date_created: Option<String>,
}

/// Error body returned with non-2xx statuses
#[derive(Debug, Deserialize)]
struct ProviderErrorResponse {
    code: Option<i64>,
    message: Option<String>,
}

/// Messages API client
pub struct GatewayClient {
    config: GatewayConfig,
    http: Client,
}

impl GatewayClient {
    /// Build a client with a bounded request timeout
    pub fn new(config: GatewayConfig) -> Self {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .unwrap_or_default();

        Self { config, http }
    }

    fn resolve_credentials<'a>(&'a self, request: &'a SendRequest) -> &'a Credentials {
        request.credentials.as_ref().unwrap_or(&self.config.credentials)
    }
}

#[async_trait]
impl SmsSender for GatewayClient {
    async fn send(&self, request: SendRequest) -> SendResult {
        let creds = self.resolve_credentials(&request);
        let url = format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.config.base_url, creds.account_sid
        );

        let from = normalize_phone(&request.from);
        let to = normalize_phone(&request.to);

        let mut form: Vec<(&str, &str)> = vec![
            ("From", from.as_str()),
            ("To", to.as_str()),
            ("Body", request.body.as_str()),
        ];
        if let Some(media_url) = request.media_url.as_deref() {
            form.push(("MediaUrl", media_url));
        }
        if let Some(callback) = request.status_callback.as_deref() {
            form.push(("StatusCallback", callback));
        }

        let response = match self
            .http
            .post(&url)
            .basic_auth(&creds.account_sid, Some(&creds.auth_token))
            .form(&form)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!("Gateway request failed: {}", e);
                let message = if e.is_timeout() {
                    "Gateway timeout".to_string()
                } else {
                    format!("Gateway network error: {}", e)
                };
                return SendResult::failure(None, message);
            }
        };

        let status = response.status();

        if status.is_success() {
            match response.json::<ProviderMessageResponse>().await {
                Ok(body) => {
                    info!("✅ Gateway accepted message {} → {}", body.sid, to);
                    SendResult {
                        success: true,
                        provider_message_id: Some(body.sid),
                        status: body.status,
                        segment_count: parse_count(body.num_segments.as_deref()),
                        media_count: parse_count(body.num_media.as_deref()),
                        date_created: parse_date(body.date_created.as_deref()),
                        error_code: None,
                        error_message: None,
                    }
                }
                Err(e) => SendResult::failure(None, format!("Malformed gateway response: {}", e)),
            }
        } else {
            let error = response.json::<ProviderErrorResponse>().await.ok();
            let code = error
                .as_ref()
                .and_then(|e| e.code)
                .map(|c| c.to_string());
            let message = error
                .and_then(|e| e.message)
                .unwrap_or_else(|| format!("Gateway returned {}", status));

            warn!("❌ Gateway rejected send to {}: {}", to, message);
            SendResult::failure(code, message)
        }
    }
}

fn parse_count(raw: Option<&str>) -> u32 {
    raw.and_then(|s| s.parse().ok()).unwrap_or(0)
}

fn parse_date(raw: Option<&str>) -> Option<DateTime<Utc>> {
    raw.and_then(|s| DateTime::parse_from_rfc2822(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_count_tolerates_missing_and_bad_values() {
        assert_eq!(parse_count(Some("2")), 2);
        assert_eq!(parse_count(Some("x")), 0);
        assert_eq!(parse_count(None), 0);
    }

    #[test]
    fn test_parse_date_rfc2822() {
        let date = parse_date(Some("Mon, 02 Jun 2025 14:30:00 +0000"));
        assert!(date.is_some());
        assert!(parse_date(Some("not a date")).is_none());
    }

    #[test]
    fn test_tenant_credentials_take_precedence() {
        let client = GatewayClient::new(GatewayConfig {
            credentials: Credentials {
                account_sid: "AC_default".to_string(),
                auth_token: "tok_default".to_string(),
            },
            ..Default::default()
        });

        let request = SendRequest {
            from: "+15550001111".to_string(),
            to: "+15551112222".to_string(),
            body: "hi".to_string(),
            media_url: None,
            status_callback: None,
            credentials: Some(Credentials {
                account_sid: "AC_tenant".to_string(),
                auth_token: "tok_tenant".to_string(),
            }),
        };

        assert_eq!(client.resolve_credentials(&request).account_sid, "AC_tenant");

        let no_override = SendRequest {
            credentials: None,
            ..request
        };
        assert_eq!(
            client.resolve_credentials(&no_override).account_sid,
            "AC_default"
        );
    }
}
