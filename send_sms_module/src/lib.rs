use std::env;
use std::time::Duration;

use reqwest::StatusCode;
use serde::Serialize;
use tracing::{info, warn};

pub const DEFAULT_SMS_API_URL: &str = "https://test.sms.com/api/services/sendsms/";
pub const DEFAULT_SMS_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, thiserror::Error)]
pub enum SendSmsError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("http error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("sms gateway returned {status}: {body}")]
    Status { status: u16, body: String },
}

/// Connection settings for the bulk SMS gateway.
#[derive(Debug, Clone)]
pub struct SmsGatewayConfig {
    pub api_url: String,
    pub api_key: String,
    pub partner_id: String,
    pub shortcode: String,
    /// Upper bound for a single gateway request, connect included.
    pub timeout: Duration,
}

impl SmsGatewayConfig {
    pub fn from_env() -> Result<Self, SendSmsError> {
        dotenvy::dotenv().ok();

        let api_url = env_var_non_empty("SMS_API_URL")
            .unwrap_or_else(|| DEFAULT_SMS_API_URL.to_string());
        let api_key = require_env("SMS_API_KEY")?;
        let partner_id = require_env("SMS_PARTNER_ID")?;
        let shortcode = require_env("SMS_SHORTCODE")?;
        let timeout = env::var("SMS_TIMEOUT_SECS")
            .ok()
            .and_then(|value| value.trim().parse::<u64>().ok())
            .filter(|value| *value > 0)
            .map(Duration::from_secs)
            .unwrap_or_else(|| Duration::from_secs(DEFAULT_SMS_TIMEOUT_SECS));

        Ok(Self {
            api_url,
            api_key,
            partner_id,
            shortcode,
            timeout,
        })
    }
}

#[derive(Debug, Serialize)]
struct SendSmsRequest<'a> {
    apikey: &'a str,
    #[serde(rename = "partnerID")]
    partner_id: &'a str,
    mobile: &'a str,
    message: &'a str,
    shortcode: &'a str,
    pass_type: &'static str,
}

#[derive(Debug, Clone)]
pub struct SmsReceipt {
    pub status: u16,
    pub body: String,
}

/// Outcome of an audited send: never an error, always a human-readable detail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReport {
    pub delivered: bool,
    pub detail: String,
}

/// Stateless gateway client. Each call builds its own HTTP client, so nothing
/// carries over between sends and the client can be shared across threads.
#[derive(Debug, Clone)]
pub struct SmsGatewayClient {
    config: SmsGatewayConfig,
}

impl SmsGatewayClient {
    pub fn new(config: SmsGatewayConfig) -> Self {
        Self { config }
    }

    pub fn from_env() -> Result<Self, SendSmsError> {
        Ok(Self::new(SmsGatewayConfig::from_env()?))
    }

    pub fn config(&self) -> &SmsGatewayConfig {
        &self.config
    }

    pub fn send_sms(&self, mobile: &str, message: &str) -> Result<SmsReceipt, SendSmsError> {
        let mobile = mobile.trim();
        if mobile.is_empty() {
            return Err(SendSmsError::InvalidRequest(
                "mobile number missing".to_string(),
            ));
        }

        let client = reqwest::blocking::Client::builder()
            .timeout(self.config.timeout)
            .build()?;
        let payload = SendSmsRequest {
            apikey: &self.config.api_key,
            partner_id: &self.config.partner_id,
            mobile,
            message,
            shortcode: &self.config.shortcode,
            pass_type: "plain",
        };
        let response = client.post(&self.config.api_url).json(&payload).send()?;

        let status = response.status();
        let body = response.text().unwrap_or_default();
        if status != StatusCode::OK {
            return Err(SendSmsError::Status {
                status: status.as_u16(),
                body,
            });
        }

        info!("sms gateway accepted message to {}", mobile);
        Ok(SmsReceipt {
            status: status.as_u16(),
            body,
        })
    }

    /// Boolean form of [`send_sms`](Self::send_sms): any failure maps to `false`.
    pub fn send(&self, mobile: &str, message: &str) -> bool {
        match self.send_sms(mobile, message) {
            Ok(_) => true,
            Err(err) => {
                warn!("sms send to {} failed: {}", mobile, err);
                false
            }
        }
    }

    pub fn send_with_report(&self, mobile: &str, message: &str) -> DeliveryReport {
        match self.send_sms(mobile, message) {
            Ok(receipt) => DeliveryReport {
                delivered: true,
                detail: success_detail(&receipt),
            },
            Err(err) => {
                warn!("sms send to {} failed: {}", mobile, err);
                DeliveryReport {
                    delivered: false,
                    detail: err.to_string(),
                }
            }
        }
    }
}

fn success_detail(receipt: &SmsReceipt) -> String {
    let body = receipt.body.trim();
    if body.is_empty() {
        "SMS sent successfully".to_string()
    } else {
        format!("SMS sent successfully: {}", body)
    }
}

fn env_var_non_empty(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn require_env(key: &str) -> Result<String, SendSmsError> {
    env_var_non_empty(key).ok_or_else(|| SendSmsError::Config(format!("{} not set", key)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_body_uses_gateway_field_names() {
        let payload = SendSmsRequest {
            apikey: "key",
            partner_id: "42",
            mobile: "+254700000000",
            message: "hello",
            shortcode: "CLINIC",
            pass_type: "plain",
        };
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["apikey"], "key");
        assert_eq!(value["partnerID"], "42");
        assert_eq!(value["mobile"], "+254700000000");
        assert_eq!(value["message"], "hello");
        assert_eq!(value["shortcode"], "CLINIC");
        assert_eq!(value["pass_type"], "plain");
        assert!(value.get("partner_id").is_none());
    }

    #[test]
    fn blank_mobile_is_rejected_before_any_request() {
        let client = SmsGatewayClient::new(SmsGatewayConfig {
            api_url: "http://127.0.0.1:1/never".to_string(),
            api_key: "key".to_string(),
            partner_id: "1".to_string(),
            shortcode: "CLINIC".to_string(),
            timeout: Duration::from_secs(1),
        });
        let err = client.send_sms("   ", "hello").unwrap_err();
        assert!(matches!(err, SendSmsError::InvalidRequest(_)));
        assert!(!client.send("", "hello"));
    }

    #[test]
    fn success_detail_includes_gateway_body() {
        let receipt = SmsReceipt {
            status: 200,
            body: "{\"responses\":[]}".to_string(),
        };
        assert_eq!(
            success_detail(&receipt),
            "SMS sent successfully: {\"responses\":[]}"
        );
        let empty = SmsReceipt {
            status: 200,
            body: "  ".to_string(),
        };
        assert_eq!(success_detail(&empty), "SMS sent successfully");
    }
}
