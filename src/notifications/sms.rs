//! SMS/LMS/MMS delivery.
//!
//! [`SolapiTransport`] talks to the SOLAPI messaging API using its HMAC-SHA256
//! request signing. [`LogOnlyTransport`] is used when no credentials are
//! configured (local development).

use std::time::Duration;

use anyhow::{Context, anyhow};
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use hmac::{Hmac, Mac};
use rand::RngCore;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::Sha256;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::SmsConfig;

type HmacSha256 = Hmac<Sha256>;

/// Messages above this many UTF-8 bytes are sent as LMS.
const SMS_MAX_BYTES: usize = 90;
const SEND_PATH: &str = "messages/v4/send";

/// A single outbound message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SmsRequest {
    pub to: String,
    pub message: String,
    pub image_url: Option<String>,
}

impl SmsRequest {
    pub fn text(to: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            message: message.into(),
            image_url: None,
        }
    }
}

/// Provider verdict for one message.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SmsResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SmsResponse {
    pub fn delivered(message_id: Option<String>) -> Self {
        Self {
            success: true,
            message_id,
            error: None,
        }
    }

    pub fn rejected(error: impl Into<String>) -> Self {
        Self {
            success: false,
            message_id: None,
            error: Some(error.into()),
        }
    }
}

/// Outbound message transport.
///
/// Provider-level rejections are reported through [`SmsResponse::success`];
/// `Err` is reserved for transport failures (network, malformed responses).
#[async_trait]
pub trait SmsTransport: Send + Sync {
    async fn send(&self, request: &SmsRequest) -> anyhow::Result<SmsResponse>;
}

/// SOLAPI message type for a text and optional image.
pub fn message_type(text: &str, has_image: bool) -> &'static str {
    if has_image {
        "MMS"
    } else if text.len() <= SMS_MAX_BYTES {
        "SMS"
    } else {
        "LMS"
    }
}

/// `Authorization` header value for a SOLAPI request.
///
/// The signature is the hex HMAC-SHA256 of `date + salt` keyed by the API
/// secret.
pub fn authorization_header(
    api_key: &str,
    api_secret: &str,
    date: &str,
    salt: &str,
) -> anyhow::Result<String> {
    let mut mac = HmacSha256::new_from_slice(api_secret.as_bytes())
        .map_err(|err| anyhow!("invalid SOLAPI secret: {err}"))?;
    mac.update(date.as_bytes());
    mac.update(salt.as_bytes());
    let signature = hex::encode(mac.finalize().into_bytes());

    Ok(format!(
        "HMAC-SHA256 apiKey={api_key}, date={date}, salt={salt}, signature={signature}"
    ))
}

fn random_salt() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SolapiReply {
    #[serde(default)]
    message_id: Option<String>,
    #[serde(default)]
    error_message: Option<String>,
}

/// SOLAPI-backed transport.
pub struct SolapiTransport {
    client: Client,
    endpoint: Url,
    api_key: String,
    api_secret: String,
    sender_number: String,
}

impl SolapiTransport {
    pub fn new(config: &SmsConfig, timeout: Duration) -> anyhow::Result<Self> {
        let (Some(api_key), Some(api_secret), Some(sender_number)) = (
            config.api_key.clone(),
            config.api_secret.clone(),
            config.sender_number.clone(),
        ) else {
            anyhow::bail!("SOLAPI credentials are not configured");
        };

        let endpoint = Url::parse(&format!(
            "{}/{SEND_PATH}",
            config.api_base.trim_end_matches('/')
        ))
        .context("invalid SOLAPI base URL")?;

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build SOLAPI HTTP client")?;

        Ok(Self {
            client,
            endpoint,
            api_key,
            api_secret,
            sender_number,
        })
    }

    fn payload(&self, request: &SmsRequest) -> serde_json::Value {
        let kind = message_type(&request.message, request.image_url.is_some());
        let mut message = json!({
            "to": request.to,
            "from": self.sender_number,
            "text": request.message,
            "type": kind,
        });
        if let Some(image_url) = &request.image_url {
            message["imageUrl"] = json!(image_url);
        }
        json!({ "message": message })
    }
}

#[async_trait]
impl SmsTransport for SolapiTransport {
    async fn send(&self, request: &SmsRequest) -> anyhow::Result<SmsResponse> {
        let date = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        let authorization =
            authorization_header(&self.api_key, &self.api_secret, &date, &random_salt())?;

        debug!(
            to = %request.to,
            bytes = request.message.len(),
            kind = message_type(&request.message, request.image_url.is_some()),
            "Sending message via SOLAPI"
        );

        let response = self
            .client
            .post(self.endpoint.clone())
            .header(reqwest::header::AUTHORIZATION, authorization)
            .json(&self.payload(request))
            .send()
            .await
            .context("SOLAPI request failed")?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let reply: Option<SolapiReply> = serde_json::from_str(&body).ok();

        if status.is_success() {
            Ok(SmsResponse::delivered(reply.and_then(|r| r.message_id)))
        } else {
            let reason = reply
                .and_then(|r| r.error_message)
                .unwrap_or_else(|| format!("HTTP {status}"));
            warn!(to = %request.to, status = %status, reason = %reason, "SOLAPI rejected message");
            Ok(SmsResponse::rejected(reason))
        }
    }
}

/// Transport that only logs messages. Every send succeeds.
#[derive(Debug, Default, Clone)]
pub struct LogOnlyTransport;

#[async_trait]
impl SmsTransport for LogOnlyTransport {
    async fn send(&self, request: &SmsRequest) -> anyhow::Result<SmsResponse> {
        info!(
            to = %request.to,
            kind = message_type(&request.message, request.image_url.is_some()),
            message = %request.message,
            "SMS delivery disabled; message logged only"
        );
        Ok(SmsResponse::delivered(None))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(base: &str) -> SmsConfig {
        SmsConfig {
            api_key: Some("key-123".to_string()),
            api_secret: Some("secret-456".to_string()),
            sender_number: Some("0338201411".to_string()),
            api_base: base.to_string(),
        }
    }

    #[test]
    fn message_type_follows_byte_length_and_image() {
        assert_eq!(message_type("short", false), "SMS");
        assert_eq!(message_type(&"a".repeat(90), false), "SMS");
        assert_eq!(message_type(&"a".repeat(91), false), "LMS");
        // 31 Hangul syllables are 93 UTF-8 bytes
        assert_eq!(message_type(&"가".repeat(31), false), "LMS");
        assert_eq!(message_type("short", true), "MMS");
    }

    #[test]
    fn authorization_header_signs_date_and_salt() {
        let header =
            authorization_header("key", "secret", "2025-01-01T00:00:00.000Z", "abcd").unwrap();

        let mut mac = HmacSha256::new_from_slice(b"secret").unwrap();
        mac.update(b"2025-01-01T00:00:00.000Zabcd");
        let expected = hex::encode(mac.finalize().into_bytes());

        assert_eq!(
            header,
            format!(
                "HMAC-SHA256 apiKey=key, date=2025-01-01T00:00:00.000Z, salt=abcd, signature={expected}"
            )
        );
    }

    #[test]
    fn salt_is_32_hex_chars() {
        let salt = random_salt();
        assert_eq!(salt.len(), 32);
        assert!(salt.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn missing_credentials_are_rejected() {
        let mut cfg = config("https://api.solapi.com");
        cfg.api_secret = None;
        assert!(SolapiTransport::new(&cfg, Duration::from_secs(5)).is_err());
    }

    #[tokio::test]
    async fn successful_send_reports_message_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/messages/v4/send"))
            .and(header_exists("authorization"))
            .and(body_partial_json(json!({
                "message": { "to": "01012345678", "from": "0338201411", "type": "SMS" }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "messageId": "M-1" })))
            .expect(1)
            .mount(&server)
            .await;

        let transport = SolapiTransport::new(&config(&server.uri()), Duration::from_secs(5)).unwrap();
        let response = transport
            .send(&SmsRequest::text("01012345678", "테스트"))
            .await
            .unwrap();

        assert!(response.success);
        assert_eq!(response.message_id.as_deref(), Some("M-1"));
    }

    #[tokio::test]
    async fn image_attachment_is_sent_as_mms() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/messages/v4/send"))
            .and(body_partial_json(json!({
                "message": { "type": "MMS", "imageUrl": "https://example.com/map.png" }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&server)
            .await;

        let transport = SolapiTransport::new(&config(&server.uri()), Duration::from_secs(5)).unwrap();
        let request = SmsRequest {
            to: "01012345678".to_string(),
            message: "배치도".to_string(),
            image_url: Some("https://example.com/map.png".to_string()),
        };

        assert!(transport.send(&request).await.unwrap().success);
    }

    #[tokio::test]
    async fn provider_rejection_is_not_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/messages/v4/send"))
            .respond_with(
                ResponseTemplate::new(400)
                    .set_body_json(json!({ "errorMessage": "발신번호 미등록" })),
            )
            .mount(&server)
            .await;

        let transport = SolapiTransport::new(&config(&server.uri()), Duration::from_secs(5)).unwrap();
        let response = transport
            .send(&SmsRequest::text("01012345678", "테스트"))
            .await
            .unwrap();

        assert!(!response.success);
        assert_eq!(response.error.as_deref(), Some("발신번호 미등록"));
    }

    #[tokio::test]
    async fn unreachable_provider_is_an_error() {
        let server = MockServer::start().await;
        let uri = server.uri();
        drop(server);

        let transport = SolapiTransport::new(&config(&uri), Duration::from_secs(2)).unwrap();
        assert!(
            transport
                .send(&SmsRequest::text("01012345678", "테스트"))
                .await
                .is_err()
        );
    }
}
