// Outbound WhatsApp messages
//
// Thin client over the Cloud API `/{phone_number_id}/messages` endpoint.
// Failures are returned to the caller, which persists them; nothing retries
// inline.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

use crate::config::WhatsAppConfig;

/// Graph API error code for an expired or revoked access token
const OAUTH_EXPIRED_CODE: i64 = 190;

#[derive(Debug, Clone, thiserror::Error)]
pub enum MessagingError {
    #[error("WhatsApp sending is not configured")]
    NotConfigured,

    #[error("Network error: {0}")]
    Network(String),

    #[error("Access token expired or revoked: {0}")]
    CredentialExpired(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },
}

impl MessagingError {
    pub fn is_credential_expired(&self) -> bool {
        matches!(self, MessagingError::CredentialExpired(_))
    }
}

/// Provider id of a delivered message
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SentMessage {
    pub wa_message_id: Option<String>,
}

#[async_trait]
pub trait MessagingGateway: Send + Sync {
    async fn send_text(&self, to: &str, body: &str) -> Result<SentMessage, MessagingError>;

    /// Message with a single call-to-action URL button
    async fn send_interactive_cta(
        &self,
        to: &str,
        body: &str,
        button_label: &str,
        url: &str,
    ) -> Result<SentMessage, MessagingError>;

    async fn send_image(&self, to: &str, image_url: &str, caption: Option<&str>) -> Result<SentMessage, MessagingError>;
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    #[serde(default)]
    messages: Vec<SendResponseMessage>,
}

#[derive(Debug, Deserialize)]
struct SendResponseMessage {
    id: String,
}

pub struct WhatsAppCloudClient {
    http: reqwest::Client,
    messages_url: String,
    access_token: String,
}

impl WhatsAppCloudClient {
    pub fn new(config: &WhatsAppConfig, timeout: Duration) -> Result<Self, MessagingError> {
        let (Some(access_token), Some(phone_number_id)) = (&config.access_token, &config.phone_number_id) else {
            return Err(MessagingError::NotConfigured);
        };
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| MessagingError::Network(e.to_string()))?;

        Ok(Self {
            http,
            messages_url: format!("{}/{}/messages", config.api_base.trim_end_matches('/'), phone_number_id),
            access_token: access_token.clone(),
        })
    }

    async fn post(&self, payload: Value) -> Result<SentMessage, MessagingError> {
        let response = self
            .http
            .post(&self.messages_url)
            .bearer_auth(&self.access_token)
            .json(&payload)
            .send()
            .await
            .map_err(|e| MessagingError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_failure(status.as_u16(), body));
        }

        let parsed: SendResponse = response.json().await.unwrap_or(SendResponse { messages: vec![] });
        Ok(SentMessage {
            wa_message_id: parsed.messages.into_iter().next().map(|m| m.id),
        })
    }
}

fn classify_failure(status: u16, body: String) -> MessagingError {
    let code = serde_json::from_str::<Value>(&body)
        .ok()
        .and_then(|v| v.pointer("/error/code").and_then(Value::as_i64));

    if status == 401 || code == Some(OAUTH_EXPIRED_CODE) {
        MessagingError::CredentialExpired(body)
    } else {
        MessagingError::Api { status, message: body }
    }
}

fn envelope(to: &str, kind: &str, content: Value) -> Value {
    let mut payload = json!({
        "messaging_product": "whatsapp",
        "recipient_type": "individual",
        "to": to,
        "type": kind,
    });
    payload[kind] = content;
    payload
}

#[async_trait]
impl MessagingGateway for WhatsAppCloudClient {
    async fn send_text(&self, to: &str, body: &str) -> Result<SentMessage, MessagingError> {
        self.post(envelope(to, "text", json!({ "preview_url": false, "body": body })))
            .await
    }

    async fn send_interactive_cta(
        &self,
        to: &str,
        body: &str,
        button_label: &str,
        url: &str,
    ) -> Result<SentMessage, MessagingError> {
        let interactive = json!({
            "type": "cta_url",
            "body": { "text": body },
            "action": {
                "name": "cta_url",
                "parameters": { "display_text": button_label, "url": url }
            }
        });
        self.post(envelope(to, "interactive", interactive)).await
    }

    async fn send_image(&self, to: &str, image_url: &str, caption: Option<&str>) -> Result<SentMessage, MessagingError> {
        let mut image = json!({ "link": image_url });
        if let Some(caption) = caption {
            image["caption"] = json!(caption);
        }
        self.post(envelope(to, "image", image)).await
    }
}

/// Used when no access token / phone number id is configured
pub struct DisabledMessaging;

#[async_trait]
impl MessagingGateway for DisabledMessaging {
    async fn send_text(&self, _to: &str, _body: &str) -> Result<SentMessage, MessagingError> {
        Err(MessagingError::NotConfigured)
    }

    async fn send_interactive_cta(
        &self,
        _to: &str,
        _body: &str,
        _button_label: &str,
        _url: &str,
    ) -> Result<SentMessage, MessagingError> {
        Err(MessagingError::NotConfigured)
    }

    async fn send_image(&self, _to: &str, _image_url: &str, _caption: Option<&str>) -> Result<SentMessage, MessagingError> {
        Err(MessagingError::NotConfigured)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> WhatsAppCloudClient {
        let config = WhatsAppConfig {
            verify_token: None,
            access_token: Some("wa-token".into()),
            phone_number_id: Some("12345".into()),
            api_base: server.uri(),
        };
        WhatsAppCloudClient::new(&config, Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_send_text_returns_message_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/12345/messages"))
            .and(header("Authorization", "Bearer wa-token"))
            .and(body_partial_json(json!({
                "to": "5511999990000",
                "type": "text",
                "text": { "body": "Olá!" }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "messaging_product": "whatsapp",
                "messages": [{ "id": "wamid.OUT1" }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let sent = client(&server).send_text("5511999990000", "Olá!").await.unwrap();
        assert_eq!(sent.wa_message_id.as_deref(), Some("wamid.OUT1"));
    }

    #[tokio::test]
    async fn test_cta_payload_shape() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/12345/messages"))
            .and(body_partial_json(json!({
                "type": "interactive",
                "interactive": {
                    "type": "cta_url",
                    "action": { "parameters": { "display_text": "Ver cardápio", "url": "https://loja.example" } }
                }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "messages": [{ "id": "wamid.CTA" }] })))
            .expect(1)
            .mount(&server)
            .await;

        client(&server)
            .send_interactive_cta("5511999990000", "Confira", "Ver cardápio", "https://loja.example")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_expired_token_detected_by_error_code() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/12345/messages"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": { "message": "Error validating access token", "code": 190 }
            })))
            .mount(&server)
            .await;

        let err = client(&server).send_text("5511", "oi").await.unwrap_err();
        assert!(err.is_credential_expired());
    }

    #[tokio::test]
    async fn test_other_failures_are_api_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/12345/messages"))
            .respond_with(ResponseTemplate::new(500).set_body_string("unavailable"))
            .mount(&server)
            .await;

        let err = client(&server).send_image("5511", "https://x/y.png", None).await.unwrap_err();
        assert!(matches!(err, MessagingError::Api { status: 500, .. }));
    }

    #[test]
    fn test_unauthorized_status_is_expired_credential() {
        assert!(classify_failure(401, String::new()).is_credential_expired());
    }
}
