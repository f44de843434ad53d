// Chat completion client
//
// Any OpenAI-compatible `/chat/completions` endpoint. The gateway only ever
// calls `reply_or_fallback`, which turns every failure into the fixed apology.

use async_trait::async_trait;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::LlmConfig;

/// Sent when the model is unreachable or answers nothing
pub const FALLBACK_REPLY: &str =
    "Desculpe, tive um probleminha para responder agora 😅 Pode tentar novamente em instantes?";

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("LLM API key not configured")]
    NotConfigured,

    #[error("Network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Empty completion")]
    EmptyCompletion,
}

#[async_trait]
pub trait ReplyGenerator: Send + Sync {
    async fn generate(&self, system_prompt: &str, user_message: &str) -> Result<String, LlmError>;
}

/// Reply text and whether it is the fallback
#[derive(Debug, Clone, PartialEq)]
pub struct LlmOutcome {
    pub text: String,
    pub fell_back: bool,
}

/// Never fails: errors and blank answers become `FALLBACK_REPLY`
pub async fn reply_or_fallback(generator: &dyn ReplyGenerator, system_prompt: &str, user_message: &str) -> LlmOutcome {
    match generator.generate(system_prompt, user_message).await {
        Ok(text) if !text.trim().is_empty() => LlmOutcome {
            text: text.trim().to_string(),
            fell_back: false,
        },
        Ok(_) => {
            tracing::warn!("LLM returned an empty completion, using fallback reply");
            fallback()
        }
        Err(e) => {
            tracing::warn!("LLM call failed, using fallback reply: {}", e);
            fallback()
        }
    }
}

fn fallback() -> LlmOutcome {
    LlmOutcome {
        text: FALLBACK_REPLY.to_string(),
        fell_back: true,
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

pub struct OpenAiCompatibleClient {
    http: reqwest::Client,
    api_key: String,
    api_url: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

impl OpenAiCompatibleClient {
    pub fn new(config: &LlmConfig, timeout: Duration) -> Result<Self, LlmError> {
        let api_key = config.api_key.clone().ok_or(LlmError::NotConfigured)?;
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LlmError::Network(e.to_string()))?;

        Ok(Self {
            http,
            api_key,
            api_url: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature.to_f32().unwrap_or(0.7),
        })
    }
}

#[async_trait]
impl ReplyGenerator for OpenAiCompatibleClient {
    async fn generate(&self, system_prompt: &str, user_message: &str) -> Result<String, LlmError> {
        let request = ChatCompletionRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: user_message,
                },
            ],
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };

        let response = self
            .http
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| LlmError::Network(e.to_string()))?;

        let status = response.status();
        tracing::debug!("LLM API answered {}", status.as_u16());

        if !status.is_success() {
            let message = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            return Err(LlmError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let completion: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or(LlmError::EmptyCompletion)
    }
}

/// Stand-in when no API key is configured
pub struct DisabledReplyGenerator;

#[async_trait]
impl ReplyGenerator for DisabledReplyGenerator {
    async fn generate(&self, _system_prompt: &str, _user_message: &str) -> Result<String, LlmError> {
        Err(LlmError::NotConfigured)
    }
}
