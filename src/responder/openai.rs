//! OpenAI-compatible chat-completions client.

use super::{Responder, ResponderError};
use crate::config::ResponderConfig;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
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

impl ChatResponse {
    /// Trimmed content of the first choice, if any.
    fn into_text(self) -> Option<String> {
        let content = self.choices.into_iter().next()?.message.content?;
        let trimmed = content.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    }
}

/// Sends each prompt as a single user message.
pub struct OpenAiResponder {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

impl OpenAiResponder {
    pub fn new(config: &ResponderConfig, api_key: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .user_agent(concat!("parleyd/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            api_url: config.api_url.clone(),
            api_key: api_key.into(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        }
    }
}

#[async_trait]
impl Responder for OpenAiResponder {
    async fn complete(&self, prompt: &str) -> Result<String, ResponderError> {
        let body = ChatRequest {
            model: &self.model,
            messages: [ChatMessage {
                role: "user",
                content: prompt,
            }],
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            debug!(status = status.as_u16(), "completion request rejected");
            return Err(ResponderError::Status(status.as_u16()));
        }

        let parsed: ChatResponse = response.json().await?;
        parsed.into_text().ok_or(ResponderError::EmptyCompletion)
    }
}
