use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::service::prompt::Prompt;
use crate::service::provider::{ProviderError, TextGenerator};

const OPENAI_CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";
const MODEL: &str = "gpt-4o-mini";
const TEMPERATURE: f32 = 0.7;
const MAX_TOKENS: u32 = 1000;
const TOP_P: f32 = 0.95;

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct OpenAIMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct OpenAIRequest {
    pub model: String,
    pub messages: Vec<OpenAIMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub top_p: f32,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Debug, Deserialize)]
struct Message {
    content: Option<String>,
}

/// Chat-completion backend: the whole role-tagged list goes over the wire.
pub struct OpenAIChatClient {
    api_key: String,
    http: reqwest::Client,
}

impl OpenAIChatClient {
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            http: reqwest::Client::new(),
        }
    }
}

pub fn build_request(prompt: &Prompt) -> OpenAIRequest {
    OpenAIRequest {
        model: MODEL.to_string(),
        messages: prompt
            .messages
            .iter()
            .map(|m| OpenAIMessage {
                role: m.role.as_str().to_string(),
                content: m.content.clone(),
            })
            .collect(),
        temperature: TEMPERATURE,
        max_tokens: MAX_TOKENS,
        top_p: TOP_P,
    }
}

/// Pulls the first completion's text out of a chat-completion body.
pub fn extract_completion(body: &str) -> Result<String, ProviderError> {
    let parsed: OpenAIResponse = serde_json::from_str(body)?;
    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .map(|content| content.trim().to_string())
        .ok_or(ProviderError::Empty)
}

#[async_trait]
impl TextGenerator for OpenAIChatClient {
    async fn generate(&self, prompt: &Prompt) -> Result<String, ProviderError> {
        let request = build_request(prompt);
        debug!(messages = request.messages.len(), "sending chat completion request");

        let response = self
            .http
            .post(OPENAI_CHAT_URL)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Status {
                status: status.as_u16(),
            });
        }
        let text = response.text().await?;
        extract_completion(&text)
    }
}
