use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::models::conversation::Role;
use crate::service::prompt::Prompt;
use crate::service::provider::{ProviderError, TextGenerator};

const COHERE_GENERATE_URL: &str = "https://api.cohere.ai/v1/generate";
const MAX_TOKENS: u32 = 500;
const TEMPERATURE: f32 = 0.7;
const TOP_K: u32 = 0;
const TOP_P: f32 = 0.95;
const RESPONSE_INSTRUCTION: &str =
    "Respond with ONLY valid JSON array. For scheduling requests, ALWAYS include an ADD command.";

#[derive(Debug, Serialize, PartialEq)]
pub struct GenerateRequest {
    pub prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub k: u32,
    pub p: f32,
    pub frequency_penalty: f32,
    pub presence_penalty: f32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    generations: Vec<Generation>,
}

#[derive(Debug, Deserialize)]
struct Generation {
    text: String,
}

/// Single-prompt backend: the conversation is flattened into one text blob.
pub struct CohereClient {
    api_key: String,
    http: reqwest::Client,
}

impl CohereClient {
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            http: reqwest::Client::new(),
        }
    }
}

/// System text, a blank line, one `User:`/`Assistant:` line per message, then
/// the current input restated with the output instruction.
pub fn flatten_prompt(prompt: &Prompt) -> String {
    let mut text = format!("{}\n\n", prompt.system_text());
    for message in prompt.conversation() {
        match message.role {
            Role::User => text.push_str(&format!("User: {}\n", message.content)),
            Role::Assistant => text.push_str(&format!("Assistant: {}\n", message.content)),
            Role::System => {}
        }
    }
    text.push_str(&format!(
        "User: {}\nAssistant: {}",
        prompt.user_input, RESPONSE_INSTRUCTION
    ));
    text
}

pub fn build_request(prompt: &Prompt) -> GenerateRequest {
    GenerateRequest {
        prompt: flatten_prompt(prompt),
        max_tokens: MAX_TOKENS,
        temperature: TEMPERATURE,
        k: TOP_K,
        p: TOP_P,
        frequency_penalty: 0.0,
        presence_penalty: 0.0,
    }
}

pub fn extract_generation(body: &str) -> Result<String, ProviderError> {
    let parsed: GenerateResponse = serde_json::from_str(body)?;
    parsed
        .generations
        .into_iter()
        .next()
        .map(|generation| generation.text.trim().to_string())
        .ok_or(ProviderError::Empty)
}

#[async_trait]
impl TextGenerator for CohereClient {
    async fn generate(&self, prompt: &Prompt) -> Result<String, ProviderError> {
        let request = build_request(prompt);
        debug!(prompt_chars = request.prompt.len(), "sending generate request");

        let response = self
            .http
            .post(COHERE_GENERATE_URL)
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
        extract_generation(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::prompt::PromptMessage;

    fn prompt() -> Prompt {
        Prompt {
            messages: vec![
                PromptMessage::new(Role::System, "SYSTEM"),
                PromptMessage::new(Role::User, "Current time: now"),
                PromptMessage::new(Role::User, "lunch tomorrow"),
                PromptMessage::new(Role::Assistant, "[]"),
                PromptMessage::new(Role::User, "make it 1pm"),
            ],
            user_input: "make it 1pm".to_string(),
        }
    }

    #[test]
    fn flattens_history_and_restates_input() {
        assert_eq!(
            flatten_prompt(&prompt()),
            "SYSTEM\n\n\
             User: Current time: now\n\
             User: lunch tomorrow\n\
             Assistant: []\n\
             User: make it 1pm\n\
             User: make it 1pm\n\
             Assistant: Respond with ONLY valid JSON array. For scheduling requests, ALWAYS include an ADD command."
        );
    }

    #[test]
    fn request_uses_fixed_parameters() {
        let body = serde_json::to_value(build_request(&prompt())).unwrap();
        assert_eq!(body["max_tokens"], 500);
        assert_eq!(body["k"], 0);
        assert_eq!(body["frequency_penalty"], 0.0);
        assert_eq!(body["presence_penalty"], 0.0);
    }

    #[test]
    fn takes_first_generation() {
        let body = r#"{"id":"x","generations":[{"id":"g1","text":" [] \n"}],"prompt":"p"}"#;
        assert_eq!(extract_generation(body).unwrap(), "[]");
        assert!(matches!(extract_generation(r#"{"generations":[]}"#), Err(ProviderError::Empty)));
    }
}
