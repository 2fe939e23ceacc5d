//! Provider dispatch. One [`TextGenerator`] per backend, picked once at
//! startup; [`ProviderAdapter::respond`] turns every outcome into text.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{info, warn};

use crate::clients::cohere_client::CohereClient;
use crate::clients::openai_client::OpenAIChatClient;
use crate::config::ProviderSettings;
use crate::service::prompt::Prompt;

const MAX_ATTEMPTS: u32 = 2;
const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(500);

pub const NO_PROVIDER_MESSAGE: &str = "I'm sorry, but no AI provider is configured. Please set up either OpenAI or Cohere API key in the .env file.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    OpenAi,
    Cohere,
}

impl ProviderKind {
    pub fn parse(selector: &str) -> Option<Self> {
        match selector.trim().to_ascii_lowercase().as_str() {
            "openai" => Some(ProviderKind::OpenAi),
            "cohere" => Some(ProviderKind::Cohere),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "openai",
            ProviderKind::Cohere => "cohere",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "OpenAI",
            ProviderKind::Cohere => "Cohere",
        }
    }
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("{0}")]
    Transport(#[from] reqwest::Error),
    /// Only the code is kept. Rejection bodies can echo the submitted key
    /// back, masked or not, so they never reach an error or a log line.
    #[error("request failed with status {status}")]
    Status { status: u16 },
    #[error("failed to decode provider response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("provider returned no completions")]
    Empty,
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
}

impl ProviderError {
    /// Failures worth one more attempt: the network, throttling or the
    /// provider's own outages.
    pub fn is_transient(&self) -> bool {
        match self {
            ProviderError::Transport(err) => err.is_timeout() || err.is_connect() || err.is_request(),
            ProviderError::Status { status } => *status == 429 || *status >= 500,
            ProviderError::Timeout(_) => true,
            ProviderError::Decode(_) | ProviderError::Empty => false,
        }
    }
}

#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &Prompt) -> Result<String, ProviderError>;
}

/// Empty, whitespace, or template values such as `your-openai-api-key-here`.
pub fn credential_usable(key: Option<&str>) -> bool {
    let Some(key) = key.map(str::trim) else {
        return false;
    };
    if key.is_empty() {
        return false;
    }
    let lower = key.to_ascii_lowercase();
    !(lower.starts_with("your-") && lower.ends_with("-here"))
}

pub fn not_configured_message(kind: ProviderKind) -> String {
    format!(
        "I'm sorry, but the {name} API key is not configured. Please set up your {name} API key in the .env file.",
        name = kind.display_name()
    )
}

pub fn service_error_message(kind: ProviderKind, err: &ProviderError) -> String {
    format!(
        "I'm sorry, but there was an error with the {} service: {}",
        kind.display_name(),
        err
    )
}

enum Backend {
    Ready(Arc<dyn TextGenerator>),
    Unavailable(String),
}

pub struct ProviderAdapter {
    kind: Option<ProviderKind>,
    backend: Backend,
    timeout: Duration,
    retry_delay: Duration,
}

impl ProviderAdapter {
    pub fn new(kind: ProviderKind, generator: Arc<dyn TextGenerator>, timeout: Duration) -> Self {
        Self {
            kind: Some(kind),
            backend: Backend::Ready(generator),
            timeout,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }

    /// An adapter that answers every prompt with `message` and never touches
    /// the network.
    pub fn unavailable(kind: Option<ProviderKind>, message: impl Into<String>) -> Self {
        Self {
            kind,
            backend: Backend::Unavailable(message.into()),
            timeout: Duration::ZERO,
            retry_delay: Duration::ZERO,
        }
    }

    pub fn from_settings(settings: &ProviderSettings) -> Self {
        let Some(kind) = ProviderKind::parse(&settings.selector) else {
            warn!(selector = %settings.selector, "unrecognized AI provider");
            return Self::unavailable(None, NO_PROVIDER_MESSAGE);
        };
        let key = match kind {
            ProviderKind::OpenAi => settings.openai_api_key.as_deref(),
            ProviderKind::Cohere => settings.cohere_api_key.as_deref(),
        };
        let credential_present = credential_usable(key);
        info!(provider = kind.as_str(), credential_present, "text-generation provider selected");

        match key.filter(|_| credential_present) {
            None => Self::unavailable(Some(kind), not_configured_message(kind)),
            Some(key) => {
                let generator: Arc<dyn TextGenerator> = match kind {
                    ProviderKind::OpenAi => Arc::new(OpenAIChatClient::new(key.trim().to_string())),
                    ProviderKind::Cohere => Arc::new(CohereClient::new(key.trim().to_string())),
                };
                Self::new(kind, generator, settings.timeout)
            }
        }
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn name(&self) -> &'static str {
        self.kind.map_or("none", |kind| kind.as_str())
    }

    pub fn is_configured(&self) -> bool {
        matches!(self.backend, Backend::Ready(_))
    }

    /// Always yields assistant text: the completion, or a fixed explanation
    /// when the provider is unusable or failed.
    pub async fn respond(&self, prompt: &Prompt) -> String {
        let generator = match &self.backend {
            Backend::Ready(generator) => generator,
            Backend::Unavailable(message) => return message.clone(),
        };
        let kind = self.kind.unwrap_or(ProviderKind::Cohere);

        let mut attempt = 1;
        loop {
            let result = match tokio::time::timeout(self.timeout, generator.generate(prompt)).await {
                Ok(result) => result,
                Err(_) => Err(ProviderError::Timeout(self.timeout)),
            };
            match result {
                Ok(text) => return text,
                Err(err) if attempt < MAX_ATTEMPTS && err.is_transient() => {
                    warn!(provider = kind.as_str(), attempt, error = %err, "provider call failed, retrying");
                    attempt += 1;
                    tokio::time::sleep(self.retry_delay).await;
                }
                Err(err) => {
                    if let ProviderError::Status { status } = &err {
                        warn!(provider = kind.as_str(), status, "provider rejected request");
                    } else {
                        warn!(provider = kind.as_str(), attempt, error = %err, "provider call failed");
                    }
                    return service_error_message(kind, &err);
                }
            }
        }
    }
}
