use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};

use crate::error::{AppError, Result};
use crate::models::command::CommandEntry;
use crate::models::conversation::Role;
use crate::models::user::User;
use crate::service::conversation_service::ConversationService;
use crate::service::event_service::EventService;
use crate::service::parser::parse_commands;
use crate::service::prompt::{HISTORY_LIMIT, PromptContext, build_prompt};
use crate::service::provider::ProviderAdapter;

#[derive(Debug, Clone, PartialEq)]
pub struct ChatReply {
    pub assistant_text: String,
    pub commands: Vec<CommandEntry>,
}

/// The chat-to-command pipeline. Executing the returned commands is the
/// caller's job.
pub struct ChatService {
    conversations: ConversationService,
    events: EventService,
    provider: Arc<ProviderAdapter>,
}

impl ChatService {
    pub fn new(
        conversations: ConversationService,
        events: EventService,
        provider: Arc<ProviderAdapter>,
    ) -> Self {
        Self {
            conversations,
            events,
            provider,
        }
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    /// Runs one user message through the pipeline.
    ///
    /// Only blank input and storage faults are errors; provider and parse
    /// failures come back as MESSAGE commands. The user's turn is stored
    /// verbatim, before the provider is called.
    pub async fn submit(&self, user: &User, input: &str) -> Result<ChatReply> {
        if input.trim().is_empty() {
            return Err(AppError::Validation("No input provided".to_string()));
        }

        self.conversations.record(user.id, Role::User, input).await?;

        let now = Utc::now();
        let history = self.conversations.recent(user.id, HISTORY_LIMIT).await;
        let events = self
            .events
            .recent_for_context(user.id, &user.timezone, now)
            .await;
        let prompt = build_prompt(&PromptContext {
            user_input: input,
            timezone_name: &user.timezone,
            now,
            events: &events,
            history: &history,
        });
        debug!(
            user_id = user.id,
            messages = prompt.messages.len(),
            context_events = events.len(),
            "prompt assembled"
        );

        let assistant_text = self.provider.respond(&prompt).await;
        self.conversations
            .record(user.id, Role::Assistant, &assistant_text)
            .await?;

        let commands = parse_commands(&assistant_text);
        info!(
            user_id = user.id,
            provider = self.provider.name(),
            commands = commands.len(),
            "chat message handled"
        );
        Ok(ChatReply {
            assistant_text,
            commands,
        })
    }
}
