//! Turns a user's conversation tail and calendar into the message list sent
//! to the text-generation provider.

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use tracing::warn;

use crate::models::conversation::{ChatTurn, Role};
use crate::models::event::CalendarEvent;

/// Turns of history included in every prompt. Recent context only.
pub const HISTORY_LIMIT: usize = 5;
pub const EVENT_LOOKBACK_DAYS: i64 = 7;
pub const EVENT_CONTEXT_LIMIT: usize = 10;

const SYSTEM_PROMPT: &str = r#"
You are Drvyn, a helpful productivity assistant. You can schedule tasks and events for users.

IMPORTANT: You MUST ALWAYS respond with ONLY a valid JSON array. No other text.

For scheduling requests, use this exact format:
[
    {
        "command": "ADD",
        "start": "2025-07-30T10:00:00",
        "end": "2025-07-30T11:00:00",
        "title": "Task Name"
    },
    {
        "command": "MESSAGE",
        "text": "I've scheduled your task for tomorrow at 10 AM."
    }
]

ALWAYS include a MESSAGE command after scheduling to confirm what you did.

To delete an event, use:
[
    {
        "command": "REMOVE",
        "id": 12,
        "title": "Task Name"
    }
]

Scheduling rules:
- "today" = current date
- "tomorrow" = next day
- "later today" = 2-3 hours from now
- "this afternoon" = 2-5 PM today
- "this evening" = 6-9 PM today
- Default duration: 1 hour
- Default time: 9 AM if not specified
- Use ISO format: YYYY-MM-DDTHH:MM:SS (MUST use T as separator, no spaces)

For non-scheduling questions, respond with:
[
    {
        "command": "MESSAGE",
        "text": "Your helpful response here"
    }
]

Commands: ADD (schedule), REMOVE (delete), MESSAGE (respond)
"#;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PromptMessage {
    pub role: Role,
    pub content: String,
}

impl PromptMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// The assembled request: system instruction, context message and history,
/// plus the raw input for backends that restate it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub messages: Vec<PromptMessage>,
    pub user_input: String,
}

impl Prompt {
    pub fn system_text(&self) -> &str {
        self.messages
            .iter()
            .find(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
            .unwrap_or_default()
    }

    /// Everything after the system instruction.
    pub fn conversation(&self) -> impl Iterator<Item = &PromptMessage> {
        self.messages.iter().filter(|m| m.role != Role::System)
    }
}

pub struct PromptContext<'a> {
    pub user_input: &'a str,
    pub timezone_name: &'a str,
    pub now: DateTime<Utc>,
    pub events: &'a [CalendarEvent],
    pub history: &'a [ChatTurn],
}

pub fn system_prompt() -> &'static str {
    SYSTEM_PROMPT
}

/// Unknown or empty zone names fall back to UTC rather than failing the chat.
pub fn resolve_timezone(name: &str) -> Tz {
    match name.trim().parse::<Tz>() {
        Ok(tz) => tz,
        Err(_) => {
            warn!(timezone = name, "unknown timezone, falling back to UTC");
            Tz::UTC
        }
    }
}

/// Earliest event start, in the user's wall-clock time, that still counts as
/// recent context.
pub fn event_window_start(now: DateTime<Utc>, timezone_name: &str) -> NaiveDateTime {
    let local = now.with_timezone(&resolve_timezone(timezone_name)).naive_local();
    local - Duration::days(EVENT_LOOKBACK_DAYS)
}

pub fn event_summary(events: &[CalendarEvent]) -> String {
    if events.is_empty() {
        return "None".to_string();
    }
    events
        .iter()
        .map(|event| {
            format!(
                "{} from {} to {}",
                event.title,
                event.start.format("%Y-%m-%d %H:%M"),
                event.end.format("%H:%M")
            )
        })
        .collect::<Vec<_>>()
        .join(" | ")
}

pub fn context_message(now: DateTime<Utc>, timezone_name: &str, events: &[CalendarEvent]) -> String {
    let local_now = now.with_timezone(&resolve_timezone(timezone_name));
    format!(
        "Current time: {}. User's timezone: {}. Current events: {}",
        local_now.format("%Y-%m-%d %H:%M:%S %Z"),
        timezone_name,
        event_summary(events)
    )
}

pub fn build_prompt(ctx: &PromptContext<'_>) -> Prompt {
    let mut messages = Vec::with_capacity(HISTORY_LIMIT + 2);
    messages.push(PromptMessage::new(Role::System, SYSTEM_PROMPT));
    messages.push(PromptMessage::new(
        Role::User,
        context_message(ctx.now, ctx.timezone_name, ctx.events),
    ));

    let skip = ctx.history.len().saturating_sub(HISTORY_LIMIT);
    messages.extend(
        ctx.history[skip..]
            .iter()
            .map(|turn| PromptMessage::new(turn.role, turn.content.clone())),
    );

    Prompt {
        messages,
        user_input: ctx.user_input.to_string(),
    }
}
