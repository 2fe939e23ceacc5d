use tracing::warn;

use crate::error::{AppError, Result};
use crate::models::command::{Command, CommandEntry, EventRef, RemoveTarget};
use crate::models::event::{CalendarEvent, parse_event_time};
use crate::service::event_service::{EventService, NewEvent};

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Added(CalendarEvent),
    Removed(CalendarEvent),
    Message(String),
    /// The command could not be applied; the text says why.
    Skipped(String),
}

/// The command to act on. Raw entries stay verbatim in the reply but are
/// still applied when the extra keys are the only difference from a known
/// command.
fn actionable(entry: &CommandEntry) -> Option<Command> {
    match entry {
        CommandEntry::Known(command) => Some(command.clone()),
        CommandEntry::Raw(value) => serde_json::from_value::<Command>(value.clone()).ok(),
    }
}

/// Applies assistant commands to a user's calendar.
///
/// Bad dates, unknown events and off-schema entries are reported as
/// [`Outcome::Skipped`]; only storage faults abort the batch.
pub struct CommandExecutor {
    events: EventService,
}

impl CommandExecutor {
    pub fn new(events: EventService) -> Self {
        Self { events }
    }

    pub async fn apply(&self, user_id: u64, entries: &[CommandEntry]) -> Result<Vec<Outcome>> {
        let mut outcomes = Vec::with_capacity(entries.len());
        for entry in entries {
            let outcome = match actionable(entry).as_ref() {
                Some(Command::Add { title, start, end }) => self.add(user_id, title, start, end).await?,
                Some(Command::Remove(target)) => self.remove(user_id, target).await?,
                Some(Command::Message { text }) => Outcome::Message(text.clone()),
                None => Outcome::Skipped(format!("Unrecognized command: {}", entry.to_value())),
            };
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }

    async fn add(&self, user_id: u64, title: &str, start: &str, end: &str) -> Result<Outcome> {
        let new_event = NewEvent {
            title: title.to_string(),
            start: start.to_string(),
            end: end.to_string(),
        };
        match self.events.create(user_id, &new_event).await {
            Ok(created) => Ok(Outcome::Added(created)),
            Err(AppError::Validation(reason)) => {
                warn!(user_id, %reason, "skipping ADD command");
                Ok(Outcome::Skipped(format!("Could not schedule \"{}\": {}", title, reason)))
            }
            Err(err) => Err(err),
        }
    }

    async fn remove(&self, user_id: u64, target: &RemoveTarget) -> Result<Outcome> {
        let Some(found) = self.resolve(user_id, target).await else {
            return Ok(Outcome::Skipped("No matching event to remove".to_string()));
        };
        match self.events.delete(user_id, found.id).await {
            Ok(removed) => Ok(Outcome::Removed(removed)),
            Err(AppError::NotFound(reason)) => Ok(Outcome::Skipped(reason)),
            Err(err) => Err(err),
        }
    }

    /// An id wins when present; otherwise match on title, narrowed by start
    /// time when the assistant gave one.
    async fn resolve(&self, user_id: u64, target: &RemoveTarget) -> Option<CalendarEvent> {
        let id = match &target.id {
            Some(EventRef::Id(id)) => Some(*id),
            Some(EventRef::Text(text)) => text.trim().parse::<u64>().ok(),
            None => None,
        };
        if let Some(id) = id {
            return self.events.get(user_id, id).await;
        }

        let title = match (&target.title, &target.id) {
            (Some(title), _) => title,
            (None, Some(EventRef::Text(text))) => text,
            _ => return None,
        };
        let start = target.start.as_deref().and_then(parse_event_time);
        self.events
            .list(user_id)
            .await
            .into_iter()
            .find(|event| {
                event.title.trim().eq_ignore_ascii_case(title.trim())
                    && start.is_none_or(|start| event.start == start)
            })
    }
}
