use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use tracing::info;

use crate::db::SharedDB;
use crate::error::{AppError, Result};
use crate::models::event::{self, CalendarEvent, EventChanges, parse_event_time};
use crate::service::prompt::{EVENT_CONTEXT_LIMIT, event_window_start};

#[derive(Debug, Clone, Deserialize)]
pub struct NewEvent {
    pub title: String,
    pub start: String,
    pub end: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventPatch {
    pub title: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
}

fn parse_field(field: &str, raw: &str) -> Result<NaiveDateTime> {
    parse_event_time(raw).ok_or_else(|| AppError::Validation(format!("Invalid {} time: {}", field, raw)))
}

fn check_order(start: NaiveDateTime, end: NaiveDateTime) -> Result<()> {
    if end < start {
        return Err(AppError::Validation("Event end must not be before its start".to_string()));
    }
    Ok(())
}

#[derive(Clone)]
pub struct EventService {
    db: SharedDB<CalendarEvent>,
}

impl EventService {
    pub fn new(db: SharedDB<CalendarEvent>) -> Self {
        Self { db }
    }

    pub async fn list(&self, user_id: u64) -> Vec<CalendarEvent> {
        let db = self.db.lock().await;
        event::list_events(&db, user_id)
    }

    pub async fn get(&self, user_id: u64, id: u64) -> Option<CalendarEvent> {
        let db = self.db.lock().await;
        event::find_owned(&db, user_id, id).cloned()
    }

    /// Validates and stores a new event. Date-times go through the lenient
    /// parser; anything it cannot read is a validation error, not a fault.
    pub async fn create(&self, user_id: u64, new_event: &NewEvent) -> Result<CalendarEvent> {
        let title = new_event.title.trim();
        if title.is_empty() {
            return Err(AppError::Validation("Title is required".to_string()));
        }
        let start = parse_field("start", &new_event.start)?;
        let end = parse_field("end", &new_event.end)?;
        check_order(start, end)?;

        let mut db = self.db.lock().await;
        let created = event::create_event(&mut db, user_id, title, start, end, Utc::now())?;
        info!(user_id, event_id = created.id, "event created");
        Ok(created)
    }

    pub async fn update(&self, user_id: u64, id: u64, patch: &EventPatch) -> Result<CalendarEvent> {
        let changes = EventChanges {
            title: match patch.title.as_deref().map(str::trim) {
                Some("") => return Err(AppError::Validation("Title is required".to_string())),
                other => other.map(str::to_string),
            },
            start: patch.start.as_deref().map(|raw| parse_field("start", raw)).transpose()?,
            end: patch.end.as_deref().map(|raw| parse_field("end", raw)).transpose()?,
        };

        let mut db = self.db.lock().await;
        let current = event::find_owned(&db, user_id, id)
            .ok_or_else(|| AppError::NotFound("Event not found".to_string()))?;
        check_order(changes.start.unwrap_or(current.start), changes.end.unwrap_or(current.end))?;

        event::update_event(&mut db, user_id, id, changes, Utc::now())?
            .ok_or_else(|| AppError::NotFound("Event not found".to_string()))
    }

    pub async fn delete(&self, user_id: u64, id: u64) -> Result<CalendarEvent> {
        let mut db = self.db.lock().await;
        let removed = event::delete_event(&mut db, user_id, id)?
            .ok_or_else(|| AppError::NotFound("Event not found".to_string()))?;
        info!(user_id, event_id = id, "event deleted");
        Ok(removed)
    }

    /// Read-only window fed to the assistant: the trailing week in the
    /// user's own time, newest first, capped.
    pub async fn recent_for_context(
        &self,
        user_id: u64,
        timezone_name: &str,
        now: DateTime<Utc>,
    ) -> Vec<CalendarEvent> {
        let since = event_window_start(now, timezone_name);
        let db = self.db.lock().await;
        event::events_since(&db, user_id, since, EVENT_CONTEXT_LIMIT)
    }
}
