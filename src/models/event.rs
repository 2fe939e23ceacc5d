use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db::{DB, DBError};

pub const TABLE_NAME: &str = "events";

const ISO_SECONDS: &str = "%Y-%m-%dT%H:%M:%S";
// Matches the assistant's default when a request names a day but no hour.
const DEFAULT_HOUR: u32 = 9;

/// A calendar entry. `start` and `end` are wall-clock times in the owner's
/// own timezone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub id: u64,
    pub user_id: u64,
    pub title: String,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventView {
    pub id: u64,
    pub title: String,
    pub start: String,
    pub end: String,
}

impl From<&CalendarEvent> for EventView {
    fn from(event: &CalendarEvent) -> Self {
        Self {
            id: event.id,
            title: event.title.clone(),
            start: event.start.format(ISO_SECONDS).to_string(),
            end: event.end.format(ISO_SECONDS).to_string(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct EventChanges {
    pub title: Option<String>,
    pub start: Option<NaiveDateTime>,
    pub end: Option<NaiveDateTime>,
}

/// Parses the date-time shapes clients and the assistant actually send:
/// RFC 3339, ISO 8601 with or without seconds, a space instead of `T`, a
/// doubled `T`, or a bare date (scheduled at 09:00).
pub fn parse_event_time(raw: &str) -> Option<NaiveDateTime> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(parsed.naive_local());
    }

    let mut compact = String::with_capacity(trimmed.len() + 1);
    for c in trimmed.chars().filter(|c| !c.is_whitespace()) {
        if c == 'T' && compact.ends_with('T') {
            continue;
        }
        compact.push(c);
    }
    if !compact.contains('T') && compact.len() > 10 && compact.is_char_boundary(10) {
        compact.insert(10, 'T');
    }

    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(&compact, format) {
            return Some(parsed);
        }
    }
    NaiveDate::parse_from_str(&compact, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(DEFAULT_HOUR, 0, 0))
}

fn next_id(db: &DB<CalendarEvent>) -> u64 {
    db.values().map(|event| event.id).max().unwrap_or(0) + 1
}

pub fn create_event(
    db: &mut DB<CalendarEvent>,
    user_id: u64,
    title: &str,
    start: NaiveDateTime,
    end: NaiveDateTime,
    now: DateTime<Utc>,
) -> Result<CalendarEvent, DBError> {
    let event = CalendarEvent {
        id: next_id(db),
        user_id,
        title: title.to_string(),
        start,
        end,
        created_at: now,
        updated_at: now,
    };
    let key = event.id.to_string();
    db.insert(key.clone(), event.clone());
    if let Err(err) = db.save() {
        db.remove(&key);
        return Err(err);
    }
    Ok(event)
}

pub fn find_owned(db: &DB<CalendarEvent>, user_id: u64, id: u64) -> Option<&CalendarEvent> {
    db.get(&id.to_string()).filter(|event| event.user_id == user_id)
}

/// Applies `changes` to an event the user owns. `Ok(None)` when there is no
/// such event.
pub fn update_event(
    db: &mut DB<CalendarEvent>,
    user_id: u64,
    id: u64,
    changes: EventChanges,
    now: DateTime<Utc>,
) -> Result<Option<CalendarEvent>, DBError> {
    let key = id.to_string();
    let Some(event) = db.get_mut(&key).filter(|event| event.user_id == user_id) else {
        return Ok(None);
    };
    let previous = event.clone();
    if let Some(title) = changes.title {
        event.title = title;
    }
    if let Some(start) = changes.start {
        event.start = start;
    }
    if let Some(end) = changes.end {
        event.end = end;
    }
    event.updated_at = now;
    let updated = event.clone();

    if let Err(err) = db.save() {
        db.insert(key, previous);
        return Err(err);
    }
    Ok(Some(updated))
}

pub fn delete_event(
    db: &mut DB<CalendarEvent>,
    user_id: u64,
    id: u64,
) -> Result<Option<CalendarEvent>, DBError> {
    if find_owned(db, user_id, id).is_none() {
        return Ok(None);
    }
    let key = id.to_string();
    let removed = db.remove(&key);
    if let Err(err) = db.save() {
        if let Some(event) = removed {
            db.insert(key, event);
        }
        return Err(err);
    }
    Ok(removed)
}

/// All events of a user, earliest first.
pub fn list_events(db: &DB<CalendarEvent>, user_id: u64) -> Vec<CalendarEvent> {
    let mut events: Vec<CalendarEvent> = db
        .values()
        .filter(|event| event.user_id == user_id)
        .cloned()
        .collect();
    events.sort_by_key(|event| (event.start, event.id));
    events
}

/// Events starting at or after `since`, most recent first, at most `limit`.
pub fn events_since(
    db: &DB<CalendarEvent>,
    user_id: u64,
    since: NaiveDateTime,
    limit: usize,
) -> Vec<CalendarEvent> {
    let mut events: Vec<CalendarEvent> = db
        .values()
        .filter(|event| event.user_id == user_id && event.start >= since)
        .cloned()
        .collect();
    events.sort_by(|a, b| b.start.cmp(&a.start).then(b.id.cmp(&a.id)));
    events.truncate(limit);
    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(raw: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M").unwrap()
    }

    #[test]
    fn parses_lenient_shapes() {
        let expected = at("2025-07-30 10:00");
        assert_eq!(parse_event_time("2025-07-30T10:00:00"), Some(expected));
        assert_eq!(parse_event_time("2025-07-30 10:00:00"), Some(expected));
        assert_eq!(parse_event_time("2025-07-30TT10:00:00"), Some(expected));
        assert_eq!(parse_event_time("2025-07-30T10:00"), Some(expected));
        assert_eq!(parse_event_time(" 2025-07-30 10:00 "), Some(expected));
        assert_eq!(parse_event_time("2025-07-30T10:00:00Z"), Some(expected));
        assert_eq!(parse_event_time("2025-07-30T10:00:00-04:00"), Some(expected));
        assert_eq!(parse_event_time("2025-07-30"), Some(at("2025-07-30 09:00")));
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(parse_event_time(""), None);
        assert_eq!(parse_event_time("tomorrow at 2pm"), None);
        assert_eq!(parse_event_time("2025-13-40T10:00:00"), None);
    }

    #[test]
    fn events_since_orders_newest_first_and_caps() {
        let mut db = DB::in_memory(TABLE_NAME);
        let now = Utc.with_ymd_and_hms(2025, 7, 30, 12, 0, 0).unwrap();
        create_event(&mut db, 1, "old", at("2025-07-01 09:00"), at("2025-07-01 10:00"), now).unwrap();
        create_event(&mut db, 1, "a", at("2025-07-28 09:00"), at("2025-07-28 10:00"), now).unwrap();
        create_event(&mut db, 1, "b", at("2025-07-31 09:00"), at("2025-07-31 10:00"), now).unwrap();
        create_event(&mut db, 1, "c", at("2025-07-29 09:00"), at("2025-07-29 10:00"), now).unwrap();
        create_event(&mut db, 2, "not mine", at("2025-07-30 09:00"), at("2025-07-30 10:00"), now).unwrap();

        let events = events_since(&db, 1, at("2025-07-23 12:00"), 2);
        let titles: Vec<&str> = events.iter().map(|e| e.title.as_str()).collect();
        assert_eq!(titles, vec!["b", "c"]);
    }

    #[test]
    fn update_and_delete_are_owner_scoped() {
        let mut db = DB::in_memory(TABLE_NAME);
        let now = Utc.with_ymd_and_hms(2025, 7, 30, 12, 0, 0).unwrap();
        let event = create_event(&mut db, 1, "standup", at("2025-07-30 09:00"), at("2025-07-30 09:15"), now).unwrap();
        assert_eq!(event.id, 1);

        let changes = EventChanges {
            title: Some("retro".to_string()),
            ..EventChanges::default()
        };
        assert_eq!(update_event(&mut db, 2, event.id, changes.clone(), now).unwrap(), None);
        let updated = update_event(&mut db, 1, event.id, changes, now).unwrap().unwrap();
        assert_eq!(updated.title, "retro");
        assert_eq!(updated.start, event.start);

        assert!(delete_event(&mut db, 2, event.id).unwrap().is_none());
        assert!(delete_event(&mut db, 1, event.id).unwrap().is_some());
        assert!(db.is_empty());
    }

    #[test]
    fn view_uses_iso_strings() {
        let now = Utc.with_ymd_and_hms(2025, 7, 30, 12, 0, 0).unwrap();
        let event = CalendarEvent {
            id: 7,
            user_id: 1,
            title: "Meeting".to_string(),
            start: at("2025-07-31 14:00"),
            end: at("2025-07-31 15:00"),
            created_at: now,
            updated_at: now,
        };
        let view = EventView::from(&event);
        assert_eq!(view.start, "2025-07-31T14:00:00");
        assert_eq!(view.end, "2025-07-31T15:00:00");
    }
}
