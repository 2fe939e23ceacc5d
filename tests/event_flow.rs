use drvynServer::db::{DB, load_db};
use drvynServer::error::AppError;
use drvynServer::models::conversation::{self, ChatTurn, Role};
use drvynServer::models::event::{self, CalendarEvent, EventView};
use drvynServer::service::conversation_service::ConversationService;
use drvynServer::service::event_service::{EventPatch, EventService, NewEvent};

fn new_event(title: &str, start: &str, end: &str) -> NewEvent {
    NewEvent {
        title: title.to_string(),
        start: start.to_string(),
        end: end.to_string(),
    }
}

#[tokio::test]
async fn crud_round_trip() {
    let events = EventService::new(DB::in_memory(event::TABLE_NAME).shared());

    let created = events
        .create(7, &new_event("Review", "2025-09-01 14:00", "2025-09-01T15:30:00"))
        .await
        .unwrap();
    let view = EventView::from(&created);
    assert_eq!(view.start, "2025-09-01T14:00:00");
    assert_eq!(view.end, "2025-09-01T15:30:00");

    let patch = EventPatch {
        title: Some("Design review".to_string()),
        ..EventPatch::default()
    };
    let updated = events.update(7, created.id, &patch).await.unwrap();
    assert_eq!(updated.title, "Design review");
    assert_eq!(updated.start, created.start);

    let removed = events.delete(7, created.id).await.unwrap();
    assert_eq!(removed.id, created.id);
    assert!(events.list(7).await.is_empty());

    let err = events.delete(7, created.id).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(ref msg) if msg == "Event not found"));
}

#[tokio::test]
async fn rejects_bad_input() {
    let events = EventService::new(DB::in_memory(event::TABLE_NAME).shared());

    let blank = events.create(1, &new_event("  ", "2025-09-01T10:00", "2025-09-01T11:00")).await;
    assert!(matches!(blank, Err(AppError::Validation(_))));

    let garbled = events.create(1, &new_event("Call", "tomorrow-ish", "2025-09-01T11:00")).await;
    assert!(matches!(garbled, Err(AppError::Validation(_))));

    let backwards = events.create(1, &new_event("Call", "2025-09-01T11:00", "2025-09-01T10:00")).await;
    assert!(matches!(backwards, Err(AppError::Validation(_))));

    assert!(events.list(1).await.is_empty());
}

#[tokio::test]
async fn updates_are_scoped_to_owner() {
    let events = EventService::new(DB::in_memory(event::TABLE_NAME).shared());
    let created = events
        .create(1, &new_event("Mine", "2025-09-01T10:00", "2025-09-01T11:00"))
        .await
        .unwrap();

    let patch = EventPatch {
        title: Some("Stolen".to_string()),
        ..EventPatch::default()
    };
    assert!(matches!(events.update(2, created.id, &patch).await, Err(AppError::NotFound(_))));
    assert!(events.get(2, created.id).await.is_none());
    assert_eq!(events.get(1, created.id).await.unwrap().title, "Mine");
}

#[tokio::test]
async fn tables_survive_reload() {
    let dir = tempfile::tempdir().unwrap();
    let location = dir.path().to_str().unwrap();

    {
        let events = EventService::new(load_db::<CalendarEvent>(location, event::TABLE_NAME).unwrap().shared());
        events
            .create(3, &new_event("Persisted", "2025-10-10", "2025-10-10T10:00"))
            .await
            .unwrap();
        let turns = ConversationService::new(load_db::<ChatTurn>(location, conversation::TABLE_NAME).unwrap().shared());
        turns.record(3, Role::User, "remember me").await.unwrap();
    }

    let events = EventService::new(load_db::<CalendarEvent>(location, event::TABLE_NAME).unwrap().shared());
    let listed = events.list(3).await;
    assert_eq!(listed.len(), 1);
    assert_eq!(EventView::from(&listed[0]).start, "2025-10-10T09:00:00");

    let turns = ConversationService::new(load_db::<ChatTurn>(location, conversation::TABLE_NAME).unwrap().shared());
    let history = turns.recent(3, 5).await;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].content, "remember me");
}
