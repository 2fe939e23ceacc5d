use chrono::Utc;

use crate::db::SharedDB;
use crate::error::Result;
use crate::models::conversation::{self, ChatTurn, Role};

/// Append-only conversation log, one thread per user.
#[derive(Clone)]
pub struct ConversationService {
    db: SharedDB<ChatTurn>,
}

impl ConversationService {
    pub fn new(db: SharedDB<ChatTurn>) -> Self {
        Self { db }
    }

    pub async fn record(&self, user_id: u64, role: Role, content: &str) -> Result<ChatTurn> {
        let mut db = self.db.lock().await;
        Ok(conversation::append_turn(&mut db, user_id, role, content, Utc::now())?)
    }

    /// Most recent `limit` turns, oldest first.
    pub async fn recent(&self, user_id: u64, limit: usize) -> Vec<ChatTurn> {
        let db = self.db.lock().await;
        conversation::recent_turns(&db, user_id, limit)
    }
}
