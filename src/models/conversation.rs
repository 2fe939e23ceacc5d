use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::{DB, DBError};

pub const TABLE_NAME: &str = "conversations";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One message of a user's conversation log. Never mutated after insert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub id: String,
    pub user_id: u64,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    // Breaks ties between turns written within the same clock tick.
    pub sequence: u64,
}

pub fn append_turn(
    db: &mut DB<ChatTurn>,
    user_id: u64,
    role: Role,
    content: &str,
    timestamp: DateTime<Utc>,
) -> Result<ChatTurn, DBError> {
    let sequence = db
        .values()
        .map(|turn| turn.sequence)
        .max()
        .map_or(0, |last| last + 1);
    let turn = ChatTurn {
        id: Uuid::new_v4().to_string(),
        user_id,
        role,
        content: content.to_string(),
        timestamp,
        sequence,
    };
    db.insert(turn.id.clone(), turn.clone());
    if let Err(err) = db.save() {
        db.remove(&turn.id);
        return Err(err);
    }
    Ok(turn)
}

/// The last `limit` turns of a user, oldest first.
pub fn recent_turns(db: &DB<ChatTurn>, user_id: u64, limit: usize) -> Vec<ChatTurn> {
    let mut turns: Vec<ChatTurn> = db
        .values()
        .filter(|turn| turn.user_id == user_id)
        .cloned()
        .collect();
    turns.sort_by_key(|turn| (turn.timestamp, turn.sequence));
    let skip = turns.len().saturating_sub(limit);
    turns.split_off(skip)
}
