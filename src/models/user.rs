use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db::{DB, DBError};

pub const TABLE_NAME: &str = "users";
pub const DEFAULT_TIMEZONE: &str = "UTC";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: u64,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub timezone: String,
    pub created_at: DateTime<Utc>,
}

/// What a user may see about their own account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserProfile {
    pub id: u64,
    pub username: String,
    pub email: String,
    pub timezone: String,
}

impl From<&User> for UserProfile {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
            timezone: user.timezone.clone(),
        }
    }
}

pub fn find_by_id(db: &DB<User>, id: u64) -> Option<&User> {
    db.get(&id.to_string())
}

pub fn find_by_username<'a>(db: &'a DB<User>, username: &str) -> Option<&'a User> {
    db.values().find(|user| user.username == username)
}

pub fn find_by_email<'a>(db: &'a DB<User>, email: &str) -> Option<&'a User> {
    db.values().find(|user| user.email.eq_ignore_ascii_case(email))
}

pub fn create_user(
    db: &mut DB<User>,
    username: &str,
    email: &str,
    password_hash: &str,
    now: DateTime<Utc>,
) -> Result<User, DBError> {
    let id = db.values().map(|user| user.id).max().unwrap_or(0) + 1;
    let user = User {
        id,
        username: username.to_string(),
        email: email.to_string(),
        password_hash: password_hash.to_string(),
        timezone: DEFAULT_TIMEZONE.to_string(),
        created_at: now,
    };
    let key = id.to_string();
    db.insert(key.clone(), user.clone());
    if let Err(err) = db.save() {
        db.remove(&key);
        return Err(err);
    }
    Ok(user)
}

pub fn set_timezone(db: &mut DB<User>, id: u64, timezone: &str) -> Result<Option<User>, DBError> {
    let key = id.to_string();
    let Some(user) = db.get_mut(&key) else {
        return Ok(None);
    };
    let previous = std::mem::replace(&mut user.timezone, timezone.to_string());
    let updated = user.clone();
    if let Err(err) = db.save() {
        if let Some(user) = db.get_mut(&key) {
            user.timezone = previous;
        }
        return Err(err);
    }
    Ok(Some(updated))
}
