use std::collections::HashMap;

use chrono::Utc;
use chrono_tz::Tz;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tracing::info;
use uuid::Uuid;

use crate::db::SharedDB;
use crate::error::{AppError, Result};
use crate::models::user::{self, User};

const HASH_SCHEME: &str = "sha256";

pub const DEMO_USERNAME: &str = "demo";
pub const DEMO_EMAIL: &str = "demo@example.com";
pub const DEMO_PASSWORD: &str = "demo123";

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterRequest {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub username: Option<String>,
    pub password: Option<String>,
}

/// `sha256$<salt>$<hex digest of salt || password>`.
pub fn hash_password(password: &str) -> String {
    let salt = Uuid::new_v4().simple().to_string();
    format!("{}${}${}", HASH_SCHEME, salt, digest(&salt, password))
}

pub fn verify_password(password: &str, stored: &str) -> bool {
    let mut parts = stored.splitn(3, '$');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(HASH_SCHEME), Some(salt), Some(expected)) => digest(salt, password) == expected,
        _ => false,
    }
}

fn digest(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

fn required(value: &Option<String>, message: &str) -> Result<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| AppError::Validation(message.to_string()))
}

/// Bearer tokens issued at login, held in memory only.
#[derive(Default)]
pub struct SessionStore {
    tokens: Mutex<HashMap<String, u64>>,
}

impl SessionStore {
    pub async fn issue(&self, user_id: u64) -> String {
        let token = Uuid::new_v4().simple().to_string();
        self.tokens.lock().await.insert(token.clone(), user_id);
        token
    }

    pub async fn resolve(&self, token: &str) -> Option<u64> {
        self.tokens.lock().await.get(token).copied()
    }

    pub async fn revoke(&self, token: &str) -> bool {
        self.tokens.lock().await.remove(token).is_some()
    }
}

pub struct AccountService {
    users: SharedDB<User>,
    sessions: SessionStore,
}

impl AccountService {
    pub fn new(users: SharedDB<User>) -> Self {
        Self {
            users,
            sessions: SessionStore::default(),
        }
    }

    /// Creates the account and signs it in.
    pub async fn register(&self, request: &RegisterRequest) -> Result<(User, String)> {
        let username = required(&request.username, "Username is required")?;
        let email = required(&request.email, "Email is required")?;
        let password = required(&request.password, "Password is required")?;

        let created = self.create(&username, &email, &password).await?;
        let token = self.sessions.issue(created.id).await;
        Ok((created, token))
    }

    async fn create(&self, username: &str, email: &str, password: &str) -> Result<User> {
        let mut users = self.users.lock().await;
        if user::find_by_username(&users, username).is_some() {
            return Err(AppError::Conflict("Username already exists".to_string()));
        }
        if user::find_by_email(&users, email).is_some() {
            return Err(AppError::Conflict("Email already exists".to_string()));
        }
        let created = user::create_user(&mut users, username, email, &hash_password(password), Utc::now())?;
        info!(user_id = created.id, "user registered");
        Ok(created)
    }

    pub async fn login(&self, request: &LoginRequest) -> Result<(User, String)> {
        let invalid = || AppError::Unauthorized("Invalid credentials".to_string());
        let username = request.username.as_deref().unwrap_or_default();
        let password = request.password.as_deref().unwrap_or_default();

        let found = {
            let users = self.users.lock().await;
            user::find_by_username(&users, username).cloned()
        };
        let found = found
            .filter(|u| verify_password(password, &u.password_hash))
            .ok_or_else(invalid)?;
        let token = self.sessions.issue(found.id).await;
        info!(user_id = found.id, "user logged in");
        Ok((found, token))
    }

    pub async fn logout(&self, token: &str) -> bool {
        self.sessions.revoke(token).await
    }

    /// Resolves a bearer token to its user.
    pub async fn authenticate(&self, token: Option<&str>) -> Result<User> {
        let unauthorized = || AppError::Unauthorized("Authentication required".to_string());
        let user_id = match token {
            Some(token) => self.sessions.resolve(token).await.ok_or_else(unauthorized)?,
            None => return Err(unauthorized()),
        };
        let users = self.users.lock().await;
        user::find_by_id(&users, user_id).cloned().ok_or_else(unauthorized)
    }

    pub async fn find_by_username(&self, username: &str) -> Option<User> {
        let users = self.users.lock().await;
        user::find_by_username(&users, username).cloned()
    }

    pub async fn update_timezone(&self, user_id: u64, timezone: Option<&str>) -> Result<User> {
        let timezone = timezone
            .map(str::trim)
            .filter(|tz| !tz.is_empty())
            .ok_or_else(|| AppError::Validation("Timezone is required".to_string()))?;
        if timezone.parse::<Tz>().is_err() {
            return Err(AppError::Validation(format!("Unknown timezone: {}", timezone)));
        }
        let mut users = self.users.lock().await;
        user::set_timezone(&mut users, user_id, timezone)?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))
    }

    /// Creates the demo account unless it already exists. `None` when it did.
    pub async fn seed_demo(&self) -> Result<Option<User>> {
        if self.find_by_username(DEMO_USERNAME).await.is_some() {
            return Ok(None);
        }
        self.create(DEMO_USERNAME, DEMO_EMAIL, DEMO_PASSWORD).await.map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::DB;

    fn service() -> AccountService {
        AccountService::new(DB::in_memory(user::TABLE_NAME).shared())
    }

    fn register_request(username: &str, email: &str) -> RegisterRequest {
        RegisterRequest {
            username: Some(username.to_string()),
            email: Some(email.to_string()),
            password: Some("hunter2".to_string()),
        }
    }

    #[test]
    fn password_hash_round_trip() {
        let stored = hash_password("hunter2");
        assert!(stored.starts_with("sha256$"));
        assert!(verify_password("hunter2", &stored));
        assert!(!verify_password("hunter3", &stored));
        assert!(!verify_password("hunter2", "plaintext"));
        assert_ne!(hash_password("hunter2"), stored);
    }

    #[tokio::test]
    async fn register_login_authenticate_logout() {
        let accounts = service();
        let (created, first_token) = accounts.register(&register_request("ada", "ada@example.com")).await.unwrap();
        assert_eq!(accounts.authenticate(Some(&first_token)).await.unwrap().id, created.id);

        let (_, token) = accounts
            .login(&LoginRequest {
                username: Some("ada".to_string()),
                password: Some("hunter2".to_string()),
            })
            .await
            .unwrap();
        assert!(accounts.logout(&token).await);
        assert!(matches!(
            accounts.authenticate(Some(&token)).await,
            Err(AppError::Unauthorized(_))
        ));
        assert!(matches!(accounts.authenticate(None).await, Err(AppError::Unauthorized(_))));
    }

    #[tokio::test]
    async fn duplicates_and_bad_passwords_are_rejected() {
        let accounts = service();
        accounts.register(&register_request("ada", "ada@example.com")).await.unwrap();

        let err = accounts.register(&register_request("ada", "other@example.com")).await.unwrap_err();
        assert_eq!(err.to_string(), "Username already exists");
        let err = accounts.register(&register_request("bob", "ada@example.com")).await.unwrap_err();
        assert_eq!(err.to_string(), "Email already exists");

        let err = accounts
            .login(&LoginRequest {
                username: Some("ada".to_string()),
                password: Some("wrong".to_string()),
            })
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 401);
    }

    #[tokio::test]
    async fn missing_register_fields_are_validation_errors() {
        let accounts = service();
        let err = accounts
            .register(&RegisterRequest {
                username: Some("ada".to_string()),
                email: None,
                password: Some("x".to_string()),
            })
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Email is required");
    }

    #[tokio::test]
    async fn timezone_must_be_known() {
        let accounts = service();
        let (created, _) = accounts.register(&register_request("ada", "ada@example.com")).await.unwrap();
        assert_eq!(
            accounts.update_timezone(created.id, Some("  ")).await.unwrap_err().to_string(),
            "Timezone is required"
        );
        assert!(accounts.update_timezone(created.id, Some("Mars/Olympus")).await.is_err());
        let updated = accounts.update_timezone(created.id, Some("Asia/Tokyo")).await.unwrap();
        assert_eq!(updated.timezone, "Asia/Tokyo");
    }

    #[tokio::test]
    async fn seed_demo_runs_once() {
        let accounts = service();
        assert!(accounts.seed_demo().await.unwrap().is_some());
        assert!(accounts.seed_demo().await.unwrap().is_none());
        let demo = accounts.find_by_username(DEMO_USERNAME).await.unwrap();
        assert!(verify_password(DEMO_PASSWORD, &demo.password_hash));
    }
}
