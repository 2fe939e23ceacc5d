//! Error types shared by the services and the HTTP layer.

use thiserror::Error;

use crate::db::DBError;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    /// Bad or missing client input. The message is shown to the caller.
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Rate limit exceeded")]
    RateLimited,

    #[error("Database error: {0}")]
    Database(#[from] DBError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn status_code(&self) -> u16 {
        match self {
            AppError::Validation(_) | AppError::Conflict(_) => 400,
            AppError::Unauthorized(_) => 401,
            AppError::NotFound(_) => 404,
            AppError::RateLimited => 429,
            AppError::Database(_) | AppError::Internal(_) => 500,
        }
    }

    /// Message safe to return to a client. System faults never leak their
    /// detail; the caller supplies the generic text for its route.
    pub fn public_message(&self, fallback: &str) -> String {
        match self {
            AppError::Database(_) | AppError::Internal(_) => fallback.to_string(),
            other => other.to_string(),
        }
    }

    pub fn is_system(&self) -> bool {
        self.status_code() >= 500
    }
}
