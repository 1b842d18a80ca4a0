//! Notification bridge error types.

use thiserror::Error;

pub type NotifyResult<T> = Result<T, NotifyError>;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Invalid or expired webhook token")]
    InvalidToken,

    #[error("Invalid webhook signature")]
    InvalidSignature,

    #[error("Invalid callback payload: {0}")]
    InvalidPayload(String),

    #[error("Store error: {0}")]
    Store(#[from] recap_store::StoreError),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl NotifyError {
    /// Check if the error is an authentication failure (the caller should
    /// answer 401/403 rather than 500).
    pub fn is_authentication(&self) -> bool {
        matches!(
            self,
            NotifyError::InvalidToken | NotifyError::InvalidSignature
        )
    }
}
