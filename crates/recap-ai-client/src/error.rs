//! AI client error types.

use thiserror::Error;

pub type AiResult<T> = Result<T, AiError>;

#[derive(Debug, Error)]
pub enum AiError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl AiError {
    /// Check if the error is worth retrying.
    pub fn is_retryable(&self) -> bool {
        match self {
            AiError::Network(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }
}
