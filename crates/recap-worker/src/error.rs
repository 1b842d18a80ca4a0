//! Worker error types.

use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Job failed: {0}")]
    JobFailed(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Store error: {0}")]
    Store(#[from] recap_store::StoreError),

    #[error("Notification error: {0}")]
    Notify(#[from] recap_notify::NotifyError),

    #[error("Media error: {0}")]
    Media(#[from] recap_media::MediaError),

    #[error("AI service error: {0}")]
    Ai(#[from] recap_ai_client::AiError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn job_failed(msg: impl Into<String>) -> Self {
        Self::JobFailed(msg.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Short message stored on a failed job.
    ///
    /// Media errors carry a pre-sanitized user message; everything else is
    /// summarized so raw diagnostics never reach clients. Full detail stays
    /// in the server-side logs.
    pub fn user_message(&self) -> String {
        match self {
            WorkerError::Media(e) => e.user_message(),
            WorkerError::Ai(_) => "The AI description service failed. Please try again.".to_string(),
            WorkerError::JobFailed(msg) => msg.clone(),
            WorkerError::Io(_) => "A file operation failed while processing the video.".to_string(),
            WorkerError::Store(_) | WorkerError::Notify(_) => {
                "An internal error interrupted processing. Please try again.".to_string()
            }
            WorkerError::ConfigError(_) => "The worker is misconfigured.".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_timeout_user_message() {
        let err = WorkerError::Media(recap_media::MediaError::Timeout(120));
        assert!(err.user_message().contains("timed out after 120s"));
    }

    #[test]
    fn test_ai_error_is_generic_to_users() {
        let err = WorkerError::Ai(recap_ai_client::AiError::RequestFailed(
            "500 stack trace with internals".to_string(),
        ));
        assert!(!err.user_message().contains("stack trace"));
    }
}
