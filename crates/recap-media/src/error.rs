//! Error types for media operations.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can occur during media processing.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("FFmpeg not found in PATH")]
    FfmpegNotFound,

    #[error("FFprobe not found in PATH")]
    FfprobeNotFound,

    #[error("Command failed: {message}")]
    CommandFailed {
        /// Short, sanitized message suitable for user-facing errors
        message: String,
        /// Full diagnostic stream for operators
        stderr: String,
        /// Captured stdout
        stdout: String,
        /// Exit code, if the process exited normally
        exit_code: Option<i32>,
        /// The exact command line that was executed
        command: String,
    },

    #[error("Command timed out after {0}s")]
    Timeout(u64),

    #[error("Command was killed, likely out of memory")]
    LikelyOom {
        /// The exact command line that was executed
        command: String,
    },

    #[error("Invalid duration: {0}")]
    InvalidDuration(f64),

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Invalid video file: {0}")]
    InvalidVideo(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),
}

impl MediaError {
    /// Create a command failure error.
    pub fn command_failed(
        message: impl Into<String>,
        stderr: impl Into<String>,
        stdout: impl Into<String>,
        exit_code: Option<i32>,
        command: impl Into<String>,
    ) -> Self {
        Self::CommandFailed {
            message: message.into(),
            stderr: stderr.into(),
            stdout: stdout.into(),
            exit_code,
            command: command.into(),
        }
    }

    /// Short message suitable for storing on a failed job.
    ///
    /// `CommandFailed::message` is already sanitized by the runner; the
    /// other variants render a short actionable line. Full diagnostics stay
    /// in the error value for server-side logging.
    pub fn user_message(&self) -> String {
        match self {
            MediaError::CommandFailed { message, .. } => {
                format!("Video processing failed: {}", message)
            }
            MediaError::Timeout(secs) => {
                format!("Video processing timed out after {}s", secs)
            }
            MediaError::LikelyOom { .. } => {
                "Video processing ran out of memory. Try a shorter or lower-resolution video, \
                 or reduce the worker's concurrent transcodes."
                    .to_string()
            }
            MediaError::InvalidDuration(d) => {
                format!("Cannot process a video with duration {}s", d)
            }
            other => other.to_string(),
        }
    }

    /// Check whether this error came from a timed-out command.
    pub fn is_timeout(&self) -> bool {
        matches!(self, MediaError::Timeout(_))
    }
}
