//! Job event types.
//!
//! Events flow through the notification bridge: the worker publishes
//! progress while a job runs, the webhook handler publishes callback events,
//! and the live update stream forwards everything to clients.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::job::{JobRecord, JobStatus};

/// An event on a job's notification channel.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobEvent {
    /// Current job snapshot, emitted first on every live stream
    Snapshot {
        #[serde(rename = "jobId")]
        job_id: String,
        status: JobStatus,
        progress: u8,
        #[serde(skip_serializing_if = "Option::is_none")]
        current_step: Option<String>,
        total_scenes: u32,
        processed_scenes: u32,
        #[serde(skip_serializing_if = "Option::is_none")]
        error_message: Option<String>,
        updated_at: DateTime<Utc>,
    },

    /// Log message with timestamp
    Log {
        message: String,
        timestamp: DateTime<Utc>,
    },

    /// Progress update (0-100)
    Progress { value: u8 },

    /// Stage transition
    Step {
        status: JobStatus,
        step: String,
        timestamp: DateTime<Utc>,
    },

    /// External callback received from the AI service
    Callback {
        status: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
        timestamp: DateTime<Utc>,
    },

    /// Error message
    Error {
        message: String,
        timestamp: DateTime<Utc>,
    },

    /// Processing complete
    Done {
        #[serde(rename = "videoId")]
        video_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        output_path: Option<String>,
    },
}

impl JobEvent {
    /// Create a snapshot event from a job record.
    pub fn snapshot(job: &JobRecord) -> Self {
        JobEvent::Snapshot {
            job_id: job.id.to_string(),
            status: job.status,
            progress: job.progress,
            current_step: job.current_step.clone(),
            total_scenes: job.total_scenes,
            processed_scenes: job.processed_scenes,
            error_message: job.error_message.clone(),
            updated_at: job.updated_at,
        }
    }

    /// Create a log event.
    pub fn log(message: impl Into<String>) -> Self {
        JobEvent::Log {
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    /// Create a progress event.
    pub fn progress(value: u8) -> Self {
        JobEvent::Progress {
            value: value.min(100),
        }
    }

    /// Create a step event.
    pub fn step(status: JobStatus, step: impl Into<String>) -> Self {
        JobEvent::Step {
            status,
            step: step.into(),
            timestamp: Utc::now(),
        }
    }

    /// Create a callback event from an authenticated webhook payload.
    pub fn callback(payload: &WebhookPayload) -> Self {
        JobEvent::Callback {
            status: payload.status.clone(),
            detail: payload.detail.clone(),
            timestamp: Utc::now(),
        }
    }

    /// Create an error event.
    pub fn error(message: impl Into<String>) -> Self {
        JobEvent::Error {
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    /// Create a done event.
    pub fn done(video_id: impl Into<String>, output_path: Option<String>) -> Self {
        JobEvent::Done {
            video_id: video_id.into(),
            output_path,
        }
    }

    /// Whether observing this event ends a live update stream.
    pub fn is_terminal(&self) -> bool {
        match self {
            JobEvent::Done { .. } | JobEvent::Error { .. } => true,
            JobEvent::Snapshot { status, .. } | JobEvent::Step { status, .. } => {
                status.is_terminal()
            }
            _ => false,
        }
    }
}

/// JSON body of an inbound webhook callback from the AI service.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct WebhookPayload {
    /// Remote processing status (e.g. "completed", "failed")
    pub status: String,

    /// Optional human-readable detail
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{JobOptions, VideoId};

    #[test]
    fn test_event_serialization() {
        let event = JobEvent::log("Segmenting timeline");
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"log\""));
        assert!(json.contains("\"message\":\"Segmenting timeline\""));
    }

    #[test]
    fn test_progress_clamps() {
        if let JobEvent::Progress { value } = JobEvent::progress(150) {
            assert_eq!(value, 100);
        } else {
            panic!("Expected Progress event");
        }
    }

    #[test]
    fn test_snapshot_roundtrip() {
        let job = JobRecord::new(VideoId::new(), "a.mp4", JobOptions::default());
        let event = JobEvent::snapshot(&job);
        let json = serde_json::to_string(&event).unwrap();
        let parsed: JobEvent = serde_json::from_str(&json).unwrap();
        assert!(!parsed.is_terminal());
    }

    #[test]
    fn test_terminal_events() {
        assert!(JobEvent::done("video-1", None).is_terminal());
        assert!(JobEvent::error("boom").is_terminal());
        assert!(!JobEvent::progress(50).is_terminal());
        assert!(!JobEvent::step(JobStatus::Stitching, "Stitching recap").is_terminal());
        assert!(JobEvent::step(JobStatus::Completed, "Complete").is_terminal());
    }
}
