//! Job definitions and the job status state machine.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::scene::Scene;

/// Unique identifier for a processing job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for an uploaded video.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct VideoId(pub String);

impl VideoId {
    /// Generate a new random video ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for VideoId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for VideoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Job processing status.
///
/// The statuses form an ordered progression through the recap pipeline.
/// `Completed` and `Failed` are terminal: once a job reaches either, the
/// store refuses all further status mutation.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
    Default,
)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Job created, waiting for a worker
    #[default]
    Pending,
    /// Source video is being uploaded
    Uploading,
    /// Worker is probing/compressing/chunking the source
    Processing,
    /// Segmenting the timeline into narration scenes
    DetectingScenes,
    /// Waiting on the AI service for scene descriptions
    GeneratingDescriptions,
    /// Synthesizing narration audio
    GeneratingAudio,
    /// Assembling the final recap
    Stitching,
    /// Recap finished successfully
    Completed,
    /// Job failed with an error
    Failed,
}

impl JobStatus {
    /// Get string representation of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Uploading => "uploading",
            JobStatus::Processing => "processing",
            JobStatus::DetectingScenes => "detecting_scenes",
            JobStatus::GeneratingDescriptions => "generating_descriptions",
            JobStatus::GeneratingAudio => "generating_audio",
            JobStatus::Stitching => "stitching",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    /// Check if this is a terminal state (no more transitions permitted).
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Owner/priority metadata supplied at job creation.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct JobOptions {
    /// Owning user, if the upload was authenticated
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,

    /// Plan tier of the owner (free/pro/...)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan_tier: Option<String>,

    /// Whether the job should be picked up ahead of normal jobs
    #[serde(default)]
    pub priority: bool,
}

/// Final output of a completed recap job.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RecapOutput {
    /// Path (or storage key) of the stitched recap video
    pub output_path: String,

    /// Duration of the recap in seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,

    /// Size of the recap in bytes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
}

/// The authoritative record for a processing job.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct JobRecord {
    /// Unique job ID
    pub id: JobId,

    /// Source video ID
    pub video_id: VideoId,

    /// Original filename of the upload
    pub filename: String,

    /// Current status
    #[serde(default)]
    pub status: JobStatus,

    /// Progress (0-100)
    #[serde(default)]
    pub progress: u8,

    /// Human-readable current step
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_step: Option<String>,

    /// Total number of scenes detected
    #[serde(default)]
    pub total_scenes: u32,

    /// Number of scenes fully processed
    #[serde(default)]
    pub processed_scenes: u32,

    /// Scene records, ordered by index
    #[serde(default)]
    pub scenes: Vec<Scene>,

    /// Error message (if failed)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    /// Final output (once completed)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<RecapOutput>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,

    /// Owning user
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,

    /// Plan tier of the owner
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan_tier: Option<String>,

    /// Priority flag
    #[serde(default)]
    pub priority: bool,
}

impl JobRecord {
    /// Create a new job in `Pending` for a freshly uploaded video.
    pub fn new(video_id: VideoId, filename: impl Into<String>, options: JobOptions) -> Self {
        let now = Utc::now();

        Self {
            id: JobId::new(),
            video_id,
            filename: filename.into(),
            status: JobStatus::Pending,
            progress: 0,
            current_step: None,
            total_scenes: 0,
            processed_scenes: 0,
            scenes: Vec::new(),
            error_message: None,
            output: None,
            created_at: now,
            updated_at: now,
            user_id: options.user_id,
            plan_tier: options.plan_tier,
            priority: options.priority,
        }
    }

    /// Check if the job is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Apply a non-terminal field patch.
    ///
    /// The caller (the store) is responsible for rejecting patches against
    /// terminal jobs; this method only merges fields.
    pub fn apply_update(&mut self, update: &JobUpdate) {
        if let Some(status) = update.status {
            self.status = status;
        }
        if let Some(progress) = update.progress {
            self.progress = progress.min(100);
        }
        if let Some(ref step) = update.current_step {
            self.current_step = Some(step.clone());
        }
        if let Some(ref scenes) = update.scenes {
            self.scenes = scenes.clone();
        }
        if let Some(total) = update.total_scenes {
            self.total_scenes = total;
        }
        if let Some(processed) = update.processed_scenes {
            self.processed_scenes = processed;
        }
        self.updated_at = Utc::now();
    }

    /// Mark the job completed with its final output and scene list.
    pub fn complete(&mut self, output: RecapOutput, scenes: Vec<Scene>) {
        self.status = JobStatus::Completed;
        self.progress = 100;
        self.current_step = Some("Complete".into());
        self.total_scenes = scenes.len() as u32;
        self.processed_scenes = scenes.len() as u32;
        self.scenes = scenes;
        self.output = Some(output);
        self.updated_at = Utc::now();
    }

    /// Mark the job failed with an error message and the step it failed at.
    pub fn fail(&mut self, error: impl Into<String>, step: impl Into<String>) {
        self.status = JobStatus::Failed;
        self.error_message = Some(error.into());
        self.current_step = Some(step.into());
        self.updated_at = Utc::now();
    }
}

/// A non-terminal field patch for [`JobRecord`].
///
/// Built by the worker between pipeline stages and applied through the
/// store's guarded `update` operation.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct JobUpdate {
    /// New (non-terminal) status
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<JobStatus>,

    /// New progress value (0-100)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,

    /// New current step label
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_step: Option<String>,

    /// Replacement scene list
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scenes: Option<Vec<Scene>>,

    /// New total scene count
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_scenes: Option<u32>,

    /// New processed scene count
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processed_scenes: Option<u32>,
}

impl JobUpdate {
    /// Create an empty patch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the (non-terminal) status.
    pub fn with_status(mut self, status: JobStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Set progress.
    pub fn with_progress(mut self, progress: u8) -> Self {
        self.progress = Some(progress.min(100));
        self
    }

    /// Set the current step label.
    pub fn with_step(mut self, step: impl Into<String>) -> Self {
        self.current_step = Some(step.into());
        self
    }

    /// Set the scene list.
    pub fn with_scenes(mut self, scenes: Vec<Scene>) -> Self {
        self.total_scenes = Some(scenes.len() as u32);
        self.scenes = Some(scenes);
        self
    }

    /// Set the processed scene counter.
    pub fn with_processed_scenes(mut self, processed: u32) -> Self {
        self.processed_scenes = Some(processed);
        self
    }

    /// Check whether the patch carries any fields.
    pub fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.progress.is_none()
            && self.current_step.is_none()
            && self.scenes.is_none()
            && self.total_scenes.is_none()
            && self.processed_scenes.is_none()
    }

    /// Names of the fields carried by this patch, for logging.
    pub fn field_names(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        if self.status.is_some() {
            names.push("status");
        }
        if self.progress.is_some() {
            names.push("progress");
        }
        if self.current_step.is_some() {
            names.push("current_step");
        }
        if self.scenes.is_some() {
            names.push("scenes");
        }
        if self.total_scenes.is_some() {
            names.push("total_scenes");
        }
        if self.processed_scenes.is_some() {
            names.push("processed_scenes");
        }
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_creation() {
        let job = JobRecord::new(VideoId::new(), "holiday.mp4", JobOptions::default());

        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.progress, 0);
        assert!(!job.is_terminal());
        assert!(job.scenes.is_empty());
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Stitching.is_terminal());
    }

    #[test]
    fn test_status_ordering() {
        assert!(JobStatus::Pending < JobStatus::Processing);
        assert!(JobStatus::DetectingScenes < JobStatus::Stitching);
        assert!(JobStatus::Stitching < JobStatus::Completed);
    }

    #[test]
    fn test_apply_update_clamps_progress() {
        let mut job = JobRecord::new(VideoId::new(), "a.mp4", JobOptions::default());
        job.apply_update(&JobUpdate::new().with_progress(150));
        assert_eq!(job.progress, 100);
    }

    #[test]
    fn test_complete_fills_counters() {
        let mut job = JobRecord::new(VideoId::new(), "a.mp4", JobOptions::default());
        let scenes = vec![Scene::new(0, 0.0, 7.0), Scene::new(1, 7.0, 14.0)];

        job.complete(
            RecapOutput {
                output_path: "out/recap.mp4".into(),
                duration: Some(14.0),
                size_bytes: None,
            },
            scenes,
        );

        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.progress, 100);
        assert_eq!(job.total_scenes, 2);
        assert_eq!(job.processed_scenes, 2);
    }

    #[test]
    fn test_update_field_names() {
        let update = JobUpdate::new()
            .with_status(JobStatus::Processing)
            .with_progress(10);
        assert_eq!(update.field_names(), vec!["status", "progress"]);
        assert!(!update.is_empty());
        assert!(JobUpdate::new().is_empty());
    }

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_string(&JobStatus::DetectingScenes).unwrap();
        assert_eq!(json, "\"detecting_scenes\"");
    }
}
