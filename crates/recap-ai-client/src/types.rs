//! Request/response types for the recap AI service.

use serde::{Deserialize, Serialize};

use recap_models::Scene;

/// A scene window submitted for description.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneWindow {
    /// Scene index
    pub index: u32,
    /// Start time in seconds
    pub start: f64,
    /// End time in seconds
    pub end: f64,
}

impl From<&Scene> for SceneWindow {
    fn from(scene: &Scene) -> Self {
        Self {
            index: scene.index,
            start: scene.start,
            end: scene.end,
        }
    }
}

/// Description request for one video.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DescribeRequest {
    /// Video ID, echoed back in the callback payload
    pub video_id: String,
    /// Uploaded chunk references, in playback order
    pub chunks: Vec<String>,
    /// Scene windows to describe
    pub scenes: Vec<SceneWindow>,
    /// URL the service calls back when descriptions are ready
    pub callback_url: String,
}

/// Acknowledgement for a submitted description request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DescribeSubmission {
    /// The service's job handle, used for status polling
    pub remote_job_id: String,
}

/// One scene description from the service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneDescription {
    /// Scene index this description belongs to
    pub index: u32,
    /// Narration text
    pub text: String,
}

/// Status of a remote description job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteJobStatus {
    /// "queued", "processing", "completed" or "failed"
    pub status: String,
    /// Per-scene descriptions, present once completed
    #[serde(default)]
    pub descriptions: Vec<SceneDescription>,
    /// Error detail, present once failed
    #[serde(default)]
    pub error: Option<String>,
}

impl RemoteJobStatus {
    /// Whether the remote job reached a final state.
    pub fn is_finished(&self) -> bool {
        self.status == "completed" || self.status == "failed"
    }

    /// Whether the remote job finished successfully.
    pub fn is_completed(&self) -> bool {
        self.status == "completed"
    }
}

/// Narration synthesis request for one scene.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NarrationRequest {
    /// Text to narrate
    pub text: String,
    /// Voice preset, service default when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice: Option<String>,
}

/// Health check response.
#[derive(Debug, Clone, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scene_window_from_scene() {
        let scene = Scene::new(2, 14.0, 21.0);
        let window = SceneWindow::from(&scene);
        assert_eq!(window.index, 2);
        assert!((window.start - 14.0).abs() < 1e-9);
    }

    #[test]
    fn test_remote_status_finished() {
        let status: RemoteJobStatus =
            serde_json::from_str(r#"{"status":"completed","descriptions":[]}"#).unwrap();
        assert!(status.is_finished());
        assert!(status.is_completed());

        let status: RemoteJobStatus = serde_json::from_str(r#"{"status":"processing"}"#).unwrap();
        assert!(!status.is_finished());
    }
}
