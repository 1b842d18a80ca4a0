//! Scene records.
//!
//! A scene is one contiguous narration block of the source timeline. Scenes
//! are created by the segmenter and enriched by the description, narration
//! and stitching stages. Once a job is terminal its scene list is frozen.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A contiguous time interval of the source video treated as a narration unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Scene {
    /// 0-based contiguous index within the job
    pub index: u32,

    /// Start time in seconds
    pub start: f64,

    /// End time in seconds
    pub end: f64,

    /// Duration in seconds
    pub duration: f64,

    /// Path of the extracted scene clip
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clip_path: Option<String>,

    /// Path of the representative frame image
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame_path: Option<String>,

    /// Path of the synthesized narration audio
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_path: Option<String>,

    /// Narration text from the AI description stage
    #[serde(skip_serializing_if = "Option::is_none")]
    pub narration: Option<String>,

    /// Whether all enrichment stages have run for this scene
    #[serde(default)]
    pub processed: bool,
}

impl Scene {
    /// Create a new unprocessed scene for the interval `[start, end)`.
    pub fn new(index: u32, start: f64, end: f64) -> Self {
        Self {
            index,
            start,
            end,
            duration: end - start,
            clip_path: None,
            frame_path: None,
            audio_path: None,
            narration: None,
            processed: false,
        }
    }

    /// Attach narration text.
    pub fn with_narration(mut self, narration: impl Into<String>) -> Self {
        self.narration = Some(narration.into());
        self
    }

    /// Mark the scene fully processed.
    pub fn mark_processed(&mut self) {
        self.processed = true;
    }
}

/// Check that scenes are ordered by index, contiguous in time and
/// non-overlapping. Used by tests and by the store's invariant checks.
pub fn scenes_are_contiguous(scenes: &[Scene]) -> bool {
    const EPSILON: f64 = 1e-6;

    for (i, scene) in scenes.iter().enumerate() {
        if scene.index != i as u32 {
            return false;
        }
        if scene.end <= scene.start {
            return false;
        }
        if i > 0 && (scene.start - scenes[i - 1].end).abs() > EPSILON {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scene_duration() {
        let scene = Scene::new(0, 7.0, 14.0);
        assert!((scene.duration - 7.0).abs() < 1e-9);
        assert!(!scene.processed);
    }

    #[test]
    fn test_contiguous_scenes() {
        let scenes = vec![
            Scene::new(0, 0.0, 7.0),
            Scene::new(1, 7.0, 14.0),
            Scene::new(2, 14.0, 20.0),
        ];
        assert!(scenes_are_contiguous(&scenes));
    }

    #[test]
    fn test_gap_detected() {
        let scenes = vec![Scene::new(0, 0.0, 7.0), Scene::new(1, 8.0, 14.0)];
        assert!(!scenes_are_contiguous(&scenes));
    }

    #[test]
    fn test_bad_index_detected() {
        let scenes = vec![Scene::new(0, 0.0, 7.0), Scene::new(3, 7.0, 14.0)];
        assert!(!scenes_are_contiguous(&scenes));
    }
}
