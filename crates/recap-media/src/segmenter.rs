//! Fixed-block scene segmentation.
//!
//! Partitions a video timeline into contiguous narration blocks. Blocks are
//! a fixed size; a trailing block shorter than the merge threshold is folded
//! into its predecessor so no scene is too short to narrate.

use recap_models::Scene;

use crate::error::{MediaError, MediaResult};

/// Default narration block size in seconds.
pub const DEFAULT_BLOCK_SECS: f64 = 7.0;

/// Default minimum tail length; shorter tails merge into the previous block.
pub const DEFAULT_MIN_TAIL_SECS: f64 = 3.0;

/// Cursor comparisons tolerate float drift up to this.
const EPSILON: f64 = 1e-6;

/// Segmenter configuration.
#[derive(Debug, Clone)]
pub struct SegmenterConfig {
    /// Block size in seconds
    pub block_secs: f64,
    /// Minimum trailing block length in seconds
    pub min_tail_secs: f64,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            block_secs: DEFAULT_BLOCK_SECS,
            min_tail_secs: DEFAULT_MIN_TAIL_SECS,
        }
    }
}

/// Partition `[0, total_duration]` into ordered, gapless scene blocks.
///
/// Deterministic for a given duration and config. A duration that is not
/// strictly positive is an input error: an unknown-length video cannot be
/// segmented.
pub fn segment_timeline(
    total_duration: f64,
    config: &SegmenterConfig,
) -> MediaResult<Vec<Scene>> {
    if total_duration <= 0.0 || !total_duration.is_finite() {
        return Err(MediaError::InvalidDuration(total_duration));
    }

    let mut blocks: Vec<(f64, f64)> = Vec::new();
    let mut cursor = 0.0;

    while cursor < total_duration - EPSILON {
        let end = (cursor + config.block_secs).min(total_duration);
        blocks.push((cursor, end));
        cursor = end;
    }

    // Fold a too-short tail into the preceding block.
    if blocks.len() >= 2 {
        let (last_start, last_end) = *blocks.last().expect("non-empty");
        if last_end - last_start < config.min_tail_secs {
            blocks.pop();
            let prev = blocks.last_mut().expect("non-empty");
            prev.1 = last_end;
        }
    }

    Ok(blocks
        .into_iter()
        .enumerate()
        .map(|(i, (start, end))| Scene::new(i as u32, start, end))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use recap_models::scene::scenes_are_contiguous;

    fn blocks(duration: f64) -> Vec<(f64, f64)> {
        segment_timeline(duration, &SegmenterConfig::default())
            .unwrap()
            .into_iter()
            .map(|s| (s.start, s.end))
            .collect()
    }

    #[test]
    fn test_even_multiple() {
        assert_eq!(blocks(14.0), vec![(0.0, 7.0), (7.0, 14.0)]);
    }

    #[test]
    fn test_long_tail_kept() {
        // 20s: tail of 6s is above the merge threshold
        assert_eq!(blocks(20.0), vec![(0.0, 7.0), (7.0, 14.0), (14.0, 20.0)]);
    }

    #[test]
    fn test_short_tail_merged() {
        // 22s: 1s tail folds into the third block
        assert_eq!(blocks(22.0), vec![(0.0, 7.0), (7.0, 14.0), (14.0, 22.0)]);
    }

    #[test]
    fn test_short_video_single_block() {
        assert_eq!(blocks(2.0), vec![(0.0, 2.0)]);
        assert_eq!(blocks(6.5), vec![(0.0, 6.5)]);
    }

    #[test]
    fn test_tail_merge_below_two_blocks() {
        // 8s: 1s tail merges into the first (and only remaining) block
        assert_eq!(blocks(8.0), vec![(0.0, 8.0)]);
    }

    #[test]
    fn test_invalid_duration() {
        let config = SegmenterConfig::default();
        assert!(matches!(
            segment_timeline(0.0, &config),
            Err(MediaError::InvalidDuration(_))
        ));
        assert!(matches!(
            segment_timeline(-4.0, &config),
            Err(MediaError::InvalidDuration(_))
        ));
        assert!(matches!(
            segment_timeline(f64::NAN, &config),
            Err(MediaError::InvalidDuration(_))
        ));
    }

    #[test]
    fn test_coverage_property() {
        let config = SegmenterConfig::default();

        let mut duration = 0.5;
        while duration < 130.0 {
            let scenes = segment_timeline(duration, &config).unwrap();

            assert!(!scenes.is_empty(), "duration {}", duration);
            assert!(scenes_are_contiguous(&scenes), "duration {}", duration);
            assert!(scenes[0].start.abs() < EPSILON, "duration {}", duration);
            assert!(
                (scenes.last().unwrap().end - duration).abs() < EPSILON,
                "duration {}",
                duration
            );

            // Every block past the first must survive the merge threshold.
            for scene in scenes.iter().skip(1) {
                assert!(
                    scene.duration >= config.min_tail_secs - EPSILON,
                    "duration {} produced short block {:?}",
                    duration,
                    scene
                );
            }

            duration += 0.7;
        }
    }

    #[test]
    fn test_exact_block_boundary_no_empty_tail() {
        let scenes = segment_timeline(21.0, &SegmenterConfig::default()).unwrap();
        assert_eq!(scenes.len(), 3);
        assert!((scenes.last().unwrap().end - 21.0).abs() < EPSILON);
    }
}
