//! Adaptive-resolution compression.
//!
//! Rescales and re-bitrates an oversized video to fit a byte-size ceiling.
//! Resolution drops by height tier (4K to 1080p, 1440p to 720p, anything
//! lower unchanged) and the bitrate cap is derived from the byte budget and
//! duration, clamped to a sane kbps range.

use std::path::Path;

use tracing::{info, warn};

use crate::error::{MediaError, MediaResult};
use crate::probe::MediaInfo;
use crate::runner::{FfmpegCommand, ProcessRunner};

/// Default hard output-size ceiling (1.9 GB).
pub const DEFAULT_MAX_OUTPUT_BYTES: u64 = 1_900_000_000;

/// Fraction of the hard ceiling targeted as the byte budget, leaving margin.
pub const SIZE_BUDGET_FACTOR: f64 = 0.95;

/// Fraction of the budget given to the video stream; the rest absorbs
/// container and audio overhead.
pub const STREAM_OVERHEAD_FACTOR: f64 = 0.9;

/// Bitrate clamp range in kbps.
pub const MIN_BITRATE_KBPS: u32 = 500;
pub const MAX_BITRATE_KBPS: u32 = 8000;

/// Compression policy constants.
#[derive(Debug, Clone)]
pub struct CompressionPolicy {
    /// Hard ceiling on output size in bytes
    pub max_output_bytes: u64,
}

impl Default for CompressionPolicy {
    fn default() -> Self {
        Self {
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
        }
    }
}

/// A computed compression target. Transient; recomputed per invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct CompressionPlan {
    /// Target width in pixels (always even)
    pub target_width: u32,
    /// Target height in pixels
    pub target_height: u32,
    /// Video bitrate cap in kbps
    pub target_bitrate_kbps: u32,
    /// Whether a downscale is applied
    pub downscale: bool,
}

/// Outcome of [`compress_if_needed`].
#[derive(Debug, Clone, PartialEq)]
pub enum CompressOutcome {
    /// File was already under budget; no transform applied.
    Unchanged,
    /// File was re-encoded with the given plan.
    Compressed(CompressionPlan),
}

impl CompressOutcome {
    /// Whether a transform was applied.
    pub fn applied(&self) -> bool {
        matches!(self, CompressOutcome::Compressed(_))
    }
}

/// Compute the compression target for a source file.
pub fn plan_compression(
    info: &MediaInfo,
    policy: &CompressionPolicy,
) -> MediaResult<CompressionPlan> {
    if info.duration <= 0.0 || !info.duration.is_finite() {
        return Err(MediaError::InvalidDuration(info.duration));
    }

    let target_height = if info.height >= 2160 {
        1080
    } else if info.height >= 1440 {
        720
    } else {
        info.height
    };
    let downscale = target_height != info.height;

    let target_width = if downscale && info.height > 0 {
        let aspect = info.width as f64 / info.height as f64;
        let width = (target_height as f64 * aspect).round() as u32;
        // Codecs require even dimensions.
        width - (width % 2)
    } else {
        info.width - (info.width % 2)
    };

    let budget = policy.max_output_bytes as f64 * SIZE_BUDGET_FACTOR;
    let bitrate_kbps = (budget * STREAM_OVERHEAD_FACTOR * 8.0) / info.duration / 1000.0;
    let target_bitrate_kbps =
        (bitrate_kbps.round() as u32).clamp(MIN_BITRATE_KBPS, MAX_BITRATE_KBPS);

    Ok(CompressionPlan {
        target_width,
        target_height,
        target_bitrate_kbps,
        downscale,
    })
}

/// Compress `input` into `output` if it exceeds the size ceiling.
///
/// Idempotent: a file already under budget is returned unchanged with no
/// transform applied. After a transform the output size is verified; still
/// being over budget is logged, not fatal; the caller may chunk the result.
pub async fn compress_if_needed(
    runner: &ProcessRunner,
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    info: &MediaInfo,
    policy: &CompressionPolicy,
) -> MediaResult<CompressOutcome> {
    let input = input.as_ref();
    let output = output.as_ref();

    if info.size <= policy.max_output_bytes {
        return Ok(CompressOutcome::Unchanged);
    }

    let plan = plan_compression(info, policy)?;

    info!(
        "Compressing {} ({} bytes) to {}x{} at {} kbps",
        input.display(),
        info.size,
        plan.target_width,
        plan.target_height,
        plan.target_bitrate_kbps
    );

    let mut cmd = FfmpegCommand::new(input, output)
        .video_codec("libx264")
        .preset("veryfast")
        .video_bitrate_cap(plan.target_bitrate_kbps)
        .audio_codec("aac")
        .audio_bitrate("128k");

    if plan.downscale {
        cmd = cmd.video_filter(format!(
            "scale={}:{}",
            plan.target_width, plan.target_height
        ));
    }

    runner.run(&cmd).await?;

    let out_size = tokio::fs::metadata(output).await?.len();
    if out_size > policy.max_output_bytes {
        warn!(
            "Compressed output {} is {} bytes, still over the {}-byte ceiling; \
             the caller may need to chunk it",
            output.display(),
            out_size,
            policy.max_output_bytes
        );
    }

    Ok(CompressOutcome::Compressed(plan))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(width: u32, height: u32, duration: f64, size: u64) -> MediaInfo {
        MediaInfo {
            size,
            duration,
            width,
            height,
            bitrate: 0,
            codec: "h264".into(),
            fps: 30.0,
        }
    }

    #[test]
    fn test_4k_tier() {
        let plan = plan_compression(
            &info(3840, 2160, 3600.0, 4_000_000_000),
            &CompressionPolicy::default(),
        )
        .unwrap();
        assert_eq!(plan.target_height, 1080);
        assert_eq!(plan.target_width, 1920);
        assert!(plan.downscale);
    }

    #[test]
    fn test_1440_tier() {
        let plan = plan_compression(
            &info(2560, 1440, 3600.0, 4_000_000_000),
            &CompressionPolicy::default(),
        )
        .unwrap();
        assert_eq!(plan.target_height, 720);
        assert_eq!(plan.target_width, 1280);
    }

    #[test]
    fn test_low_resolution_unchanged() {
        let plan = plan_compression(
            &info(1664, 1000, 3600.0, 4_000_000_000),
            &CompressionPolicy::default(),
        )
        .unwrap();
        assert_eq!(plan.target_height, 1000);
        assert_eq!(plan.target_width, 1664);
        assert!(!plan.downscale);
    }

    #[test]
    fn test_width_rounded_down_to_even() {
        // 3413x2160 -> 1080 * (3413/2160) = 1706.5 -> 1707 -> 1706
        let plan = plan_compression(
            &info(3413, 2160, 3600.0, 4_000_000_000),
            &CompressionPolicy::default(),
        )
        .unwrap();
        assert_eq!(plan.target_width % 2, 0);
        assert_eq!(plan.target_width, 1706);
    }

    #[test]
    fn test_bitrate_from_budget() {
        // 1.9 GB ceiling -> 1.805 GB budget -> ~3610 kbps over 3600s
        let plan = plan_compression(
            &info(1920, 1080, 3600.0, 2_500_000_000),
            &CompressionPolicy::default(),
        )
        .unwrap();
        assert_eq!(plan.target_bitrate_kbps, 3610);
    }

    #[test]
    fn test_bitrate_clamped_low() {
        // A very long video would want under 500 kbps
        let plan = plan_compression(
            &info(1920, 1080, 40_000.0, 3_000_000_000),
            &CompressionPolicy::default(),
        )
        .unwrap();
        assert_eq!(plan.target_bitrate_kbps, MIN_BITRATE_KBPS);
    }

    #[test]
    fn test_bitrate_clamped_high() {
        // A very short video would want an absurd bitrate
        let plan = plan_compression(
            &info(1920, 1080, 60.0, 2_000_000_000),
            &CompressionPolicy::default(),
        )
        .unwrap();
        assert_eq!(plan.target_bitrate_kbps, MAX_BITRATE_KBPS);
    }

    #[test]
    fn test_invalid_duration() {
        assert!(matches!(
            plan_compression(&info(1920, 1080, 0.0, 1), &CompressionPolicy::default()),
            Err(MediaError::InvalidDuration(_))
        ));
    }

    #[tokio::test]
    async fn test_under_budget_is_unchanged() {
        // Returns before any transcoder is touched.
        let runner = ProcessRunner::new();
        let outcome = compress_if_needed(
            &runner,
            "in.mp4",
            "out.mp4",
            &info(1920, 1080, 600.0, 100_000_000),
            &CompressionPolicy::default(),
        )
        .await
        .unwrap();
        assert_eq!(outcome, CompressOutcome::Unchanged);
        assert!(!outcome.applied());
    }
}
