//! Duration/size-constrained media chunking.
//!
//! The downstream AI ingestion service imposes two independent ceilings on
//! each submitted file: a playback-duration ceiling (its context window) and
//! a byte-size ceiling. The chunker plans the largest chunk duration that
//! satisfies both, never below a configured floor, and extracts chunks with
//! deterministic re-encoding.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::{MediaError, MediaResult};
use crate::probe::MediaInfo;
use crate::runner::{FfmpegCommand, ProcessRunner};

/// Default chunk duration ceiling (1 hour).
pub const DEFAULT_MAX_CHUNK_SECS: f64 = 3600.0;

/// Default chunk byte-size ceiling (1.8 GB).
pub const DEFAULT_MAX_CHUNK_BYTES: u64 = 1_800_000_000;

/// Floor on chunk duration (10 minutes). The byte constraint may shrink the
/// chunk duration but never below this, to avoid pathological over-splitting.
pub const DEFAULT_MIN_CHUNK_SECS: f64 = 600.0;

/// Chunking policy constants.
#[derive(Debug, Clone)]
pub struct ChunkPolicy {
    /// Duration ceiling per chunk, in seconds
    pub max_chunk_secs: f64,
    /// Byte-size ceiling per chunk
    pub max_chunk_bytes: u64,
    /// Duration floor per chunk, in seconds
    pub min_chunk_secs: f64,
}

impl Default for ChunkPolicy {
    fn default() -> Self {
        Self {
            max_chunk_secs: DEFAULT_MAX_CHUNK_SECS,
            max_chunk_bytes: DEFAULT_MAX_CHUNK_BYTES,
            min_chunk_secs: DEFAULT_MIN_CHUNK_SECS,
        }
    }
}

/// A computed chunk layout. Transient; recomputed per invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkPlan {
    /// Effective chunk duration in seconds
    pub chunk_secs: f64,
    /// Number of chunks
    pub chunk_count: u32,
}

/// Decide whether and how to split a file.
///
/// Returns `None` when neither ceiling is exceeded: the file is submitted
/// unchanged.
pub fn plan_chunks(info: &MediaInfo, policy: &ChunkPolicy) -> MediaResult<Option<ChunkPlan>> {
    if info.duration <= 0.0 || !info.duration.is_finite() {
        return Err(MediaError::InvalidDuration(info.duration));
    }

    if info.duration <= policy.max_chunk_secs && info.size <= policy.max_chunk_bytes {
        return Ok(None);
    }

    let bytes_per_second = info.bytes_per_second();
    let size_based_secs = if bytes_per_second > 0.0 {
        policy.max_chunk_bytes as f64 / bytes_per_second
    } else {
        policy.max_chunk_secs
    };

    // The byte constraint can only shrink the duration-based default, and
    // never below the floor.
    let chunk_secs = policy
        .min_chunk_secs
        .max(policy.max_chunk_secs.min(size_based_secs));

    let chunk_count = (info.duration / chunk_secs).ceil() as u32;

    Ok(Some(ChunkPlan {
        chunk_secs,
        chunk_count,
    }))
}

/// Extract the planned chunks into `out_dir`.
///
/// Each chunk is re-encoded with fixed settings so output is deterministic
/// for a given input and plan. After extraction every chunk's byte size is
/// verified against the ceiling; an oversized chunk is a warning, not a
/// failure; the downstream stage may compress it further.
pub async fn split_into_chunks(
    runner: &ProcessRunner,
    input: impl AsRef<Path>,
    out_dir: impl AsRef<Path>,
    info: &MediaInfo,
    policy: &ChunkPolicy,
    plan: &ChunkPlan,
) -> MediaResult<Vec<PathBuf>> {
    let input = input.as_ref();
    let out_dir = out_dir.as_ref();

    tokio::fs::create_dir_all(out_dir).await?;

    info!(
        "Splitting {} into {} chunks of {:.0}s",
        input.display(),
        plan.chunk_count,
        plan.chunk_secs
    );

    let mut chunks = Vec::with_capacity(plan.chunk_count as usize);

    for index in 0..plan.chunk_count {
        let start = index as f64 * plan.chunk_secs;
        let duration = plan.chunk_secs.min(info.duration - start);
        let output = out_dir.join(format!("chunk_{:03}.mp4", index));

        let cmd = FfmpegCommand::new(input, &output)
            .seek(start)
            .duration(duration)
            .video_codec("libx264")
            .preset("veryfast")
            .crf(23)
            .audio_codec("aac")
            .audio_bitrate("128k");

        runner.run(&cmd).await?;

        let size = tokio::fs::metadata(&output).await?.len();
        if size > policy.max_chunk_bytes {
            warn!(
                "Chunk {} is {} bytes, still over the {}-byte ceiling; \
                 downstream compression may be required",
                output.display(),
                size,
                policy.max_chunk_bytes
            );
        }
        debug!("Extracted chunk {} ({} bytes)", output.display(), size);

        chunks.push(output);
    }

    Ok(chunks)
}

/// Remove all chunk artifacts previously extracted into `dir`.
pub async fn cleanup_chunks(dir: impl AsRef<Path>) -> MediaResult<()> {
    let dir = dir.as_ref();
    if !dir.exists() {
        return Ok(());
    }

    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with("chunk_") && name.ends_with(".mp4") {
            if let Err(e) = tokio::fs::remove_file(entry.path()).await {
                warn!("Failed to remove chunk {}: {}", entry.path().display(), e);
            }
        }
    }
    Ok(())
}
