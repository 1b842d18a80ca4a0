//! Recap assembly.
//!
//! Extracts per-scene clips, muxes narration audio onto them, and
//! concatenates the narrated clips into the final recap via the concat
//! demuxer. All invocations run through the process runner.

use std::path::Path;

use tokio::io::AsyncWriteExt;
use tracing::info;

use crate::error::{MediaError, MediaResult};
use crate::runner::{FfmpegCommand, ProcessRunner};

/// Extract a time range from a video without re-encoding.
pub async fn extract_segment(
    runner: &ProcessRunner,
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    start_secs: f64,
    duration: f64,
) -> MediaResult<()> {
    let cmd = FfmpegCommand::new(input.as_ref(), output.as_ref())
        .seek(start_secs)
        .duration(duration)
        .codec_copy();

    runner.run(&cmd).await?;
    Ok(())
}

/// Mux narration audio onto a scene clip, replacing the original audio.
///
/// `-shortest` trims to the shorter stream so a long narration cannot
/// stretch the clip with frozen video.
pub async fn mux_narration(
    runner: &ProcessRunner,
    clip: impl AsRef<Path>,
    audio: impl AsRef<Path>,
    output: impl AsRef<Path>,
) -> MediaResult<()> {
    let args = vec![
        "-y".to_string(),
        "-v".to_string(),
        "error".to_string(),
        "-i".to_string(),
        clip.as_ref().to_string_lossy().to_string(),
        "-i".to_string(),
        audio.as_ref().to_string_lossy().to_string(),
        "-map".to_string(),
        "0:v".to_string(),
        "-map".to_string(),
        "1:a".to_string(),
        "-c:v".to_string(),
        "copy".to_string(),
        "-c:a".to_string(),
        "aac".to_string(),
        "-b:a".to_string(),
        "128k".to_string(),
        "-shortest".to_string(),
        output.as_ref().to_string_lossy().to_string(),
    ];

    runner.run_args(&args).await?;
    Ok(())
}

/// Concatenate clips into a single output using the concat demuxer.
pub async fn stitch_clips(
    runner: &ProcessRunner,
    clips: &[impl AsRef<Path>],
    output: impl AsRef<Path>,
) -> MediaResult<()> {
    if clips.is_empty() {
        return Err(MediaError::InvalidVideo(
            "no scene clips to stitch".to_string(),
        ));
    }

    let output = output.as_ref();

    // The concat demuxer reads entries from a list file.
    let list_dir = tempfile::tempdir()?;
    let list_path = list_dir.path().join("concat.txt");

    let mut list_file = tokio::fs::File::create(&list_path).await?;
    for clip in clips {
        let entry = format!("file '{}'\n", escape_concat_path(clip.as_ref()));
        list_file.write_all(entry.as_bytes()).await?;
    }
    list_file.flush().await?;

    info!(
        "Stitching {} clips into {}",
        clips.len(),
        output.display()
    );

    let args = vec![
        "-y".to_string(),
        "-v".to_string(),
        "error".to_string(),
        "-f".to_string(),
        "concat".to_string(),
        "-safe".to_string(),
        "0".to_string(),
        "-i".to_string(),
        list_path.to_string_lossy().to_string(),
        "-c".to_string(),
        "copy".to_string(),
        output.to_string_lossy().to_string(),
    ];

    runner.run_args(&args).await?;
    Ok(())
}

/// Escape a path for a concat list entry (single quotes close-escape-reopen).
fn escape_concat_path(path: &Path) -> String {
    path.to_string_lossy().replace('\'', "'\\''")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_escape_plain_path() {
        let path = PathBuf::from("/tmp/recap/chunk_000.mp4");
        assert_eq!(escape_concat_path(&path), "/tmp/recap/chunk_000.mp4");
    }

    #[test]
    fn test_escape_quoted_path() {
        let path = PathBuf::from("/tmp/it's here.mp4");
        assert_eq!(escape_concat_path(&path), "/tmp/it'\\''s here.mp4");
    }

    #[tokio::test]
    async fn test_stitch_rejects_empty_input() {
        let runner = ProcessRunner::new();
        let clips: Vec<PathBuf> = Vec::new();
        let result = stitch_clips(&runner, &clips, "out.mp4").await;
        assert!(matches!(result, Err(MediaError::InvalidVideo(_))));
    }
}
