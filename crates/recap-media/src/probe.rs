//! FFprobe media information.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{MediaError, MediaResult};
use crate::runner::ProcessRunner;

/// Read-only snapshot of a media file.
///
/// Recomputed whenever a new derived file is produced; never mutated in
/// place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaInfo {
    /// File size in bytes
    pub size: u64,
    /// Duration in seconds
    pub duration: f64,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Bitrate in bits/second
    pub bitrate: u64,
    /// Video codec
    pub codec: String,
    /// Frame rate (fps)
    pub fps: f64,
}

impl MediaInfo {
    /// Average stored bytes per second of playback.
    pub fn bytes_per_second(&self) -> f64 {
        if self.duration <= 0.0 {
            return 0.0;
        }
        self.size as f64 / self.duration
    }
}

/// FFprobe JSON output format.
#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: FfprobeFormat,
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
    size: Option<String>,
    bit_rate: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: String,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
}

/// Probe a media file.
pub async fn probe_media(runner: &ProcessRunner, path: impl AsRef<Path>) -> MediaResult<MediaInfo> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(MediaError::FileNotFound(path.to_path_buf()));
    }

    let args = vec![
        "-v".to_string(),
        "error".to_string(),
        "-print_format".to_string(),
        "json".to_string(),
        "-show_format".to_string(),
        "-show_streams".to_string(),
        path.to_string_lossy().to_string(),
    ];

    let output = runner.run_probe(&args).await?;
    let probe: FfprobeOutput = serde_json::from_str(&output.stdout)?;

    let video_stream = probe
        .streams
        .iter()
        .find(|s| s.codec_type == "video")
        .ok_or_else(|| MediaError::InvalidVideo("No video stream found".to_string()))?;

    let duration = probe
        .format
        .duration
        .as_ref()
        .and_then(|d| d.parse::<f64>().ok())
        .unwrap_or(0.0);

    let size = probe
        .format
        .size
        .as_ref()
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(0);

    let bitrate = probe
        .format
        .bit_rate
        .as_ref()
        .and_then(|b| b.parse::<u64>().ok())
        .unwrap_or(0);

    let fps = video_stream
        .avg_frame_rate
        .as_ref()
        .or(video_stream.r_frame_rate.as_ref())
        .and_then(|r| parse_frame_rate(r))
        .unwrap_or(30.0);

    Ok(MediaInfo {
        size,
        duration,
        width: video_stream.width.unwrap_or(0),
        height: video_stream.height.unwrap_or(0),
        bitrate,
        codec: video_stream.codec_name.clone().unwrap_or_default(),
        fps,
    })
}

/// Parse frame rate string (e.g., "30/1" or "29.97").
fn parse_frame_rate(s: &str) -> Option<f64> {
    if let Some((num, den)) = s.split_once('/') {
        let num: f64 = num.parse().ok()?;
        let den: f64 = den.parse().ok()?;
        if den > 0.0 {
            return Some(num / den);
        }
    }
    s.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_frame_rate() {
        assert!((parse_frame_rate("30/1").unwrap() - 30.0).abs() < 0.01);
        assert!((parse_frame_rate("30000/1001").unwrap() - 29.97).abs() < 0.01);
        assert!((parse_frame_rate("29.97").unwrap() - 29.97).abs() < 0.01);
        assert!(parse_frame_rate("30/0").is_none());
    }

    #[test]
    fn test_bytes_per_second() {
        let info = MediaInfo {
            size: 1_000_000_000,
            duration: 7200.0,
            width: 1920,
            height: 1080,
            bitrate: 0,
            codec: "h264".into(),
            fps: 30.0,
        };
        assert!((info.bytes_per_second() - 138_888.9).abs() < 1.0);
    }

    #[test]
    fn test_bytes_per_second_zero_duration() {
        let info = MediaInfo {
            size: 100,
            duration: 0.0,
            width: 0,
            height: 0,
            bitrate: 0,
            codec: String::new(),
            fps: 0.0,
        };
        assert_eq!(info.bytes_per_second(), 0.0);
    }

    #[test]
    fn test_probe_output_parsing() {
        let json = r#"{
            "format": {"duration": "120.5", "size": "1048576", "bit_rate": "69632"},
            "streams": [
                {"codec_type": "audio", "codec_name": "aac"},
                {"codec_type": "video", "codec_name": "h264",
                 "width": 1920, "height": 1080, "avg_frame_rate": "30000/1001"}
            ]
        }"#;
        let probe: FfprobeOutput = serde_json::from_str(json).unwrap();
        let video = probe
            .streams
            .iter()
            .find(|s| s.codec_type == "video")
            .unwrap();
        assert_eq!(video.width, Some(1920));
        assert_eq!(probe.format.duration.as_deref(), Some("120.5"));
    }
}
