//! FFmpeg command builder and subprocess supervision.
//!
//! Every external transcode/probe invocation goes through [`ProcessRunner`]:
//! it disables stdin (a transcoder prompting for input would hang the worker
//! forever), enforces an optional wall-clock timeout, applies a configured
//! thread cap, and classifies failures into timeout / likely-OOM / generic
//! with a sanitized diagnostic tail.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::{MediaError, MediaResult};

/// Maximum diagnostic lines kept in a sanitized failure message.
const MAX_DIAGNOSTIC_LINES: usize = 12;

/// Maximum characters kept per diagnostic line.
const MAX_LINE_CHARS: usize = 200;

/// Maximum total characters of a sanitized failure message.
const MAX_DIAGNOSTIC_CHARS: usize = 1600;

/// Builder for FFmpeg commands.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    /// Input file path
    input: PathBuf,
    /// Output file path
    output: PathBuf,
    /// Input arguments (before -i)
    input_args: Vec<String>,
    /// Output arguments (after -i)
    output_args: Vec<String>,
    /// Whether to overwrite output
    overwrite: bool,
    /// Log level
    log_level: String,
}

impl FfmpegCommand {
    /// Create a new FFmpeg command.
    pub fn new(input: impl AsRef<Path>, output: impl AsRef<Path>) -> Self {
        Self {
            input: input.as_ref().to_path_buf(),
            output: output.as_ref().to_path_buf(),
            input_args: Vec::new(),
            output_args: Vec::new(),
            overwrite: true,
            log_level: "error".to_string(),
        }
    }

    /// Add an input argument (before -i).
    pub fn input_arg(mut self, arg: impl Into<String>) -> Self {
        self.input_args.push(arg.into());
        self
    }

    /// Add an output argument (after -i).
    pub fn output_arg(mut self, arg: impl Into<String>) -> Self {
        self.output_args.push(arg.into());
        self
    }

    /// Add multiple output arguments.
    pub fn output_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.output_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set seek position (before input).
    pub fn seek(self, seconds: f64) -> Self {
        self.input_arg("-ss").input_arg(format!("{:.3}", seconds))
    }

    /// Set duration.
    pub fn duration(self, seconds: f64) -> Self {
        self.input_arg("-t").input_arg(format!("{:.3}", seconds))
    }

    /// Set video filter.
    pub fn video_filter(self, filter: impl Into<String>) -> Self {
        self.output_arg("-vf").output_arg(filter)
    }

    /// Set video codec.
    pub fn video_codec(self, codec: impl Into<String>) -> Self {
        self.output_arg("-c:v").output_arg(codec)
    }

    /// Set audio codec.
    pub fn audio_codec(self, codec: impl Into<String>) -> Self {
        self.output_arg("-c:a").output_arg(codec)
    }

    /// Set CRF (quality).
    pub fn crf(self, crf: u8) -> Self {
        self.output_arg("-crf").output_arg(crf.to_string())
    }

    /// Set preset.
    pub fn preset(self, preset: impl Into<String>) -> Self {
        self.output_arg("-preset").output_arg(preset)
    }

    /// Set audio bitrate.
    pub fn audio_bitrate(self, bitrate: impl Into<String>) -> Self {
        self.output_arg("-b:a").output_arg(bitrate)
    }

    /// Cap video bitrate at `kbps`, with a buffer of twice the cap.
    pub fn video_bitrate_cap(self, kbps: u32) -> Self {
        self.output_arg("-b:v")
            .output_arg(format!("{}k", kbps))
            .output_arg("-maxrate")
            .output_arg(format!("{}k", kbps))
            .output_arg("-bufsize")
            .output_arg(format!("{}k", kbps * 2))
    }

    /// Copy streams without re-encoding.
    pub fn codec_copy(self) -> Self {
        self.output_arg("-c").output_arg("copy")
    }

    /// Extract a single frame.
    pub fn single_frame(self) -> Self {
        self.output_arg("-vframes").output_arg("1")
    }

    /// Build the command arguments.
    pub fn build_args(&self) -> Vec<String> {
        let mut args = Vec::new();

        if self.overwrite {
            args.push("-y".to_string());
        }

        args.push("-v".to_string());
        args.push(self.log_level.clone());

        args.extend(self.input_args.clone());

        args.push("-i".to_string());
        args.push(self.input.to_string_lossy().to_string());

        args.extend(self.output_args.clone());

        args.push(self.output.to_string_lossy().to_string());

        args
    }
}

/// Captured output of a supervised command.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// Captured stdout (lossy UTF-8)
    pub stdout: String,
    /// Captured stderr (lossy UTF-8)
    pub stderr: String,
}

/// Supervisor for external transcoder/prober invocations.
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner {
    /// Timeout in seconds
    timeout_secs: Option<u64>,
    /// Thread cap passed to the transcoder (`-threads N`)
    thread_cap: Option<usize>,
}

impl ProcessRunner {
    /// Create a new runner with no timeout and no thread cap.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a runner with the thread cap read from `RECAP_FFMPEG_THREADS`.
    pub fn from_env() -> Self {
        Self {
            timeout_secs: None,
            thread_cap: std::env::var("RECAP_FFMPEG_THREADS")
                .ok()
                .and_then(|s| s.parse().ok()),
        }
    }

    /// Set timeout.
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    /// Set the transcoder thread cap.
    pub fn with_thread_cap(mut self, threads: usize) -> Self {
        self.thread_cap = Some(threads);
        self
    }

    /// Run an FFmpeg command.
    pub async fn run(&self, cmd: &FfmpegCommand) -> MediaResult<CommandOutput> {
        which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)?;

        let mut args = cmd.build_args();
        if let Some(threads) = self.thread_cap {
            // Insert before the output path so the cap applies to encoding.
            let at = args.len().saturating_sub(1);
            args.insert(at, "-threads".to_string());
            args.insert(at + 1, threads.to_string());
        }

        self.execute("ffmpeg", &args).await
    }

    /// Run an FFmpeg invocation from a raw argument vector.
    ///
    /// Used for multi-input invocations (narration mux, concat assembly)
    /// that do not fit the single-input builder.
    pub async fn run_args(&self, args: &[String]) -> MediaResult<CommandOutput> {
        which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)?;
        self.execute("ffmpeg", args).await
    }

    /// Run a read-only FFprobe invocation.
    ///
    /// Same timeout and sanitization discipline as [`run`](Self::run), but
    /// without the overwrite/thread flags a transcoder needs.
    pub async fn run_probe(&self, args: &[String]) -> MediaResult<CommandOutput> {
        which::which("ffprobe").map_err(|_| MediaError::FfprobeNotFound)?;
        self.execute("ffprobe", args).await
    }

    /// Spawn, supervise and classify a single invocation.
    async fn execute(&self, program: &str, args: &[String]) -> MediaResult<CommandOutput> {
        let command_line = format!("{} {}", program, args.join(" "));
        debug!("Running: {}", command_line);

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let mut stdout_pipe = child.stdout.take().expect("stdout not captured");
        let mut stderr_pipe = child.stderr.take().expect("stderr not captured");

        let stdout_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            let _ = stdout_pipe.read_to_end(&mut buf).await;
            buf
        });
        let stderr_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            let _ = stderr_pipe.read_to_end(&mut buf).await;
            buf
        });

        let status = if let Some(timeout_secs) = self.timeout_secs {
            match tokio::time::timeout(Duration::from_secs(timeout_secs), child.wait()).await {
                Ok(result) => result?,
                Err(_) => {
                    warn!(
                        "{} timed out after {}s, killing process",
                        program, timeout_secs
                    );
                    let _ = child.kill().await;
                    return Err(MediaError::Timeout(timeout_secs));
                }
            }
        } else {
            child.wait().await?
        };

        let stdout = String::from_utf8_lossy(&stdout_task.await.unwrap_or_default()).to_string();
        let stderr = String::from_utf8_lossy(&stderr_task.await.unwrap_or_default()).to_string();

        if status.success() {
            return Ok(CommandOutput { stdout, stderr });
        }

        Err(classify_failure(
            status.code(),
            signal_of(&status),
            stdout,
            stderr,
            command_line,
        ))
    }
}

/// Extract the terminating signal of a process, where the platform exposes it.
#[cfg(unix)]
fn signal_of(status: &std::process::ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn signal_of(_status: &std::process::ExitStatus) -> Option<i32> {
    None
}

/// Classify a non-zero exit into a typed error.
fn classify_failure(
    exit_code: Option<i32>,
    signal: Option<i32>,
    stdout: String,
    stderr: String,
    command: String,
) -> MediaError {
    // Exit code 137 is how shells report SIGKILL; the kernel OOM killer
    // sends SIGKILL and the process leaves no diagnostics behind.
    let killed = signal == Some(9) || exit_code == Some(137);
    if killed && stderr.trim().is_empty() {
        return MediaError::LikelyOom { command };
    }

    MediaError::command_failed(
        sanitize_diagnostics(&stderr),
        stderr.clone(),
        stdout,
        exit_code,
        command,
    )
}

/// Reduce a raw stderr stream to a short, user-presentable tail.
///
/// Banner/build-info/stream-mapping lines are stripped, long lines
/// truncated, and the total length bounded. The full stream stays on the
/// error value for operators.
fn sanitize_diagnostics(stderr: &str) -> String {
    let lines: Vec<&str> = stderr
        .lines()
        .filter(|line| !is_noise_line(line))
        .filter(|line| !line.trim().is_empty())
        .collect();

    let tail = if lines.len() > MAX_DIAGNOSTIC_LINES {
        &lines[lines.len() - MAX_DIAGNOSTIC_LINES..]
    } else {
        &lines[..]
    };

    let mut message = tail
        .iter()
        .map(|line| truncate_line(line))
        .collect::<Vec<_>>()
        .join("\n");

    if message.len() > MAX_DIAGNOSTIC_CHARS {
        let cut = message
            .char_indices()
            .take_while(|(i, _)| *i < MAX_DIAGNOSTIC_CHARS)
            .last()
            .map(|(i, c)| i + c.len_utf8())
            .unwrap_or(0);
        message.truncate(cut);
        message.push_str("...");
    }

    if message.is_empty() {
        "no diagnostic output".to_string()
    } else {
        message
    }
}

/// FFmpeg banner/build noise that never helps a user.
fn is_noise_line(line: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed.starts_with("ffmpeg version")
        || trimmed.starts_with("ffprobe version")
        || trimmed.starts_with("built with")
        || trimmed.starts_with("configuration:")
        || (trimmed.starts_with("lib") && trimmed.contains(" / "))
        || trimmed.starts_with("Stream mapping:")
        || trimmed.starts_with("Press [q]")
}

fn truncate_line(line: &str) -> String {
    if line.len() <= MAX_LINE_CHARS {
        return line.to_string();
    }
    let cut = line
        .char_indices()
        .take_while(|(i, _)| *i < MAX_LINE_CHARS)
        .last()
        .map(|(i, c)| i + c.len_utf8())
        .unwrap_or(0);
    format!("{}...", &line[..cut])
}

/// Check if FFmpeg is available.
pub fn check_ffmpeg() -> MediaResult<PathBuf> {
    which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)
}

/// Check if FFprobe is available.
pub fn check_ffprobe() -> MediaResult<PathBuf> {
    which::which("ffprobe").map_err(|_| MediaError::FfprobeNotFound)
}
