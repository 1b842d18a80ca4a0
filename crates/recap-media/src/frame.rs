//! Single-frame extraction.

use std::path::Path;

use crate::error::MediaResult;
use crate::runner::{FfmpegCommand, ProcessRunner};

/// Grab one frame at `at_secs` into `output` (typically a .jpg).
///
/// Callers treat failures as non-fatal: a missing scene frame never fails
/// the job.
pub async fn extract_frame(
    runner: &ProcessRunner,
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    at_secs: f64,
) -> MediaResult<()> {
    let cmd = FfmpegCommand::new(input.as_ref(), output.as_ref())
        .seek(at_secs)
        .single_frame()
        .output_args(["-q:v", "2"]);

    runner.run(&cmd).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_command_shape() {
        let cmd = FfmpegCommand::new("in.mp4", "frame.jpg")
            .seek(3.5)
            .single_frame()
            .output_args(["-q:v", "2"]);
        let args = cmd.build_args();
        assert!(args.contains(&"-vframes".to_string()));
        assert!(args.contains(&"3.500".to_string()));
        assert_eq!(args.last().unwrap(), "frame.jpg");
    }
}
