//! FFmpeg CLI wrapper for the recap pipeline.
//!
//! This crate owns every external transcoder/prober invocation:
//! - [`runner`]: subprocess supervision (timeouts, OOM classification,
//!   diagnostic sanitization)
//! - [`probe`]: media metadata extraction
//! - [`segmenter`]: fixed-block scene segmentation
//! - [`chunker`]: duration/size-constrained splitting
//! - [`compressor`]: adaptive-resolution compression
//! - [`stitch`]: narration mux + final recap assembly
//! - [`frame`]: best-effort frame grabs

pub mod chunker;
pub mod compressor;
pub mod error;
pub mod frame;
pub mod probe;
pub mod runner;
pub mod segmenter;
pub mod stitch;

pub use chunker::{cleanup_chunks, plan_chunks, split_into_chunks, ChunkPlan, ChunkPolicy};
pub use compressor::{
    compress_if_needed, plan_compression, CompressOutcome, CompressionPlan, CompressionPolicy,
};
pub use error::{MediaError, MediaResult};
pub use frame::extract_frame;
pub use probe::{probe_media, MediaInfo};
pub use runner::{check_ffmpeg, check_ffprobe, CommandOutput, FfmpegCommand, ProcessRunner};
pub use segmenter::{segment_timeline, SegmenterConfig};
pub use stitch::{extract_segment, mux_narration, stitch_clips};
