//! Recap processing worker.
//!
//! Claims pending jobs from the store and drives each through the recap
//! pipeline: probe, compress, chunk, segment, describe (via the AI service
//! and its webhook callback), narrate, stitch.

pub mod config;
pub mod error;
pub mod executor;
pub mod logging;
pub mod pipeline;

pub use config::WorkerConfig;
pub use error::{WorkerError, WorkerResult};
pub use executor::JobExecutor;
pub use logging::JobLogger;
pub use pipeline::{process_job, ProcessingContext};
