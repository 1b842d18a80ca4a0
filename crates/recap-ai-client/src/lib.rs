//! Client for the external recap AI service.
//!
//! The service ingests video chunks, produces per-scene descriptions
//! asynchronously (delivered via webhook callback), and synthesizes
//! narration audio. It is opaque to the pipeline: this crate only knows its
//! HTTP surface.

pub mod client;
pub mod error;
pub mod types;

pub use client::{AiClient, AiClientConfig};
pub use error::{AiError, AiResult};
pub use types::{
    DescribeRequest, DescribeSubmission, NarrationRequest, RemoteJobStatus, SceneDescription,
    SceneWindow,
};
