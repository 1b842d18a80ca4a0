//! Shared data models for the Recapio backend.
//!
//! This crate provides Serde-serializable types for:
//! - Jobs and their status state machine
//! - Scene records produced by the segmenter
//! - Job events published through the notification bridge
//! - Webhook callback payloads

pub mod event;
pub mod job;
pub mod scene;

// Re-export common types
pub use event::{JobEvent, WebhookPayload};
pub use job::{JobId, JobOptions, JobRecord, JobStatus, JobUpdate, RecapOutput, VideoId};
pub use scene::Scene;
