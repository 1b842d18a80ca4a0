//! Webhook-to-worker notification bridge.
//!
//! Converts the AI service's asynchronous webhook callback into internal
//! events a waiting worker can block on:
//! - [`token`]: single-use, expiring per-job webhook secrets
//! - [`webhook`]: callback authentication (token + optional HMAC signature)
//! - [`bridge`]: job-scoped publish/subscribe with a durable last-event
//!   fallback for late subscribers
//! - [`stream`]: live update stream (snapshot first, then events until
//!   terminal)

pub mod bridge;
pub mod error;
pub mod stream;
pub mod token;
pub mod webhook;

pub use bridge::{AwaitOutcome, NotificationBridge};
pub use error::{NotifyError, NotifyResult};
pub use stream::stream_job_updates;
pub use token::WebhookTokens;
pub use webhook::{verify_signature, WebhookConfig, WebhookGateway};
