//! Worker configuration.

use std::time::Duration;

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Maximum concurrent jobs
    pub max_concurrent_jobs: usize,
    /// Timeout for a single transcode/probe invocation
    pub transcode_timeout: Duration,
    /// How long to block on the notification bridge for the AI callback
    pub callback_timeout: Duration,
    /// Bounded re-poll attempts of the AI service after a callback timeout
    pub status_poll_attempts: u32,
    /// Interval between re-poll attempts
    pub status_poll_interval: Duration,
    /// Directory uploaded source videos land in
    pub upload_dir: String,
    /// Work directory for derived files
    pub work_dir: String,
    /// Public base URL the AI service calls back to
    pub callback_base_url: String,
    /// How often the executor scans for pending jobs
    pub claim_interval: Duration,
    /// Claim lock lifetime; bounds how long a crashed worker holds a job
    pub claim_ttl_secs: u64,
    /// Graceful shutdown timeout
    pub shutdown_timeout: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 2,
            transcode_timeout: Duration::from_secs(1800),
            callback_timeout: Duration::from_secs(600),
            status_poll_attempts: 5,
            status_poll_interval: Duration::from_secs(30),
            upload_dir: "/var/lib/recap/uploads".to_string(),
            work_dir: "/tmp/recap".to_string(),
            callback_base_url: "http://localhost:8080".to_string(),
            claim_interval: Duration::from_secs(10),
            claim_ttl_secs: 3600,
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            max_concurrent_jobs: std::env::var("RECAP_MAX_JOBS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(2),
            transcode_timeout: Duration::from_secs(
                std::env::var("RECAP_TRANSCODE_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(1800),
            ),
            callback_timeout: Duration::from_secs(
                std::env::var("RECAP_CALLBACK_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(600),
            ),
            status_poll_attempts: std::env::var("RECAP_STATUS_POLL_ATTEMPTS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(5),
            status_poll_interval: Duration::from_secs(
                std::env::var("RECAP_STATUS_POLL_INTERVAL")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
            upload_dir: std::env::var("RECAP_UPLOAD_DIR")
                .unwrap_or_else(|_| "/var/lib/recap/uploads".to_string()),
            work_dir: std::env::var("RECAP_WORK_DIR").unwrap_or_else(|_| "/tmp/recap".to_string()),
            callback_base_url: std::env::var("RECAP_CALLBACK_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:8080".to_string()),
            claim_interval: Duration::from_secs(
                std::env::var("RECAP_CLAIM_INTERVAL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(10),
            ),
            claim_ttl_secs: std::env::var("RECAP_CLAIM_TTL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(3600),
            shutdown_timeout: Duration::from_secs(
                std::env::var("RECAP_SHUTDOWN_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
        }
    }
}
