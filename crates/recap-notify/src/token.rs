//! Per-job webhook tokens.
//!
//! A token is a short-lived random secret bound to one job. It authenticates
//! the AI service's callback and is destroyed on first successful
//! verification, so a captured callback URL cannot be replayed.

use rand::{distr::Alphanumeric, Rng};
use redis::AsyncCommands;
use tracing::debug;

use recap_models::JobId;

use crate::error::NotifyResult;

/// Token lifetime (2 hours); the AI service must call back within this.
pub const TOKEN_TTL_SECS: u64 = 7200;

/// Token length in characters.
const TOKEN_LENGTH: usize = 32;

/// Issues and verifies single-use webhook tokens.
#[derive(Clone)]
pub struct WebhookTokens {
    client: redis::Client,
}

impl WebhookTokens {
    /// Create a new token service.
    pub fn new(redis_url: &str) -> NotifyResult<Self> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self { client })
    }

    /// Create from the `REDIS_URL` environment variable.
    pub fn from_env() -> NotifyResult<Self> {
        let url =
            std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());
        Self::new(&url)
    }

    fn token_key(job_id: &JobId) -> String {
        format!("recap:webhook:token:{}", job_id)
    }

    /// Issue a fresh token for a job, replacing any previous one.
    pub async fn issue(&self, job_id: &JobId) -> NotifyResult<String> {
        let token = generate_token();

        let mut conn = self.client.get_multiplexed_async_connection().await?;
        conn.set_ex::<_, _, ()>(Self::token_key(job_id), &token, TOKEN_TTL_SECS)
            .await?;

        debug!(job_id = %job_id, "Issued webhook token");
        Ok(token)
    }

    /// Verify a presented token against the stored one.
    ///
    /// Comparison is constant-time. On success the stored token is deleted
    /// (single-use); a failed attempt leaves it in place until its TTL, so
    /// bad guesses cannot burn a job's token.
    pub async fn verify(&self, job_id: &JobId, presented: &str) -> NotifyResult<bool> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let stored: Option<String> = conn.get(Self::token_key(job_id)).await?;
        let Some(stored) = stored else {
            return Ok(false);
        };

        if !constant_time_eq(stored.as_bytes(), presented.as_bytes()) {
            return Ok(false);
        }

        conn.del::<_, ()>(Self::token_key(job_id)).await?;
        debug!(job_id = %job_id, "Webhook token consumed");
        Ok(true)
    }

    /// Drop a job's token without consuming it (e.g. on job deletion).
    pub async fn revoke(&self, job_id: &JobId) -> NotifyResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        conn.del::<_, ()>(Self::token_key(job_id)).await?;
        Ok(())
    }
}

/// Generate a random alphanumeric token.
fn generate_token() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(TOKEN_LENGTH)
        .map(char::from)
        .collect()
}

/// Constant-time byte comparison. Always scans the full shorter length so
/// timing does not leak the position of the first mismatch.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}
