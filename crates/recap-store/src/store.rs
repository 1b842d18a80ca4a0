//! Job store over Redis.
//!
//! Each job lives in a hash (`recap:job:{id}`) holding the serialized record
//! plus a duplicated `status` field for the guard scripts. A global zset
//! indexes jobs by creation time for newest-first listing, with a per-owner
//! zset alongside it.
//!
//! Terminal transitions are the one place that needs real mutual exclusion:
//! the guard script checks the stored status and writes in a single atomic
//! step, so of two racing terminal calls exactly one observes a non-terminal
//! status and applies. The loser gets `applied = false` and must re-read the
//! job to learn the true final state.

use redis::{AsyncCommands, Script};
use tracing::{debug, info};

use recap_models::{
    JobId, JobOptions, JobRecord, JobStatus, JobUpdate, RecapOutput, Scene, VideoId,
};

use crate::error::{StoreError, StoreResult};

/// Global creation-time index.
const INDEX_KEY: &str = "recap:jobs:index";

/// Conditional write: refuse if the job is already terminal.
///
/// Returns -1 when the job does not exist, 0 when it is terminal (write
/// dropped), 1 when the write applied.
const GUARDED_WRITE_SCRIPT: &str = r#"
local status = redis.call('HGET', KEYS[1], 'status')
if not status then
    return -1
end
if status == 'completed' or status == 'failed' then
    return 0
end
redis.call('HSET', KEYS[1], 'data', ARGV[1], 'status', ARGV[2])
return 1
"#;

/// Listing filter for [`JobStore::list`].
#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    /// Only jobs in this status
    pub status: Option<JobStatus>,
    /// Only jobs owned by this user
    pub owner: Option<String>,
    /// Page size (default 50)
    pub limit: Option<usize>,
    /// Page offset
    pub offset: usize,
}

impl JobFilter {
    /// Filter by status.
    pub fn with_status(mut self, status: JobStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Filter by owner.
    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }
}

/// Redis-backed job store.
#[derive(Clone)]
pub struct JobStore {
    client: redis::Client,
}

impl JobStore {
    /// Create a new store.
    pub fn new(redis_url: &str) -> StoreResult<Self> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self { client })
    }

    /// Create from the `REDIS_URL` environment variable.
    pub fn from_env() -> StoreResult<Self> {
        let url =
            std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());
        Self::new(&url)
    }

    fn job_key(id: &JobId) -> String {
        format!("recap:job:{}", id)
    }

    fn owner_index_key(owner: &str) -> String {
        format!("recap:jobs:owner:{}", owner)
    }

    async fn connection(&self) -> StoreResult<redis::aio::MultiplexedConnection> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }

    /// Create a job in `Pending` for an uploaded video. Returns the job ID.
    pub async fn create(
        &self,
        video_id: VideoId,
        filename: impl Into<String>,
        options: JobOptions,
    ) -> StoreResult<JobId> {
        let job = JobRecord::new(video_id, filename, options);
        let mut conn = self.connection().await?;

        let key = Self::job_key(&job.id);
        let data = serde_json::to_string(&job)?;
        let score = job.created_at.timestamp_millis() as f64;

        conn.hset_multiple::<_, _, _, ()>(
            &key,
            &[
                ("data", data.as_str()),
                ("status", job.status.as_str()),
            ],
        )
        .await?;
        conn.zadd::<_, _, _, ()>(INDEX_KEY, job.id.as_str(), score)
            .await?;
        if let Some(ref owner) = job.user_id {
            conn.zadd::<_, _, _, ()>(Self::owner_index_key(owner), job.id.as_str(), score)
                .await?;
        }

        metrics::counter!("recap_store_jobs_created_total").increment(1);
        info!(job_id = %job.id, video_id = %job.video_id, "Created job");

        Ok(job.id)
    }

    /// Fetch a job record.
    pub async fn get(&self, job_id: &JobId) -> StoreResult<JobRecord> {
        let mut conn = self.connection().await?;
        let data: Option<String> = conn.hget(Self::job_key(job_id), "data").await?;

        match data {
            Some(json) => Ok(serde_json::from_str(&json)?),
            None => Err(StoreError::NotFound(job_id.clone())),
        }
    }

    /// Apply a non-terminal field patch.
    ///
    /// Returns `false` (a silent no-op) when the job has already reached a
    /// terminal status: late-arriving progress must never resurrect a
    /// finished job. Patching to a terminal status goes through
    /// [`complete_if_not_failed`](Self::complete_if_not_failed) /
    /// [`fail_if_not_completed`](Self::fail_if_not_completed) only.
    pub async fn update(&self, job_id: &JobId, update: &JobUpdate) -> StoreResult<bool> {
        if let Some(status) = update.status {
            if status.is_terminal() {
                return Err(StoreError::validation(
                    "update cannot set a terminal status; use the terminal transitions",
                ));
            }
        }

        let mut job = self.get(job_id).await?;
        if job.is_terminal() {
            debug!(
                job_id = %job_id,
                fields = ?update.field_names(),
                "Dropping update for terminal job"
            );
            return Ok(false);
        }

        job.apply_update(update);
        let applied = self.guarded_write(&job).await?;

        if !applied {
            // The job went terminal between our read and the script.
            debug!(
                job_id = %job_id,
                fields = ?update.field_names(),
                "Dropping update for terminal job"
            );
        }
        Ok(applied)
    }

    /// Complete the job unless it already failed.
    ///
    /// Exactly one of two racing terminal calls applies. A `false` return
    /// means the caller lost the race (or the job was already terminal) and
    /// must re-read the job to report its true final state.
    pub async fn complete_if_not_failed(
        &self,
        job_id: &JobId,
        output: RecapOutput,
        scenes: Vec<Scene>,
    ) -> StoreResult<bool> {
        let mut job = self.get(job_id).await?;
        if job.is_terminal() {
            return Ok(false);
        }

        job.complete(output, scenes);
        let applied = self.guarded_write(&job).await?;

        if applied {
            info!(job_id = %job_id, "Job completed");
        } else {
            metrics::counter!("recap_store_terminal_conflicts_total").increment(1);
        }
        Ok(applied)
    }

    /// Fail the job unless it already completed.
    ///
    /// Same race semantics as [`complete_if_not_failed`](Self::complete_if_not_failed).
    pub async fn fail_if_not_completed(
        &self,
        job_id: &JobId,
        error: impl Into<String>,
        step: impl Into<String>,
    ) -> StoreResult<bool> {
        let mut job = self.get(job_id).await?;
        if job.is_terminal() {
            return Ok(false);
        }

        job.fail(error, step);
        let applied = self.guarded_write(&job).await?;

        if applied {
            info!(job_id = %job_id, "Job failed");
        } else {
            metrics::counter!("recap_store_terminal_conflicts_total").increment(1);
        }
        Ok(applied)
    }

    /// Fetch the final output and scene list.
    ///
    /// Only valid once the job is terminal; asking earlier is a conflict
    /// with the job's current state.
    pub async fn result(&self, job_id: &JobId) -> StoreResult<(Option<RecapOutput>, Vec<Scene>)> {
        let job = self.get(job_id).await?;
        if !job.is_terminal() {
            return Err(StoreError::conflict(format!(
                "job {} is still {}",
                job_id, job.status
            )));
        }
        Ok((job.output, job.scenes))
    }

    /// List jobs newest-first.
    ///
    /// Offset/limit page over the creation-time index; the status filter is
    /// applied after hydration, so a filtered page may hold fewer than
    /// `limit` jobs.
    pub async fn list(&self, filter: &JobFilter) -> StoreResult<Vec<JobRecord>> {
        let mut conn = self.connection().await?;

        let index_key = match filter.owner {
            Some(ref owner) => Self::owner_index_key(owner),
            None => INDEX_KEY.to_string(),
        };

        let limit = filter.limit.unwrap_or(50);
        let start = filter.offset as isize;
        let stop = (filter.offset + limit) as isize - 1;

        let ids: Vec<String> = conn.zrevrange(&index_key, start, stop).await?;

        let mut jobs = Vec::with_capacity(ids.len());
        for id in ids {
            let data: Option<String> = conn.hget(Self::job_key(&JobId(id)), "data").await?;
            // Index entries can briefly outlive a deleted job hash.
            let Some(json) = data else { continue };
            let job: JobRecord = serde_json::from_str(&json)?;
            if let Some(status) = filter.status {
                if job.status != status {
                    continue;
                }
            }
            jobs.push(job);
        }

        Ok(jobs)
    }

    /// Delete a job regardless of status.
    pub async fn delete(&self, job_id: &JobId) -> StoreResult<()> {
        // Read first so the owner index entry can be removed too.
        let job = self.get(job_id).await?;

        let mut conn = self.connection().await?;
        conn.del::<_, ()>(Self::job_key(job_id)).await?;
        conn.zrem::<_, _, ()>(INDEX_KEY, job_id.as_str()).await?;
        if let Some(ref owner) = job.user_id {
            conn.zrem::<_, _, ()>(Self::owner_index_key(owner), job_id.as_str())
                .await?;
        }

        info!(job_id = %job_id, "Deleted job");
        Ok(())
    }

    /// Run the guard script for a prepared record.
    async fn guarded_write(&self, job: &JobRecord) -> StoreResult<bool> {
        let mut conn = self.connection().await?;
        let data = serde_json::to_string(job)?;

        let script = Script::new(GUARDED_WRITE_SCRIPT);
        let result: i32 = script
            .key(Self::job_key(&job.id))
            .arg(&data)
            .arg(job.status.as_str())
            .invoke_async(&mut conn)
            .await?;

        match result {
            1 => Ok(true),
            0 => Ok(false),
            _ => Err(StoreError::NotFound(job.id.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_formats() {
        let id = JobId::from_string("job-123");
        assert_eq!(JobStore::job_key(&id), "recap:job:job-123");
        assert_eq!(
            JobStore::owner_index_key("user-9"),
            "recap:jobs:owner:user-9"
        );
    }

    #[test]
    fn test_filter_builder() {
        let filter = JobFilter::default()
            .with_status(JobStatus::Pending)
            .with_owner("user-9");
        assert_eq!(filter.status, Some(JobStatus::Pending));
        assert_eq!(filter.owner.as_deref(), Some("user-9"));
        assert_eq!(filter.offset, 0);
    }
}
