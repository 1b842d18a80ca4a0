//! Claim-based job executor.
//!
//! Scans the store for pending jobs, claims each with a TTL'd Redis lock so
//! workers never double-process, and runs pipelines under a concurrency
//! semaphore. Each job runs on its own task: one long transcode never stalls
//! the others.

use std::sync::Arc;
use std::time::Duration;

use redis::Script;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use recap_models::JobStatus;
use recap_store::JobFilter;

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::pipeline::{process_job, ProcessingContext};

/// How many pending jobs one scan considers.
const SCAN_LIMIT: usize = 20;

/// Job executor.
pub struct JobExecutor {
    config: WorkerConfig,
    ctx: Arc<ProcessingContext>,
    redis: redis::Client,
    job_semaphore: Arc<Semaphore>,
    shutdown: tokio::sync::watch::Sender<bool>,
    worker_name: String,
}

impl JobExecutor {
    /// Create a new job executor.
    pub fn new(config: WorkerConfig) -> WorkerResult<Self> {
        let ctx = Arc::new(ProcessingContext::new(config.clone())?);
        let redis_url =
            std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());
        let redis = redis::Client::open(redis_url)
            .map_err(|e| WorkerError::config_error(format!("Invalid REDIS_URL: {}", e)))?;

        let job_semaphore = Arc::new(Semaphore::new(config.max_concurrent_jobs));
        let (shutdown, _) = tokio::sync::watch::channel(false);
        let worker_name = format!("worker-{}", Uuid::new_v4());

        Ok(Self {
            config,
            ctx,
            redis,
            job_semaphore,
            shutdown,
            worker_name,
        })
    }

    /// Start the executor. Returns when shutdown is signalled.
    pub async fn run(&self) -> WorkerResult<()> {
        info!(
            "Starting executor '{}' with {} max concurrent jobs",
            self.worker_name, self.config.max_concurrent_jobs
        );

        let mut shutdown_rx = self.shutdown.subscribe();
        let mut interval = tokio::time::interval(self.config.claim_interval);

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Shutdown signal received, stopping executor");
                        break;
                    }
                }
                _ = interval.tick() => {
                    if let Err(e) = self.claim_and_spawn().await {
                        warn!("Scan for pending jobs failed: {}", e);
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                }
            }
        }

        info!("Waiting for in-flight jobs to complete...");
        let _ = tokio::time::timeout(self.config.shutdown_timeout, self.wait_for_jobs()).await;

        info!("Job executor stopped");
        Ok(())
    }

    /// Signal shutdown.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    /// Scan for pending jobs and spawn a pipeline for each claim won.
    async fn claim_and_spawn(&self) -> WorkerResult<()> {
        if self.job_semaphore.available_permits() == 0 {
            return Ok(());
        }

        let mut pending = self
            .ctx
            .store
            .list(&JobFilter {
                status: Some(JobStatus::Pending),
                limit: Some(SCAN_LIMIT),
                ..Default::default()
            })
            .await?;

        if pending.is_empty() {
            return Ok(());
        }

        // Priority jobs jump the queue.
        pending.sort_by_key(|job| !job.priority);

        for job in pending {
            let Some(claim) = self.try_claim(&job.id.to_string()).await? else {
                debug!(job_id = %job.id, "Job claimed by another worker");
                continue;
            };

            let permit = match self.job_semaphore.clone().try_acquire_owned() {
                Ok(permit) => permit,
                Err(_) => {
                    // No slot free; release so another worker can take it.
                    self.release_claim(&job.id.to_string(), &claim).await.ok();
                    break;
                }
            };

            let ctx = Arc::clone(&self.ctx);
            let redis = self.redis.clone();
            let job_id = job.id.clone();
            let claim_token = claim.clone();

            tokio::spawn(async move {
                let _permit = permit;

                info!(job_id = %job_id, "Executing job");
                if let Err(e) = process_job(&ctx, &job_id).await {
                    error!(job_id = %job_id, "Job execution errored: {}", e);
                }

                if let Err(e) = release_claim_with(&redis, &job_id.to_string(), &claim_token).await
                {
                    warn!(job_id = %job_id, "Failed to release claim: {}", e);
                }
            });
        }

        Ok(())
    }

    /// Try to acquire the claim lock for a job.
    async fn try_claim(&self, job_id: &str) -> WorkerResult<Option<String>> {
        let mut conn = self
            .redis
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| WorkerError::job_failed(format!("Redis connection failed: {}", e)))?;

        let claim_value = format!("{}:{}", self.worker_name, Uuid::new_v4());

        // SET key value NX EX ttl
        let result: Option<String> = redis::cmd("SET")
            .arg(claim_key(job_id))
            .arg(&claim_value)
            .arg("NX")
            .arg("EX")
            .arg(self.config.claim_ttl_secs)
            .query_async(&mut conn)
            .await
            .map_err(|e| WorkerError::job_failed(format!("Redis SET failed: {}", e)))?;

        Ok(result.map(|_| claim_value))
    }

    /// Release a claim owned by this worker.
    async fn release_claim(&self, job_id: &str, claim_token: &str) -> WorkerResult<()> {
        release_claim_with(&self.redis, job_id, claim_token).await
    }

    /// Wait for all in-flight jobs to complete.
    async fn wait_for_jobs(&self) {
        loop {
            if self.job_semaphore.available_permits() == self.config.max_concurrent_jobs {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }
}

fn claim_key(job_id: &str) -> String {
    format!("recap:claim:{}", job_id)
}

/// Delete the claim only if this worker still owns it.
async fn release_claim_with(
    redis: &redis::Client,
    job_id: &str,
    claim_token: &str,
) -> WorkerResult<()> {
    let mut conn = redis
        .get_multiplexed_async_connection()
        .await
        .map_err(|e| WorkerError::job_failed(format!("Redis connection failed: {}", e)))?;

    let script = Script::new(
        r#"
        if redis.call('GET', KEYS[1]) == ARGV[1] then
            return redis.call('DEL', KEYS[1])
        else
            return 0
        end
        "#,
    );

    let _deleted: i32 = script
        .key(claim_key(job_id))
        .arg(claim_token)
        .invoke_async(&mut conn)
        .await
        .map_err(|e| WorkerError::job_failed(format!("Redis unlock failed: {}", e)))?;

    debug!(job_id = %job_id, "Released job claim");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claim_key_format() {
        assert_eq!(claim_key("job-42"), "recap:claim:job-42");
    }
}
