//! Job event publish/subscribe with a durable fallback.
//!
//! Pub/sub delivery alone is lossy for subscribers that attach late, so
//! every publish is two writes: a fire-and-forget broadcast on the job's
//! channel and a TTL'd last-event key. [`NotificationBridge::await_event`]
//! races a subscription against a poll of that key and returns a timeout
//! sentinel instead of hanging, which is the worker's cancellation
//! mechanism.

use std::pin::Pin;
use std::time::Duration;

use futures_util::{Stream, StreamExt};
use redis::AsyncCommands;
use tracing::debug;

use recap_models::{JobEvent, JobId};

use crate::error::NotifyResult;

/// Durable last-event lifetime (1 hour).
pub const EVENT_TTL_SECS: u64 = 3600;

/// Interval between durable-key polls while awaiting.
const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Result of awaiting a job event.
#[derive(Debug, Clone)]
pub enum AwaitOutcome {
    /// An event arrived, by broadcast or via the durable key.
    Event(JobEvent),
    /// The timeout elapsed first; the caller decides whether to re-poll the
    /// upstream service or fail the job.
    TimedOut,
}

impl AwaitOutcome {
    /// Whether the await timed out.
    pub fn timed_out(&self) -> bool {
        matches!(self, AwaitOutcome::TimedOut)
    }
}

/// Publish/subscribe channel for job events.
#[derive(Clone)]
pub struct NotificationBridge {
    client: redis::Client,
}

impl NotificationBridge {
    /// Create a new bridge.
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

    /// Get the channel name for a job.
    pub fn channel_name(job_id: &JobId) -> String {
        format!("recap:events:{}", job_id)
    }

    fn last_event_key(job_id: &JobId) -> String {
        format!("recap:events:last:{}", job_id)
    }

    /// Publish an event: broadcast to all subscribers and store it durably
    /// under the job's last-event key so late subscribers still observe it.
    pub async fn publish(&self, job_id: &JobId, event: &JobEvent) -> NotifyResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let payload = serde_json::to_string(event)?;

        debug!(job_id = %job_id, "Publishing job event");
        conn.publish::<_, _, ()>(Self::channel_name(job_id), &payload)
            .await?;
        conn.set_ex::<_, _, ()>(Self::last_event_key(job_id), &payload, EVENT_TTL_SECS)
            .await?;

        Ok(())
    }

    /// Subscribe to a job's event channel.
    /// Returns a pinned stream that can be polled with `.next()`.
    pub async fn subscribe(
        &self,
        job_id: &JobId,
    ) -> NotifyResult<Pin<Box<dyn Stream<Item = JobEvent> + Send>>> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.subscribe(Self::channel_name(job_id)).await?;

        let stream = pubsub.into_on_message().filter_map(|msg| async move {
            let payload: String = msg.get_payload().ok()?;
            serde_json::from_str(&payload).ok()
        });

        Ok(Box::pin(stream))
    }

    /// Consume the durable last-event key, if set.
    async fn take_last_event(&self, job_id: &JobId) -> NotifyResult<Option<JobEvent>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let key = Self::last_event_key(job_id);

        let payload: Option<String> = conn.get(&key).await?;
        let Some(payload) = payload else {
            return Ok(None);
        };
        conn.del::<_, ()>(&key).await?;

        Ok(serde_json::from_str(&payload).ok())
    }

    /// Block until an event for the job arrives or the timeout elapses.
    ///
    /// The subscription is opened before the durable key is checked, so an
    /// event published at any point (before, during or after the call)
    /// is observed exactly once by this waiter.
    pub async fn await_event(
        &self,
        job_id: &JobId,
        timeout: Duration,
    ) -> NotifyResult<AwaitOutcome> {
        let deadline = tokio::time::Instant::now() + timeout;
        let mut stream = self.subscribe(job_id).await?;

        // Catch anything published before the subscription existed.
        if let Some(event) = self.take_last_event(job_id).await? {
            return Ok(AwaitOutcome::Event(event));
        }

        let mut poll = tokio::time::interval(POLL_INTERVAL);
        poll.tick().await; // first tick fires immediately
        let mut stream_open = true;

        loop {
            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => {
                    debug!(job_id = %job_id, "Timed out awaiting job event");
                    return Ok(AwaitOutcome::TimedOut);
                }
                maybe = stream.next(), if stream_open => {
                    match maybe {
                        Some(event) => return Ok(AwaitOutcome::Event(event)),
                        // Pub/sub connection dropped; the durable-key poll
                        // keeps the wait alive.
                        None => stream_open = false,
                    }
                }
                _ = poll.tick() => {
                    if let Some(event) = self.take_last_event(job_id).await? {
                        return Ok(AwaitOutcome::Event(event));
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_names() {
        let id = JobId::from_string("job-7");
        assert_eq!(NotificationBridge::channel_name(&id), "recap:events:job-7");
        assert_eq!(
            NotificationBridge::last_event_key(&id),
            "recap:events:last:job-7"
        );
    }

    #[test]
    fn test_await_outcome() {
        assert!(AwaitOutcome::TimedOut.timed_out());
        assert!(!AwaitOutcome::Event(JobEvent::progress(1)).timed_out());
    }
}
