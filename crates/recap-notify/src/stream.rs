//! Live update stream.
//!
//! A persistent consumer first receives the current job snapshot, then every
//! bridge event for that job until a terminal status is observed, at which
//! point the stream ends. Transport framing (WebSocket/SSE) belongs to the
//! serving layer; this module only builds the event stream.

use std::pin::Pin;

use futures_util::{future, stream, Stream, StreamExt};

use recap_models::{JobEvent, JobId};
use recap_store::JobStore;

use crate::bridge::NotificationBridge;
use crate::error::NotifyResult;

/// Build the update stream for a job.
///
/// Emits the snapshot first. A job already terminal yields only its
/// snapshot. Unknown jobs surface the store's NotFound error.
pub async fn stream_job_updates(
    store: &JobStore,
    bridge: &NotificationBridge,
    job_id: &JobId,
) -> NotifyResult<Pin<Box<dyn Stream<Item = JobEvent> + Send>>> {
    let job = store.get(job_id).await?;
    let snapshot = JobEvent::snapshot(&job);

    if job.is_terminal() {
        return Ok(Box::pin(stream::iter([snapshot])));
    }

    let events = bridge.subscribe(job_id).await?;

    // Forward events up to and including the first terminal one.
    let events = events.scan(false, |ended, event| {
        if *ended {
            return future::ready(None);
        }
        if event.is_terminal() {
            *ended = true;
        }
        future::ready(Some(event))
    });

    Ok(Box::pin(stream::iter([snapshot]).chain(events)))
}
