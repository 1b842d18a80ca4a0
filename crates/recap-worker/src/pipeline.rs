//! Recap pipeline orchestration.
//!
//! Drives one job through probe, compression, chunking, segmentation,
//! AI description (webhook-gated), narration and stitching, reporting
//! progress into the store and over the bridge between stages. Stage errors
//! are converted into a terminal `fail_if_not_completed`; they never crash
//! the worker task.

use std::path::{Path, PathBuf};

use tracing::{debug, error, info, warn};

use recap_ai_client::{
    AiClient, DescribeRequest, DescribeSubmission, NarrationRequest, RemoteJobStatus,
    SceneDescription, SceneWindow,
};
use recap_media::{
    chunker, compressor, frame, probe, segmenter, stitch, ChunkPolicy, CompressionPolicy,
    ProcessRunner, SegmenterConfig,
};
use recap_models::{JobEvent, JobId, JobRecord, JobStatus, JobUpdate, RecapOutput, Scene};
use recap_notify::{AwaitOutcome, NotificationBridge, WebhookTokens};
use recap_store::JobStore;

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;

/// Shared services for pipeline runs.
pub struct ProcessingContext {
    pub config: WorkerConfig,
    pub store: JobStore,
    pub bridge: NotificationBridge,
    pub tokens: WebhookTokens,
    pub ai: AiClient,
    pub runner: ProcessRunner,
}

impl ProcessingContext {
    /// Create a new processing context from the environment.
    pub fn new(config: WorkerConfig) -> WorkerResult<Self> {
        let store = JobStore::from_env()?;
        let bridge = NotificationBridge::from_env()?;
        let tokens = WebhookTokens::from_env()?;
        let ai = AiClient::from_env()?;
        let runner = ProcessRunner::from_env().with_timeout(config.transcode_timeout.as_secs());

        Ok(Self {
            config,
            store,
            bridge,
            tokens,
            ai,
            runner,
        })
    }
}

/// Result of a successful pipeline run.
struct PipelineOutcome {
    output: RecapOutput,
    scenes: Vec<Scene>,
}

/// Process one claimed job end to end.
///
/// Always returns `Ok` once the job's fate is recorded; a stage error
/// becomes a terminal failure on the job, not an error of the worker task.
pub async fn process_job(ctx: &ProcessingContext, job_id: &JobId) -> WorkerResult<()> {
    let job = ctx.store.get(job_id).await?;
    if job.is_terminal() {
        info!(job_id = %job_id, status = %job.status, "Skipping terminal job");
        return Ok(());
    }

    let logger = JobLogger::new(job_id, "recap_pipeline");
    logger.log_start(&format!("Processing {}", job.filename));

    let work_dir = PathBuf::from(&ctx.config.work_dir).join(job.video_id.as_str());
    tokio::fs::create_dir_all(&work_dir).await?;

    match run_pipeline(ctx, &job, &work_dir).await {
        Ok(outcome) => {
            let applied = ctx
                .store
                .complete_if_not_failed(job_id, outcome.output.clone(), outcome.scenes)
                .await?;

            if applied {
                metrics::counter!("recap_jobs_completed_total").increment(1);
                ctx.bridge
                    .publish(
                        job_id,
                        &JobEvent::done(
                            job.video_id.as_str(),
                            Some(outcome.output.output_path.clone()),
                        ),
                    )
                    .await
                    .ok();
                logger.log_completion(&outcome.output.output_path);
            } else {
                // Lost the terminal race: report the actual final state,
                // never assume our own intent succeeded.
                let current = ctx.store.get(job_id).await?;
                logger.log_warning(&format!(
                    "completion lost the terminal race; job is {}",
                    current.status
                ));
            }
        }
        Err(e) => {
            error!(job_id = %job_id, error = ?e, "Pipeline stage failed");
            record_failure(ctx, job_id, &logger, &e).await;
        }
    }

    cleanup_artifacts(&work_dir).await;
    Ok(())
}

/// Convert a stage error into a terminal failure on the job.
async fn record_failure(
    ctx: &ProcessingContext,
    job_id: &JobId,
    logger: &JobLogger,
    err: &WorkerError,
) {
    let step = ctx
        .store
        .get(job_id)
        .await
        .ok()
        .and_then(|j| j.current_step)
        .unwrap_or_else(|| "Processing".to_string());

    let message = err.user_message();

    match ctx
        .store
        .fail_if_not_completed(job_id, message.clone(), step.as_str())
        .await
    {
        Ok(true) => {
            metrics::counter!("recap_jobs_failed_total").increment(1);
            ctx.bridge
                .publish(job_id, &JobEvent::error(&message))
                .await
                .ok();
            logger.log_error(&message);
        }
        Ok(false) => {
            let status = match ctx.store.get(job_id).await {
                Ok(job) => job.status.to_string(),
                Err(_) => "unknown".to_string(),
            };
            logger.log_warning(&format!(
                "failure lost the terminal race; job is {}",
                status
            ));
        }
        Err(store_err) => {
            error!(
                job_id = %job_id,
                error = %store_err,
                "Could not record job failure"
            );
        }
    }
}

/// Advance the job to a new stage: store write + bridge events.
async fn advance(
    ctx: &ProcessingContext,
    job_id: &JobId,
    status: JobStatus,
    step: &str,
    progress: u8,
) -> WorkerResult<()> {
    let applied = ctx
        .store
        .update(
            job_id,
            &JobUpdate::new()
                .with_status(status)
                .with_step(step)
                .with_progress(progress),
        )
        .await?;

    if applied {
        ctx.bridge
            .publish(job_id, &JobEvent::step(status, step))
            .await
            .ok();
        ctx.bridge
            .publish(job_id, &JobEvent::progress(progress))
            .await
            .ok();
    }
    Ok(())
}

/// Run the pipeline stages for one job.
async fn run_pipeline(
    ctx: &ProcessingContext,
    job: &JobRecord,
    work_dir: &Path,
) -> WorkerResult<PipelineOutcome> {
    let job_id = &job.id;
    let source = PathBuf::from(&ctx.config.upload_dir)
        .join(job.video_id.as_str())
        .join("source.mp4");

    // Probe
    advance(ctx, job_id, JobStatus::Processing, "Probing source video", 5).await?;
    let mut info = probe::probe_media(&ctx.runner, &source).await?;
    debug!(
        job_id = %job_id,
        duration = info.duration,
        size = info.size,
        "Probed source"
    );

    // Compress when oversized
    advance(ctx, job_id, JobStatus::Processing, "Preparing source video", 15).await?;
    let compression_policy = CompressionPolicy::default();
    let compressed = work_dir.join("compressed.mp4");
    let mut active = source.clone();
    if compressor::compress_if_needed(&ctx.runner, &source, &compressed, &info, &compression_policy)
        .await?
        .applied()
    {
        active = compressed;
        info = probe::probe_media(&ctx.runner, &active).await?;
    }

    // Chunk for the AI service's ceilings
    advance(
        ctx,
        job_id,
        JobStatus::Processing,
        "Splitting video for ingestion",
        25,
    )
    .await?;
    let chunk_policy = ChunkPolicy::default();
    let chunks_dir = work_dir.join("chunks");
    let chunk_paths = match chunker::plan_chunks(&info, &chunk_policy)? {
        Some(plan) => {
            chunker::split_into_chunks(&ctx.runner, &active, &chunks_dir, &info, &chunk_policy, &plan)
                .await?
        }
        None => vec![active.clone()],
    };

    // Segment the timeline
    advance(ctx, job_id, JobStatus::DetectingScenes, "Detecting scenes", 35).await?;
    let mut scenes = segmenter::segment_timeline(info.duration, &SegmenterConfig::default())?;
    ctx.store
        .update(job_id, &JobUpdate::new().with_scenes(scenes.clone()))
        .await?;
    ctx.bridge
        .publish(job_id, &JobEvent::log(format!("Detected {} scenes", scenes.len())))
        .await
        .ok();

    // Descriptions via the AI service + webhook callback
    advance(
        ctx,
        job_id,
        JobStatus::GeneratingDescriptions,
        "Generating scene descriptions",
        45,
    )
    .await?;
    let remote = describe_scenes(ctx, job, &chunk_paths, &scenes).await?;
    if !remote.is_completed() {
        return Err(WorkerError::job_failed(format!(
            "AI description failed: {}",
            remote.error.as_deref().unwrap_or("unknown error")
        )));
    }
    apply_descriptions(&mut scenes, &remote.descriptions);
    ctx.store
        .update(
            job_id,
            &JobUpdate::new().with_scenes(scenes.clone()).with_progress(60),
        )
        .await?;

    // Narration audio + best-effort frames
    advance(
        ctx,
        job_id,
        JobStatus::GeneratingAudio,
        "Synthesizing narration",
        65,
    )
    .await?;
    synthesize_narration(ctx, job_id, &active, work_dir, &mut scenes).await?;

    // Assemble the recap
    advance(ctx, job_id, JobStatus::Stitching, "Stitching recap", 85).await?;
    let output = assemble_recap(ctx, &active, work_dir, &mut scenes).await?;

    advance(ctx, job_id, JobStatus::Stitching, "Finalizing", 95).await?;

    Ok(PipelineOutcome { output, scenes })
}

/// Submit chunks for description and wait for the result.
///
/// Blocks on the notification bridge for the webhook callback; if the
/// callback never arrives, falls back to a bounded status poll of the AI
/// service. All retrying is bounded here, not in the bridge.
async fn describe_scenes(
    ctx: &ProcessingContext,
    job: &JobRecord,
    chunk_paths: &[PathBuf],
    scenes: &[Scene],
) -> WorkerResult<RemoteJobStatus> {
    let job_id = &job.id;

    let token = ctx.tokens.issue(job_id).await?;
    let callback_url = format!(
        "{}/webhooks/recap?job_id={}&token={}",
        ctx.config.callback_base_url, job_id, token
    );

    let request = DescribeRequest {
        video_id: job.video_id.to_string(),
        chunks: chunk_paths
            .iter()
            .map(|p| p.to_string_lossy().to_string())
            .collect(),
        scenes: scenes.iter().map(SceneWindow::from).collect(),
        callback_url,
    };

    let submission = ctx.ai.submit_description(&request).await?;
    info!(
        job_id = %job_id,
        remote_job_id = %submission.remote_job_id,
        "Submitted description request"
    );

    match await_callback(ctx, job_id).await? {
        Some(status) => {
            debug!(job_id = %job_id, remote_status = %status, "Callback received");
            Ok(ctx.ai.fetch_status(&submission.remote_job_id).await?)
        }
        None => poll_remote_until_finished(ctx, job_id, &submission).await,
    }
}

/// Wait for the webhook callback event, skipping the job's own progress
/// events that share the channel. Returns the remote status string, or
/// `None` when the timeout elapses.
async fn await_callback(ctx: &ProcessingContext, job_id: &JobId) -> WorkerResult<Option<String>> {
    let deadline = tokio::time::Instant::now() + ctx.config.callback_timeout;

    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        if remaining.is_zero() {
            return Ok(None);
        }

        match ctx.bridge.await_event(job_id, remaining).await? {
            AwaitOutcome::Event(JobEvent::Callback { status, .. }) => {
                return Ok(Some(status));
            }
            AwaitOutcome::Event(_) => continue,
            AwaitOutcome::TimedOut => return Ok(None),
        }
    }
}

/// Bounded fallback poll after a missed callback.
async fn poll_remote_until_finished(
    ctx: &ProcessingContext,
    job_id: &JobId,
    submission: &DescribeSubmission,
) -> WorkerResult<RemoteJobStatus> {
    warn!(
        job_id = %job_id,
        "No callback within {:?}; polling AI service",
        ctx.config.callback_timeout
    );

    for attempt in 1..=ctx.config.status_poll_attempts {
        let status = ctx.ai.fetch_status(&submission.remote_job_id).await?;
        if status.is_finished() {
            return Ok(status);
        }
        debug!(
            job_id = %job_id,
            attempt,
            remote_status = %status.status,
            "AI job still running"
        );
        tokio::time::sleep(ctx.config.status_poll_interval).await;
    }

    Err(WorkerError::job_failed(
        "timed out waiting for AI scene descriptions",
    ))
}

/// Attach description texts to their scenes by index.
fn apply_descriptions(scenes: &mut [Scene], descriptions: &[SceneDescription]) {
    for description in descriptions {
        match scenes.iter_mut().find(|s| s.index == description.index) {
            Some(scene) => scene.narration = Some(description.text.clone()),
            None => warn!(
                index = description.index,
                "Description for unknown scene index"
            ),
        }
    }

    for scene in scenes.iter().filter(|s| s.narration.is_none()) {
        warn!(index = scene.index, "Scene received no description");
    }
}

/// Synthesize narration audio per scene; grab a representative frame as
/// best-effort enrichment.
async fn synthesize_narration(
    ctx: &ProcessingContext,
    job_id: &JobId,
    active_source: &Path,
    work_dir: &Path,
    scenes: &mut [Scene],
) -> WorkerResult<()> {
    let audio_dir = work_dir.join("audio");
    let frames_dir = work_dir.join("frames");
    tokio::fs::create_dir_all(&audio_dir).await?;
    tokio::fs::create_dir_all(&frames_dir).await?;

    let total = scenes.len().max(1);
    for done in 0..scenes.len() {
        let scene = &mut scenes[done];

        if let Some(text) = scene.narration.clone() {
            let audio = ctx
                .ai
                .synthesize_narration(&NarrationRequest { text, voice: None })
                .await?;
            let path = audio_dir.join(format!("scene_{:03}.mp3", scene.index));
            tokio::fs::write(&path, &audio).await?;
            scene.audio_path = Some(path.to_string_lossy().to_string());
        }

        // A missing frame never fails the job.
        let frame_path = frames_dir.join(format!("scene_{:03}.jpg", scene.index));
        let midpoint = (scene.start + scene.end) / 2.0;
        match frame::extract_frame(&ctx.runner, active_source, &frame_path, midpoint).await {
            Ok(()) => scene.frame_path = Some(frame_path.to_string_lossy().to_string()),
            Err(e) => warn!(
                job_id = %job_id,
                scene = scene.index,
                error = %e,
                "Frame grab failed"
            ),
        }

        // Progress is best-effort last-writer-wins
        ctx.store
            .update(
                job_id,
                &JobUpdate::new().with_processed_scenes((done + 1) as u32),
            )
            .await
            .ok();
        ctx.bridge
            .publish(job_id, &JobEvent::progress(narration_progress(done + 1, total)))
            .await
            .ok();
    }

    Ok(())
}

/// Progress through the narration stage maps into [65, 80].
fn narration_progress(done: usize, total: usize) -> u8 {
    65 + ((15 * done) / total.max(1)) as u8
}

/// Extract scene clips, mux narration onto them and stitch the recap.
async fn assemble_recap(
    ctx: &ProcessingContext,
    active_source: &Path,
    work_dir: &Path,
    scenes: &mut [Scene],
) -> WorkerResult<RecapOutput> {
    let clips_dir = work_dir.join("clips");
    tokio::fs::create_dir_all(&clips_dir).await?;

    let mut final_clips = Vec::with_capacity(scenes.len());
    for scene in scenes.iter_mut() {
        let raw_clip = clips_dir.join(format!("scene_{:03}.mp4", scene.index));
        stitch::extract_segment(
            &ctx.runner,
            active_source,
            &raw_clip,
            scene.start,
            scene.duration,
        )
        .await?;

        let clip = match scene.audio_path {
            Some(ref audio) => {
                let narrated = clips_dir.join(format!("scene_{:03}_narrated.mp4", scene.index));
                stitch::mux_narration(&ctx.runner, &raw_clip, Path::new(audio), &narrated).await?;
                narrated
            }
            None => raw_clip,
        };

        scene.clip_path = Some(clip.to_string_lossy().to_string());
        scene.mark_processed();
        final_clips.push(clip);
    }

    let output_path = work_dir.join("recap.mp4");
    stitch::stitch_clips(&ctx.runner, &final_clips, &output_path).await?;

    // Derived file: recompute its metadata rather than trusting estimates.
    let out_info = probe::probe_media(&ctx.runner, &output_path).await?;

    Ok(RecapOutput {
        output_path: output_path.to_string_lossy().to_string(),
        duration: Some(out_info.duration),
        size_bytes: Some(out_info.size),
    })
}

/// Remove intermediate artifacts, keeping the recap and scene assets.
async fn cleanup_artifacts(work_dir: &Path) {
    if let Err(e) = chunker::cleanup_chunks(work_dir.join("chunks")).await {
        warn!("Chunk cleanup failed: {}", e);
    }
    if let Err(e) = tokio::fs::remove_dir_all(work_dir.join("clips")).await {
        if work_dir.join("clips").exists() {
            warn!("Clip cleanup failed: {}", e);
        }
    }
    let _ = tokio::fs::remove_file(work_dir.join("compressed.mp4")).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_descriptions_by_index() {
        let mut scenes = vec![
            Scene::new(0, 0.0, 7.0),
            Scene::new(1, 7.0, 14.0),
            Scene::new(2, 14.0, 20.0),
        ];
        let descriptions = vec![
            SceneDescription {
                index: 2,
                text: "The finale".into(),
            },
            SceneDescription {
                index: 0,
                text: "The opening".into(),
            },
            SceneDescription {
                index: 9,
                text: "Nowhere".into(),
            },
        ];

        apply_descriptions(&mut scenes, &descriptions);

        assert_eq!(scenes[0].narration.as_deref(), Some("The opening"));
        assert!(scenes[1].narration.is_none());
        assert_eq!(scenes[2].narration.as_deref(), Some("The finale"));
    }

    #[test]
    fn test_narration_progress_bounds() {
        assert_eq!(narration_progress(0, 10), 65);
        assert_eq!(narration_progress(10, 10), 80);
        assert_eq!(narration_progress(1, 0), 80); // degenerate total clamps
        assert!(narration_progress(5, 10) > 65);
        assert!(narration_progress(5, 10) < 80);
    }
}
