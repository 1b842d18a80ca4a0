//! Job store integration tests.

use recap_models::{JobOptions, JobStatus, JobUpdate, RecapOutput, Scene, VideoId};
use recap_store::{JobFilter, JobStore};

fn output() -> RecapOutput {
    RecapOutput {
        output_path: "out/recap.mp4".into(),
        duration: Some(20.0),
        size_bytes: None,
    }
}

/// Test job creation, update and readback.
#[tokio::test]
#[ignore = "requires Redis"]
async fn test_create_update_get() {
    dotenvy::dotenv().ok();

    let store = JobStore::from_env().expect("Failed to create store");
    let job_id = store
        .create(VideoId::new(), "lifecycle.mp4", JobOptions::default())
        .await
        .expect("Failed to create job");

    let job = store.get(&job_id).await.expect("Failed to get job");
    assert_eq!(job.status, JobStatus::Pending);

    let applied = store
        .update(
            &job_id,
            &JobUpdate::new()
                .with_status(JobStatus::Processing)
                .with_progress(10)
                .with_step("Probing source video"),
        )
        .await
        .expect("Failed to update job");
    assert!(applied);

    let job = store.get(&job_id).await.expect("Failed to get job");
    assert_eq!(job.status, JobStatus::Processing);
    assert_eq!(job.progress, 10);
    assert_eq!(job.current_step.as_deref(), Some("Probing source video"));

    store.delete(&job_id).await.expect("Failed to delete job");
    assert!(store.get(&job_id).await.is_err());
}

/// Exactly one of two racing terminal transitions may apply.
#[tokio::test]
#[ignore = "requires Redis"]
async fn test_terminal_race_exactly_once() {
    dotenvy::dotenv().ok();

    let store = JobStore::from_env().expect("Failed to create store");

    for _ in 0..20 {
        let job_id = store
            .create(VideoId::new(), "race.mp4", JobOptions::default())
            .await
            .expect("Failed to create job");

        let complete_store = store.clone();
        let complete_id = job_id.clone();
        let complete = tokio::spawn(async move {
            complete_store
                .complete_if_not_failed(&complete_id, output(), vec![Scene::new(0, 0.0, 20.0)])
                .await
                .expect("complete call errored")
        });

        let fail_store = store.clone();
        let fail_id = job_id.clone();
        let fail = tokio::spawn(async move {
            fail_store
                .fail_if_not_completed(&fail_id, "transcode crashed", "Stitching")
                .await
                .expect("fail call errored")
        });

        let (completed, failed) = (complete.await.unwrap(), fail.await.unwrap());
        assert!(
            completed ^ failed,
            "exactly one terminal transition must apply (got {} / {})",
            completed,
            failed
        );

        let job = store.get(&job_id).await.expect("Failed to get job");
        if completed {
            assert_eq!(job.status, JobStatus::Completed);
            assert!(job.output.is_some());
        } else {
            assert_eq!(job.status, JobStatus::Failed);
            assert_eq!(job.error_message.as_deref(), Some("transcode crashed"));
        }

        store.delete(&job_id).await.ok();
    }
}

/// Terminal transitions are idempotent no-ops once a job is terminal.
#[tokio::test]
#[ignore = "requires Redis"]
async fn test_terminal_idempotent_noop() {
    dotenvy::dotenv().ok();

    let store = JobStore::from_env().expect("Failed to create store");
    let job_id = store
        .create(VideoId::new(), "idempotent.mp4", JobOptions::default())
        .await
        .expect("Failed to create job");

    assert!(store
        .complete_if_not_failed(&job_id, output(), vec![])
        .await
        .unwrap());

    // Repeating either terminal call never applies and never mutates.
    assert!(!store
        .complete_if_not_failed(&job_id, output(), vec![])
        .await
        .unwrap());
    assert!(!store
        .fail_if_not_completed(&job_id, "late failure", "Stitching")
        .await
        .unwrap());

    let job = store.get(&job_id).await.unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert!(job.error_message.is_none());

    store.delete(&job_id).await.ok();
}

/// Updates against a terminal job are dropped silently.
#[tokio::test]
#[ignore = "requires Redis"]
async fn test_update_after_terminal_is_noop() {
    dotenvy::dotenv().ok();

    let store = JobStore::from_env().expect("Failed to create store");
    let job_id = store
        .create(VideoId::new(), "stale.mp4", JobOptions::default())
        .await
        .expect("Failed to create job");

    store
        .complete_if_not_failed(&job_id, output(), vec![])
        .await
        .unwrap();

    let applied = store
        .update(&job_id, &JobUpdate::new().with_progress(40))
        .await
        .unwrap();
    assert!(!applied);

    let job = store.get(&job_id).await.unwrap();
    assert_eq!(job.progress, 100);

    store.delete(&job_id).await.ok();
}

/// Updates may not smuggle a terminal status past the transition API.
#[tokio::test]
#[ignore = "requires Redis"]
async fn test_update_rejects_terminal_status() {
    dotenvy::dotenv().ok();

    let store = JobStore::from_env().expect("Failed to create store");
    let job_id = store
        .create(VideoId::new(), "guard.mp4", JobOptions::default())
        .await
        .expect("Failed to create job");

    let result = store
        .update(&job_id, &JobUpdate::new().with_status(JobStatus::Completed))
        .await;
    assert!(result.is_err());

    store.delete(&job_id).await.ok();
}

/// Listing returns newest-first with owner filter.
#[tokio::test]
#[ignore = "requires Redis"]
async fn test_list_newest_first() {
    dotenvy::dotenv().ok();

    let store = JobStore::from_env().expect("Failed to create store");
    let owner = format!("list-test-{}", uuid_suffix());

    let mut ids = Vec::new();
    for i in 0..3 {
        let id = store
            .create(
                VideoId::new(),
                format!("video_{}.mp4", i),
                JobOptions {
                    user_id: Some(owner.clone()),
                    ..Default::default()
                },
            )
            .await
            .expect("Failed to create job");
        ids.push(id);
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }

    let jobs = store
        .list(&JobFilter::default().with_owner(&owner))
        .await
        .expect("Failed to list jobs");

    assert_eq!(jobs.len(), 3);
    assert_eq!(jobs[0].filename, "video_2.mp4");
    assert_eq!(jobs[2].filename, "video_0.mp4");

    for id in &ids {
        store.delete(id).await.ok();
    }
}

fn uuid_suffix() -> String {
    recap_models::JobId::new().to_string()
}
