//! Notification bridge integration tests.

use std::time::Duration;

use recap_models::{JobEvent, JobId};
use recap_notify::{
    AwaitOutcome, NotificationBridge, WebhookConfig, WebhookGateway, WebhookTokens,
};

fn redis_url() -> String {
    dotenvy::dotenv().ok();
    std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string())
}

/// An event published while a worker awaits is delivered by broadcast.
#[tokio::test]
#[ignore = "requires Redis"]
async fn test_await_receives_broadcast() {
    let bridge = NotificationBridge::new(&redis_url()).expect("Failed to create bridge");
    let job_id = JobId::new();

    let waiter_bridge = bridge.clone();
    let waiter_id = job_id.clone();
    let waiter = tokio::spawn(async move {
        waiter_bridge
            .await_event(&waiter_id, Duration::from_secs(5))
            .await
            .expect("await_event errored")
    });

    // Give the subscription time to attach.
    tokio::time::sleep(Duration::from_millis(200)).await;
    bridge
        .publish(&job_id, &JobEvent::callback(&recap_models::WebhookPayload {
            status: "completed".into(),
            detail: None,
        }))
        .await
        .expect("publish failed");

    match waiter.await.unwrap() {
        AwaitOutcome::Event(JobEvent::Callback { status, .. }) => {
            assert_eq!(status, "completed");
        }
        other => panic!("expected callback event, got {:?}", other),
    }
}

/// An event published before the worker subscribes is still observed via the
/// durable last-event key.
#[tokio::test]
#[ignore = "requires Redis"]
async fn test_await_catches_earlier_event() {
    let bridge = NotificationBridge::new(&redis_url()).expect("Failed to create bridge");
    let job_id = JobId::new();

    bridge
        .publish(&job_id, &JobEvent::log("published before subscribe"))
        .await
        .expect("publish failed");

    let outcome = bridge
        .await_event(&job_id, Duration::from_secs(2))
        .await
        .expect("await_event errored");

    assert!(matches!(outcome, AwaitOutcome::Event(JobEvent::Log { .. })));
}

/// The timeout sentinel is returned instead of an error.
#[tokio::test]
#[ignore = "requires Redis"]
async fn test_await_times_out() {
    let bridge = NotificationBridge::new(&redis_url()).expect("Failed to create bridge");
    let job_id = JobId::new();

    let outcome = bridge
        .await_event(&job_id, Duration::from_millis(500))
        .await
        .expect("await_event errored");

    assert!(outcome.timed_out());
}

/// Token verification: wrong token fails, right token succeeds once.
#[tokio::test]
#[ignore = "requires Redis"]
async fn test_token_single_use() {
    let tokens = WebhookTokens::new(&redis_url()).expect("Failed to create tokens");
    let job_id = JobId::new();

    let token = tokens.issue(&job_id).await.expect("issue failed");

    assert!(!tokens.verify(&job_id, "wrong-token").await.unwrap());
    // A failed attempt must not burn the token.
    assert!(tokens.verify(&job_id, &token).await.unwrap());
    // Consumed on first success.
    assert!(!tokens.verify(&job_id, &token).await.unwrap());
}

/// Webhook auth matrix: bad token rejected (no publish), good token with no
/// signature and no secret accepted, good token with wrong signature
/// rejected when a secret is configured.
#[tokio::test]
#[ignore = "requires Redis"]
async fn test_callback_authentication() {
    let url = redis_url();
    let tokens = WebhookTokens::new(&url).unwrap();
    let bridge = NotificationBridge::new(&url).unwrap();
    let body = br#"{"status":"completed"}"#;

    // Bad token: rejected, nothing published.
    let gateway = WebhookGateway::new(tokens.clone(), bridge.clone(), WebhookConfig::default());
    let job_id = JobId::new();
    tokens.issue(&job_id).await.unwrap();
    let err = gateway
        .handle_callback(&job_id, "bad-token", body, None)
        .await
        .unwrap_err();
    assert!(err.is_authentication());
    assert!(bridge
        .await_event(&job_id, Duration::from_millis(300))
        .await
        .unwrap()
        .timed_out());

    // Good token, no secret configured: accepted.
    let job_id = JobId::new();
    let token = tokens.issue(&job_id).await.unwrap();
    let payload = gateway
        .handle_callback(&job_id, &token, body, None)
        .await
        .expect("callback should be accepted");
    assert_eq!(payload.status, "completed");

    // Good token, secret configured, wrong HMAC: rejected.
    let gateway = WebhookGateway::new(
        tokens.clone(),
        bridge.clone(),
        WebhookConfig {
            shared_secret: Some("topsecret".into()),
        },
    );
    let job_id = JobId::new();
    let token = tokens.issue(&job_id).await.unwrap();
    let err = gateway
        .handle_callback(&job_id, &token, body, Some("AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA="))
        .await
        .unwrap_err();
    assert!(err.is_authentication());
}
