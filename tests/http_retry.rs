//! Retry and error classification for provider requests.

mod common;

use std::time::Duration;

use ragtrace::http::{build_client, post_json_with_retry, RetryPolicy};
use ragtrace_core::RagError;
use serde_json::json;

use common::spawn_mock;

fn fast(max_retries: u32) -> RetryPolicy {
    RetryPolicy::new(max_retries, Duration::from_millis(5))
}

fn client() -> reqwest::Client {
    build_client(Duration::from_secs(5)).unwrap()
}

#[tokio::test]
async fn test_transient_errors_are_retried() {
    let mock = spawn_mock().await;
    let value = post_json_with_retry(
        &client(),
        "mock",
        &mock.url("/flaky"),
        None,
        &json!({}),
        &fast(3),
    )
    .await
    .unwrap();
    assert_eq!(value["ok"], true);
    assert_eq!(mock.state.hits("/flaky"), 3);
}

#[tokio::test]
async fn test_retry_budget_exhausted_is_network_error() {
    let mock = spawn_mock().await;
    let err = post_json_with_retry(
        &client(),
        "mock",
        &mock.url("/always-down"),
        None,
        &json!({}),
        &fast(2),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, RagError::Network { .. }), "got {err:?}");
    assert_eq!(mock.state.hits("/always-down"), 3);
}

#[tokio::test]
async fn test_auth_failure_is_not_retried() {
    let mock = spawn_mock().await;
    let err = post_json_with_retry(
        &client(),
        "mock",
        &mock.url("/unauthorized"),
        Some("nope"),
        &json!({}),
        &fast(4),
    )
    .await
    .unwrap_err();
    match err {
        RagError::Auth { provider, message } => {
            assert_eq!(provider, "mock");
            assert!(message.contains("401"));
        }
        other => panic!("expected auth error, got {other:?}"),
    }
    assert_eq!(mock.state.hits("/unauthorized"), 1);
}

#[tokio::test]
async fn test_client_error_is_provider_error() {
    let mock = spawn_mock().await;
    let err = post_json_with_retry(
        &client(),
        "mock",
        &mock.url("/bad-request"),
        None,
        &json!({}),
        &fast(4),
    )
    .await
    .unwrap_err();
    match err {
        RagError::Provider { message, .. } => assert!(message.contains("tempreature")),
        other => panic!("expected provider error, got {other:?}"),
    }
    assert_eq!(mock.state.hits("/bad-request"), 1);
}

#[tokio::test]
async fn test_unreachable_host_is_network_error() {
    // Bind then drop to get a port nothing listens on.
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = post_json_with_retry(
        &client(),
        "mock",
        &format!("http://{}/v1/embeddings", addr),
        None,
        &json!({}),
        &fast(1),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, RagError::Network { .. }), "got {err:?}");
}
