//! End-to-end HTTP tests over a real TCP listener.

mod common;

use std::sync::Arc;
use std::time::Duration;

use grove::cache::{GROVE_CACHE_HEADER, KeyBuilder};
use grove::gateway::{ApiResponse, ScoreData, ScoreRequest};
use grove::lifecycle::DehydrationResult;
use grove::scoring::MockScorer;

use common::harness::{TEST_NAMESPACE, TestServerConfig, spawn_test_server};

async fn post_inputs(
    client: &reqwest::Client,
    url: &str,
    inputs: &str,
) -> (reqwest::StatusCode, Option<String>, ApiResponse<ScoreData>) {
    let response = client
        .post(url)
        .json(&ScoreRequest {
            inputs: inputs.to_string(),
        })
        .send()
        .await
        .expect("request sent");
    let status = response.status();
    let cache = response
        .headers()
        .get(GROVE_CACHE_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let body = response.json().await.expect("envelope body");
    (status, cache, body)
}

#[tokio::test]
async fn test_health_endpoint_returns_ok() {
    let server = spawn_test_server(TestServerConfig::default())
        .await
        .expect("server starts");

    let response = reqwest::get(format!("{}/healthz", server.url()))
        .await
        .expect("health request");
    assert!(response.status().is_success());

    let ready: serde_json::Value = reqwest::get(format!("{}/ready", server.url()))
        .await
        .expect("ready request")
        .json()
        .await
        .expect("ready body");
    assert_eq!(ready["status"], "ready");
    assert_eq!(ready["scorer_mode"], "stub");
}

#[tokio::test]
async fn test_stub_scorer_end_to_end_is_cached() {
    let server = spawn_test_server(TestServerConfig::default())
        .await
        .expect("server starts");
    let client = reqwest::Client::new();

    let (status, cache, first) =
        post_inputs(&client, &server.extract_url(), "The quick brown fox").await;
    assert_eq!(status, reqwest::StatusCode::OK);
    assert_eq!(cache.as_deref(), Some("MISS"));
    assert!(first.is_ok());
    let score = first.data.expect("data").dec_score;
    assert!(score.is_finite() && score >= 0.0);

    let (_, cache, second) =
        post_inputs(&client, &server.extract_url(), "The quick brown fox").await;
    assert_eq!(cache.as_deref(), Some("HIT"));
    assert_eq!(second.data.expect("data").dec_score, score);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_requests_compute_once() {
    let scorer = Arc::new(MockScorer::new(0.5).with_delay(Duration::from_millis(300)));
    let server = spawn_test_server(TestServerConfig {
        scorer: Some(scorer.clone()),
        ..Default::default()
    })
    .await
    .expect("server starts");
    let client = reqwest::Client::new();
    let url = server.extract_url();

    let results = futures::future::join_all(
        (0..8).map(|_| post_inputs(&client, &url, "Same text")),
    )
    .await;

    for (status, _, body) in &results {
        assert_eq!(*status, reqwest::StatusCode::OK);
        assert_eq!(body.data.expect("data").dec_score, 0.5);
    }
    let misses = results
        .iter()
        .filter(|(_, cache, _)| cache.as_deref() == Some("MISS"))
        .count();
    assert_eq!(misses, 1);
    assert_eq!(scorer.calls(), 1);
}

#[tokio::test]
async fn test_whitespace_rejected_over_http() {
    let scorer = Arc::new(MockScorer::new(0.5));
    let server = spawn_test_server(TestServerConfig {
        scorer: Some(scorer.clone()),
        ..Default::default()
    })
    .await
    .expect("server starts");

    let (status, _, body) =
        post_inputs(&reqwest::Client::new(), &server.extract_url(), "   ").await;

    assert_eq!(status, reqwest::StatusCode::BAD_REQUEST);
    assert_eq!(body.code, "INVALID_INPUT");
    assert!(body.data.is_none());
    assert_eq!(scorer.calls(), 0);
}

#[tokio::test]
async fn test_snapshot_survives_restart() {
    let dir = tempfile::TempDir::new().expect("temp dir");
    let snapshot = dir.path().join("scores.rkyv");
    let client = reqwest::Client::new();

    let first_scorer = Arc::new(MockScorer::new(0.1732));
    let server = spawn_test_server(TestServerConfig {
        scorer: Some(first_scorer.clone()),
        snapshot_path: Some(snapshot.clone()),
        ..Default::default()
    })
    .await
    .expect("first server starts");
    post_inputs(&client, &server.extract_url(), "persist me").await;
    let written = server.shutdown().await.expect("dehydrate");
    assert!(matches!(written, DehydrationResult::Success { entries: 1, .. }));

    let second_scorer = Arc::new(MockScorer::new(0.99));
    let server = spawn_test_server(TestServerConfig {
        scorer: Some(second_scorer.clone()),
        snapshot_path: Some(snapshot.clone()),
        ..Default::default()
    })
    .await
    .expect("second server starts");

    let key = KeyBuilder::new(TEST_NAMESPACE).build("persist me").expect("key");
    assert!(server.backend.get(&key).await.expect("get").is_some());

    let (_, cache, body) = post_inputs(&client, &server.extract_url(), "persist me").await;
    assert_eq!(cache.as_deref(), Some("HIT"));
    assert_eq!(body.data.expect("data").dec_score, 0.1732);
    assert_eq!(second_scorer.calls(), 0);
}

#[tokio::test]
async fn test_requests_after_shutdown_close_fail_fast() {
    let server = spawn_test_server(TestServerConfig::default())
        .await
        .expect("server starts");
    let backend = Arc::clone(&server.backend);

    server.shutdown().await.expect("close");

    assert!(backend.is_closed());
    let key = KeyBuilder::new(TEST_NAMESPACE).build("late").expect("key");
    assert!(backend.get(&key).await.is_err());
}
