//! Tests for the HTTP module

use super::*;
use crate::auth::{AuthVariant, Credentials, TokenManager};
use crate::backoff::BackoffConfig;
use crate::error::Error;
use crate::types::BackoffType;
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fast_backoff(max_attempts: u32) -> BackoffConfig {
    BackoffConfig::new(Duration::from_millis(1), Duration::from_millis(5), max_attempts)
}

fn plain_executor(server: &MockServer, backoff: BackoffConfig) -> RequestExecutor {
    let config = ExecutorConfig::builder()
        .base_url(server.uri())
        .backoff(backoff)
        .build();
    RequestExecutor::with_config(config).unwrap()
}

async fn mount_token_endpoint(server: &MockServer, expected_exchanges: u64) {
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "token",
            "expires_in": 3600
        })))
        .expect(expected_exchanges)
        .mount(server)
        .await;
}

fn authed_executor(server: &MockServer, backoff: BackoffConfig) -> RequestExecutor {
    let tokens = TokenManager::new(
        AuthVariant::Direct,
        Some(Credentials::new("client", "secret")),
        format!("{}/oauth/token", server.uri()),
    )
    .with_backoff(fast_backoff(3));

    let config = ExecutorConfig::builder()
        .base_url(server.uri())
        .backoff(backoff)
        .build();
    let client = reqwest::Client::new();
    RequestExecutor::new(client, config, Some(Arc::new(tokens)))
}

#[test]
fn test_executor_config_default() {
    let config = ExecutorConfig::default();
    assert_eq!(config.timeout, Duration::from_secs(30));
    assert!(config.base_url.is_none());
    assert!(config.correlation_id.is_none());
    assert_eq!(config.media_type, "application/vnd.piksel+json");
    assert_eq!(config.backoff.max_attempts, 4);
}

#[test]
fn test_executor_config_builder() {
    let config = ExecutorConfig::builder()
        .base_url("https://api.example.com")
        .timeout(Duration::from_secs(60))
        .backoff(fast_backoff(5).with_type(BackoffType::Linear))
        .correlation_id("corr-1")
        .header("X-Custom", "value")
        .user_agent("test-agent/1.0")
        .build();

    assert_eq!(config.base_url, Some("https://api.example.com".to_string()));
    assert_eq!(config.timeout, Duration::from_secs(60));
    assert_eq!(config.backoff.max_attempts, 5);
    assert_eq!(config.backoff.backoff_type, BackoffType::Linear);
    assert_eq!(config.correlation_id.as_deref(), Some("corr-1"));
    assert_eq!(
        config.default_headers.get("X-Custom"),
        Some(&"value".to_string())
    );
    assert_eq!(config.user_agent, "test-agent/1.0");
}

#[test]
fn test_request_spec_builder() {
    let spec = RequestSpec::get("/data/assets")
        .query("page", "1")
        .query("limit", "10")
        .header("X-Request-Id", "abc123")
        .json(json!({"key": "value"}))
        .correlation_id("override")
        .deadline(Duration::from_secs(10));

    assert_eq!(spec.query.get("page"), Some(&"1".to_string()));
    assert_eq!(spec.query.get("limit"), Some(&"10".to_string()));
    assert_eq!(spec.headers.get("X-Request-Id"), Some(&"abc123".to_string()));
    assert!(spec.body.is_some());
    assert_eq!(spec.correlation_id.as_deref(), Some("override"));
    assert_eq!(spec.deadline, Some(Duration::from_secs(10)));
}

#[test]
fn test_build_url() {
    let config = ExecutorConfig::builder()
        .base_url("https://api.example.com/")
        .build();
    let executor = RequestExecutor::with_config(config).unwrap();

    assert_eq!(
        executor.build_url("/data/assets").unwrap().as_str(),
        "https://api.example.com/data/assets"
    );
    assert_eq!(
        executor.build_url("https://other.example.com/x").unwrap().as_str(),
        "https://other.example.com/x"
    );
}

#[tokio::test]
async fn test_get_json_payload() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/data/assets"))
        .and(header("Accept", "application/vnd.piksel+json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"assets": [{"ref": "a"}]})))
        .expect(1)
        .mount(&mock_server)
        .await;

    let executor = plain_executor(&mock_server, fast_backoff(3));
    let response = executor.get("/data/assets").await.unwrap();

    assert_eq!(response.status, 200);
    assert_eq!(response.body["assets"][0]["ref"], "a");
}

#[tokio::test]
async fn test_post_sends_json_body() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/data/assets"))
        .and(header("Content-Type", "application/vnd.piksel+json"))
        .and(body_json(json!({"assets": [{"name": "a"}]})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"created": true})))
        .expect(1)
        .mount(&mock_server)
        .await;

    let executor = plain_executor(&mock_server, fast_backoff(3));
    let response = executor
        .post("/data/assets", json!({"assets": [{"name": "a"}]}))
        .await
        .unwrap();

    assert_eq!(response.status, 201);
    assert_eq!(response.body["created"], true);
}

#[tokio::test]
async fn test_empty_success_body_is_null() {
    let mock_server = MockServer::start().await;

    Mock::given(method("DELETE"))
        .and(path("/data/assets"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&mock_server)
        .await;

    let executor = plain_executor(&mock_server, fast_backoff(3));
    let response = executor
        .execute(&RequestSpec::delete("/data/assets"))
        .await
        .unwrap();

    assert_eq!(response.status, 204);
    assert!(response.body.is_null());
}

#[tokio::test]
async fn test_invalid_json_success_is_decode_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/data/assets"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let executor = plain_executor(&mock_server, fast_backoff(3));
    let err = executor.get("/data/assets").await.unwrap_err();
    assert!(matches!(err, Error::Decode { .. }));
}

#[tokio::test]
async fn test_query_params_and_headers() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/data/assets"))
        .and(query_param("owner", "acme"))
        .and(query_param("perPage", "50"))
        .and(header("X-Custom", "default"))
        .and(header("X-Request-Id", "req-456"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"assets": []})))
        .expect(1)
        .mount(&mock_server)
        .await;

    let config = ExecutorConfig::builder()
        .base_url(mock_server.uri())
        .header("X-Custom", "default")
        .build();
    let executor = RequestExecutor::with_config(config).unwrap();

    let spec = RequestSpec::get("/data/assets")
        .query("owner", "acme")
        .query("perPage", "50")
        .header("X-Request-Id", "req-456");
    executor.execute(&spec).await.unwrap();
}

#[tokio::test]
async fn test_correlation_id_header() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/default"))
        .and(header(CORRELATION_HEADER, "client-wide"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/override"))
        .and(header(CORRELATION_HEADER, "per-call"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&mock_server)
        .await;

    let config = ExecutorConfig::builder()
        .base_url(mock_server.uri())
        .correlation_id("client-wide")
        .build();
    let executor = RequestExecutor::with_config(config).unwrap();

    executor.get("/default").await.unwrap();
    executor
        .execute(&RequestSpec::get("/override").correlation_id("per-call"))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_retry_sleeps_at_least_the_computed_delays() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(3)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .mount(&mock_server)
        .await;

    // 50 + 100 + 200 ms with no jitter
    let backoff = BackoffConfig::new(Duration::from_millis(50), Duration::from_secs(1), 4);
    let executor = plain_executor(&mock_server, backoff);

    let started = Instant::now();
    let response = executor.get("/flaky").await.unwrap();

    assert_eq!(response.body["ok"], true);
    assert!(started.elapsed() >= Duration::from_millis(350));
}

#[tokio::test]
async fn test_retry_exhaustion_after_max_attempts() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/down"))
        .respond_with(ResponseTemplate::new(500).set_body_string("Server error"))
        .expect(3)
        .mount(&mock_server)
        .await;

    let executor = plain_executor(&mock_server, fast_backoff(3));
    let err = executor.get("/down").await.unwrap_err();

    match err {
        Error::RetryExhausted { attempts, last } => {
            assert_eq!(attempts, 3);
            assert!(matches!(*last, Error::HttpStatus { status: 500, .. }));
        }
        other => panic!("expected RetryExhausted, got {other:?}"),
    }
}

#[tokio::test]
async fn test_rate_limited_status_is_retried() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/limited"))
        .respond_with(ResponseTemplate::new(429).set_body_string("Rate limited"))
        .up_to_n_times(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/limited"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .mount(&mock_server)
        .await;

    let executor = plain_executor(&mock_server, fast_backoff(2));
    assert_eq!(executor.get("/limited").await.unwrap().status, 200);
}

#[tokio::test]
async fn test_fatal_status_surfaces_payload_without_retry() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"error": "Not Found"})))
        .expect(1)
        .mount(&mock_server)
        .await;

    let executor = plain_executor(&mock_server, fast_backoff(5));
    let err = executor.get("/missing").await.unwrap_err();

    match err {
        Error::FatalRequest { status, payload } => {
            assert_eq!(status, 404);
            assert_eq!(payload, json!({"error": "Not Found"}));
        }
        other => panic!("expected FatalRequest, got {other:?}"),
    }
}

#[tokio::test]
async fn test_fatal_text_payload_is_kept() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/bad"))
        .respond_with(ResponseTemplate::new(400).set_body_string("bad input"))
        .mount(&mock_server)
        .await;

    let executor = plain_executor(&mock_server, fast_backoff(3));
    let err = executor.get("/bad").await.unwrap_err();
    assert!(matches!(
        err,
        Error::FatalRequest { status: 400, payload } if payload == json!("bad input")
    ));
}

#[tokio::test]
async fn test_unauthenticated_401_is_fatal() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/secure"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&mock_server)
        .await;

    let executor = plain_executor(&mock_server, fast_backoff(3));
    let err = executor.get("/secure").await.unwrap_err();
    assert_eq!(err.status(), Some(401));
}

#[tokio::test]
async fn test_bearer_token_attached() {
    let mock_server = MockServer::start().await;
    mount_token_endpoint(&mock_server, 1).await;

    Mock::given(method("GET"))
        .and(path("/secure"))
        .and(header("Authorization", "Bearer token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .expect(2)
        .mount(&mock_server)
        .await;

    let executor = authed_executor(&mock_server, fast_backoff(3));
    executor.get("/secure").await.unwrap();
    executor.get("/secure").await.unwrap();
}

#[tokio::test]
async fn test_auth_rejection_shares_the_attempt_budget() {
    let mock_server = MockServer::start().await;
    // initial exchange plus one forced refresh
    mount_token_endpoint(&mock_server, 2).await;

    Mock::given(method("GET"))
        .and(path("/data"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/data"))
        .respond_with(ResponseTemplate::new(401))
        .up_to_n_times(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/data"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .mount(&mock_server)
        .await;

    let executor = authed_executor(&mock_server, fast_backoff(5));
    let response = executor.get("/data").await.unwrap();
    assert_eq!(response.body["ok"], true);

    let data_requests = mock_server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.url.path() == "/data")
        .count();
    assert_eq!(data_requests, 4);

    // the next logical call gets its own budget: four more failures fit in five attempts
    Mock::given(method("GET"))
        .and(path("/data"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(4)
        .with_priority(1)
        .mount(&mock_server)
        .await;

    let response = executor.get("/data").await.unwrap();
    assert_eq!(response.body["ok"], true);

    let data_requests = mock_server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.url.path() == "/data")
        .count();
    assert_eq!(data_requests, 9);
}

#[tokio::test]
async fn test_repeated_auth_rejection_is_authentication_error() {
    let mock_server = MockServer::start().await;
    // initial exchange plus a refresh after each of the first two rejections
    mount_token_endpoint(&mock_server, 3).await;

    Mock::given(method("GET"))
        .and(path("/secure"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"error": "expired"})))
        .expect(3)
        .mount(&mock_server)
        .await;

    let executor = authed_executor(&mock_server, fast_backoff(3));
    let err = executor.get("/secure").await.unwrap_err();
    assert!(matches!(err, Error::Authentication { .. }));
}

#[tokio::test]
async fn test_invalid_header_is_config_error() {
    let mock_server = MockServer::start().await;
    let executor = plain_executor(&mock_server, fast_backoff(3));

    let spec = RequestSpec::get("/data").header("X-Note", "line\nbreak");
    let err = executor.execute(&spec).await.unwrap_err();

    assert!(matches!(err, Error::Config { .. }));
    assert!(mock_server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_redirect_is_followed_with_same_headers() {
    let mock_server = MockServer::start().await;
    mount_token_endpoint(&mock_server, 1).await;

    Mock::given(method("GET"))
        .and(path("/old"))
        .respond_with(ResponseTemplate::new(302).insert_header("Location", "/new"))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/new"))
        .and(header("Authorization", "Bearer token"))
        .and(header("X-Correlation-ID", "corr-7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"moved": true})))
        .expect(1)
        .mount(&mock_server)
        .await;

    let executor = authed_executor(&mock_server, fast_backoff(3));
    let spec = RequestSpec::get("/old").correlation_id("corr-7");
    let response = executor.execute(&spec).await.unwrap();

    assert_eq!(response.body, json!({"moved": true}));
    assert_eq!(response.url.path(), "/new");
}

#[tokio::test]
async fn test_cancellation_interrupts_wait() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({}))
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&mock_server)
        .await;

    let executor = plain_executor(&mock_server, fast_backoff(3));
    let token = CancellationToken::new();
    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        canceller.cancel();
    });

    let started = Instant::now();
    let err = executor
        .execute(&RequestSpec::get("/slow").cancel_on(token))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Cancelled { .. }));
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn test_deadline_interrupts_backoff_sleep() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/down"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&mock_server)
        .await;

    let backoff = BackoffConfig::new(Duration::from_secs(5), Duration::from_secs(10), 5);
    let executor = plain_executor(&mock_server, backoff);

    let started = Instant::now();
    let err = executor
        .execute(&RequestSpec::get("/down").deadline(Duration::from_millis(200)))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Cancelled { .. }));
    assert!(started.elapsed() < Duration::from_secs(2));
}
