//! HTTP client tests against a mocked completion backend and ticket service

use quota_relay::completion::{CompletionClient, HttpCompletionClient};
use quota_relay::config::Config;
use quota_relay::redemption::{HttpRedemptionClient, RedemptionClient, RedemptionOutcome};
use quota_relay::Error;
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{body_json, body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config_for(server: &MockServer) -> Config {
    let mut config = Config::for_test(&std::env::temp_dir());
    config.completion_url = format!("{}/api", server.uri());
    config.redemption_url = format!("{}/ticket/consume", server.uri());
    config
}

// ============================================================================
// Completion
// ============================================================================

#[tokio::test]
async fn test_completion_success_trims_message() {
    let server = MockServer::start().await;
    let config = config_for(&server);
    Mock::given(method("POST"))
        .and(path("/api"))
        .and(body_json(json!({
            "prompt": "hello",
            "conversation_id": config.conversation_id,
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"message": "  hi there \n"})))
        .expect(1)
        .mount(&server)
        .await;

    let client = HttpCompletionClient::new(&config);
    assert_eq!(client.complete("hello").await.unwrap(), "hi there");
}

#[tokio::test]
async fn test_completion_http_error_keeps_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api"))
        .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
        .mount(&server)
        .await;

    let client = HttpCompletionClient::new(&config_for(&server));
    let err = client.complete("hello").await.unwrap_err();
    assert_eq!(err.status, Some(429));
    assert!(err.message.contains("rate limited"));
}

#[tokio::test]
async fn test_completion_timeout_has_no_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"message": "late"}))
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&server)
        .await;

    let client =
        HttpCompletionClient::new(&config_for(&server)).with_timeout(Duration::from_millis(200));
    let err = client.complete("hello").await.unwrap_err();
    assert_eq!(err.status, None);
    assert!(err.message.contains("timed out"));
}

#[tokio::test]
async fn test_completion_missing_message_is_empty_answer() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;

    let client = HttpCompletionClient::new(&config_for(&server));
    assert_eq!(client.complete("hello").await.unwrap(), "");
}

// ============================================================================
// Redemption
// ============================================================================

#[tokio::test]
async fn test_redemption_accepted() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/ticket/consume"))
        .and(header("content-type", "application/x-www-form-urlencoded"))
        .and(body_string_contains("userId=ABC123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"code": 0, "message": "ok"})))
        .expect(1)
        .mount(&server)
        .await;

    let client = HttpRedemptionClient::new(&config_for(&server));
    assert_eq!(client.redeem("ABC123").await.unwrap(), RedemptionOutcome::Accepted);
}

#[tokio::test]
async fn test_redemption_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/ticket/consume"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"code": 4001, "message": "already used"})),
        )
        .mount(&server)
        .await;

    let client = HttpRedemptionClient::new(&config_for(&server));
    assert_eq!(
        client.redeem("OLD").await.unwrap(),
        RedemptionOutcome::Rejected {
            code: 4001,
            message: "already used".to_string(),
        }
    );
}

#[tokio::test]
async fn test_redemption_server_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/ticket/consume"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let client = HttpRedemptionClient::new(&config_for(&server));
    let err = client.redeem("ABC").await.unwrap_err();
    assert!(matches!(err, Error::Redemption(_)));
}
