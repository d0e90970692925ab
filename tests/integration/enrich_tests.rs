//! Provider fallback against mock chat-completions endpoints

use crate::common::{chat_response, create_test_config};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use trend_relay::config::Config;
use trend_relay::crawler::GovernorRegistry;
use trend_relay::enrich::{EnrichmentRequest, FallbackExecutor, ProviderChain};
use trend_relay::state::RateSettings;
use trend_relay::{EnrichError, ProviderError};
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn create_executor(config: &Config) -> (FallbackExecutor, ProviderChain) {
    let chain = ProviderChain::from_config(&config.enrichment, reqwest::Client::new()).unwrap();
    let governors = Arc::new(GovernorRegistry::new(RateSettings::from(&config.rate_limit)));
    let executor = FallbackExecutor::from_config(&config.enrichment, governors, CancellationToken::new());
    (executor, chain)
}

fn request() -> EnrichmentRequest {
    EnrichmentRequest {
        subject: "acme/rocket".to_string(),
        prompt: "Summarize acme/rocket".to_string(),
        max_tokens: 100,
        temperature: 0.5,
    }
}

#[tokio::test]
async fn test_first_provider_answers() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    Mock::given(method("POST"))
        .and(path("/primary/chat/completions"))
        .and(header("authorization", "Bearer key-1"))
        .and(body_partial_json(serde_json::json!({ "model": "primary-model" })))
        .respond_with(chat_response("  A rocket library.  "))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/secondary/chat/completions"))
        .respond_with(chat_response("unused"))
        .expect(0)
        .mount(&server)
        .await;

    let config = create_test_config(&server.uri(), &server.uri(), dir.path(), "");
    let (executor, chain) = create_executor(&config);

    let response = executor.run(&chain, &request()).await.unwrap();
    assert_eq!(response.provider_id, "primary");
    assert_eq!(response.content, "A rocket library.");
    assert_eq!(response.attempts, 1);
}

#[tokio::test]
async fn test_falls_back_after_retries() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    // max-retries = 1, so the primary is tried twice
    Mock::given(method("POST"))
        .and(path("/primary/chat/completions"))
        .respond_with(ResponseTemplate::new(500).set_body_string("overloaded"))
        .expect(2)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/secondary/chat/completions"))
        .respond_with(chat_response("Fallback summary"))
        .expect(1)
        .mount(&server)
        .await;

    let config = create_test_config(&server.uri(), &server.uri(), dir.path(), "");
    let (executor, chain) = create_executor(&config);

    let response = executor.run(&chain, &request()).await.unwrap();
    assert_eq!(response.provider_id, "secondary");
    assert_eq!(response.content, "Fallback summary");
}

#[tokio::test]
async fn test_malformed_response_is_a_failed_attempt() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    Mock::given(method("POST"))
        .and(path("/primary/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "choices": [] })))
        .expect(2)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/secondary/chat/completions"))
        .respond_with(chat_response("Second opinion"))
        .mount(&server)
        .await;

    let config = create_test_config(&server.uri(), &server.uri(), dir.path(), "");
    let (executor, chain) = create_executor(&config);

    let response = executor.run(&chain, &request()).await.unwrap();
    assert_eq!(response.provider_id, "secondary");
}

#[tokio::test]
async fn test_all_providers_failed_reports_each() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    Mock::given(method("POST"))
        .and(path("/primary/chat/completions"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/secondary/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
        .mount(&server)
        .await;

    let config = create_test_config(&server.uri(), &server.uri(), dir.path(), "");
    let (executor, chain) = create_executor(&config);

    match executor.run(&chain, &request()).await {
        Err(EnrichError::AllProvidersFailed { failures }) => {
            assert_eq!(failures.len(), 2);
            assert_eq!(failures[0], ("primary".to_string(), ProviderError::RateLimited));
            assert_eq!(failures[1].0, "secondary");
            assert!(matches!(failures[1].1, ProviderError::Api(_)));
        }
        other => panic!("expected AllProvidersFailed, got {:?}", other),
    }
}
