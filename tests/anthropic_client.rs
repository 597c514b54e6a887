//! Model client against a mock messages endpoint

use std::sync::Arc;

use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use earnings_war_room::clients::{AnthropicClient, ModelError, TextGenerator};
use earnings_war_room::config::{Config, ModelConfig};
use earnings_war_room::{GenerationState, SessionController};

fn model_config(server: &MockServer) -> ModelConfig {
    ModelConfig {
        endpoint: format!("{}/v1/messages", server.uri()),
        model: "claude-test".into(),
        timeout_ms: 2_000,
        ..ModelConfig::default()
    }
}

fn text_reply(segments: &[&str]) -> serde_json::Value {
    let content: Vec<_> = segments
        .iter()
        .map(|t| json!({"type": "text", "text": t}))
        .collect();
    json!({
        "id": "msg_01",
        "type": "message",
        "role": "assistant",
        "content": content,
        "stop_reason": "end_turn"
    })
}

#[tokio::test]
async fn sends_one_user_message_and_joins_text_segments() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(header("x-api-key", "sk-test"))
        .and(header("anthropic-version", "2023-06-01"))
        .and(body_partial_json(json!({
            "model": "claude-test",
            "max_tokens": 1000,
            "messages": [{"role": "user", "content": "hello"}]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(text_reply(&["Hel", "lo"])))
        .expect(1)
        .mount(&server)
        .await;

    let client = AnthropicClient::new(&model_config(&server), Some("sk-test".into())).unwrap();
    assert_eq!(client.invoke("hello").await.unwrap(), "Hello");
    assert_eq!(client.model_name(), "claude-test");
}

#[tokio::test]
async fn non_success_status_is_http_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(529).set_body_string("overloaded"))
        .mount(&server)
        .await;

    let client = AnthropicClient::new(&model_config(&server), Some("k".into())).unwrap();
    match client.invoke("p").await {
        Err(ModelError::Http { status, body }) => {
            assert_eq!(status, 529);
            assert_eq!(body, "overloaded");
        }
        other => panic!("expected Http error, got {:?}", other),
    }
}

#[tokio::test]
async fn undecodable_body_is_decode_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>proxy</html>"))
        .mount(&server)
        .await;

    let client = AnthropicClient::new(&model_config(&server), Some("k".into())).unwrap();
    assert!(matches!(
        client.invoke("p").await,
        Err(ModelError::Decode { .. })
    ));
}

#[tokio::test]
async fn unreachable_endpoint_is_network_error() {
    let cfg = ModelConfig {
        endpoint: "http://127.0.0.1:9/v1/messages".into(),
        timeout_ms: 2_000,
        ..ModelConfig::default()
    };
    let client = AnthropicClient::new(&cfg, Some("k".into())).unwrap();
    assert!(matches!(
        client.invoke("p").await,
        Err(ModelError::Network { .. } | ModelError::Timeout { .. })
    ));
}

#[tokio::test]
async fn session_extracts_questions_from_wrapped_reply() {
    let server = MockServer::start().await;
    let reply = text_reply(&[
        "Sure, here they are:\n```json\n[{\"id\":\"q1\",\"question\":\"Why?\",",
        "\"category\":\"AI Strategy\",\"difficulty\":\"Hard\",\"context\":\"AI\"}]\n```",
    ]);
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(reply))
        .mount(&server)
        .await;

    let mut config = Config::default();
    config.model = model_config(&server);
    let client = AnthropicClient::new(&config.model, Some("k".into())).unwrap();
    let session = SessionController::from_config(Arc::new(client), &config);

    let batch = session.generate_questions(1).await.unwrap();
    assert!(!batch.was_fallback);
    assert_eq!(batch.artifact[0].question, "Why?");
    assert_eq!(batch.artifact[0].category.label(), "AI Strategy");
}

#[tokio::test]
async fn session_falls_back_when_endpoint_fails() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let mut config = Config::default();
    config.model = model_config(&server);
    let client = AnthropicClient::new(&config.model, Some("k".into())).unwrap();
    let session = SessionController::from_config(Arc::new(client), &config);

    let batch = session.generate_questions(5).await.unwrap();
    assert!(batch.was_fallback);
    assert_eq!(batch.artifact.len(), 5);
    assert!(matches!(session.question_state(), GenerationState::Ready(_)));
}

#[tokio::test]
async fn session_without_api_key_falls_back() {
    let config = Config::default();
    let client = AnthropicClient::new(&config.model, None).unwrap();
    let session = SessionController::from_config(Arc::new(client), &config);

    let batch = session.generate_questions(5).await.unwrap();
    assert!(batch.was_fallback);
    assert_eq!(
        batch.fallback_reason.as_deref(),
        Some("ANTHROPIC_API_KEY not set")
    );
}
