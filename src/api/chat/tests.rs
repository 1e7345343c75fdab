use super::*;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config_for(base_url: &str) -> EmbeddingConfig {
    let mut config = EmbeddingConfig {
        openai_api_key: Some("sk-test".to_string()),
        retry_attempts: 2,
        ..EmbeddingConfig::default()
    };
    config.openai.base_url = base_url.to_string();
    config
}

#[test]
fn chat_requires_api_key() {
    let config = EmbeddingConfig::default();
    assert!(matches!(
        OpenAiChat::new(&config),
        Err(RagError::Configuration(_))
    ));
}

#[tokio::test]
async fn completion_sends_system_and_user_messages() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("Authorization", "Bearer sk-test"))
        .and(body_partial_json(json!({
            "model": "gpt-4",
            "messages": [
                {"role": "system", "content": "You are a helpful coding assistant."},
                {"role": "user", "content": "Where is main?"}
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"role": "assistant", "content": "In src/main.rs"}}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let chat = OpenAiChat::new(&config_for(&server.uri())).expect("should create chat model");
    let answer = chat
        .complete("Where is main?", DEFAULT_CHAT_MODEL)
        .await
        .expect("should complete");
    assert_eq!(answer, "In src/main.rs");
}

#[tokio::test]
async fn empty_choices_are_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "choices": [] })))
        .mount(&server)
        .await;

    let chat = OpenAiChat::new(&config_for(&server.uri())).expect("should create chat model");
    let result = chat.complete("hello", "gpt-4o-mini").await;
    assert!(matches!(result, Err(RagError::Other(_))));
}

#[tokio::test]
async fn server_errors_exhaust_retries() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(502))
        .expect(2)
        .mount(&server)
        .await;

    let chat = OpenAiChat::new(&config_for(&server.uri()))
        .expect("should create chat model")
        .with_backoff(Duration::from_millis(1));
    let result = chat.complete("hello", "gpt-4").await;
    assert!(matches!(result, Err(RagError::ProviderUnavailable(_))));
}
