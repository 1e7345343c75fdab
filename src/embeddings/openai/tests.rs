use super::*;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config_for(base_url: &str, model: &str) -> EmbeddingConfig {
    let mut config = EmbeddingConfig {
        openai_api_key: Some("sk-test".to_string()),
        retry_attempts: 2,
        ..EmbeddingConfig::default()
    };
    config.openai.base_url = base_url.to_string();
    config.openai.model = model.to_string();
    config
}

fn vector(dimension: usize, value: f32) -> Vec<f32> {
    vec![value; dimension]
}

#[test]
fn dimension_follows_model_name() {
    assert_eq!(model_dimension("text-embedding-3-small"), 1536);
    assert_eq!(model_dimension("text-embedding-ada-002"), 1536);
    assert_eq!(model_dimension("text-embedding-3-large"), 3072);
}

#[test]
fn missing_api_key_is_configuration_error() {
    let mut config = EmbeddingConfig::default();
    config.openai_api_key = None;
    assert!(matches!(
        OpenAiProvider::new(&config),
        Err(RagError::Configuration(_))
    ));

    config.openai_api_key = Some("   ".to_string());
    assert!(matches!(
        OpenAiProvider::new(&config),
        Err(RagError::Configuration(_))
    ));
}

#[test]
fn provider_reports_name_and_dimension() {
    let provider = OpenAiProvider::new(&config_for("http://localhost:1", "text-embedding-3-large"))
        .expect("should create provider");
    assert_eq!(provider.name(), "openai");
    assert_eq!(provider.dimension(), 3072);
    assert_eq!(provider.model(), "text-embedding-3-large");
}

#[tokio::test]
async fn batch_is_reordered_by_index() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .and(header("Authorization", "Bearer sk-test"))
        .and(body_partial_json(json!({
            "model": "text-embedding-3-small",
            "input": ["first", "second"],
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [
                {"index": 1, "embedding": vector(1536, 0.2)},
                {"index": 0, "embedding": vector(1536, 0.1)},
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let provider = OpenAiProvider::new(&config_for(&server.uri(), "text-embedding-3-small"))
        .expect("should create provider");
    let embeddings = provider
        .embed_batch(&["first".to_string(), "second".to_string()])
        .await
        .expect("should embed batch");

    assert_eq!(embeddings.len(), 2);
    assert!((embeddings[0][0] - 0.1).abs() < f32::EPSILON);
    assert!((embeddings[1][0] - 0.2).abs() < f32::EPSILON);
}

#[tokio::test]
async fn empty_batch_makes_no_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let provider = OpenAiProvider::new(&config_for(&server.uri(), "text-embedding-3-small"))
        .expect("should create provider");
    let embeddings = provider.embed_batch(&[]).await.expect("should succeed");
    assert!(embeddings.is_empty());
}

#[tokio::test]
async fn client_errors_are_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let provider = OpenAiProvider::new(&config_for(&server.uri(), "text-embedding-3-small"))
        .expect("should create provider")
        .with_backoff(Duration::from_millis(1));
    let result = provider.embed_text("hello").await;
    assert!(matches!(result, Err(RagError::Embedding(_))));
}

#[tokio::test]
async fn server_errors_are_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"index": 0, "embedding": vector(1536, 0.5)}]
        })))
        .mount(&server)
        .await;

    let provider = OpenAiProvider::new(&config_for(&server.uri(), "text-embedding-3-small"))
        .expect("should create provider")
        .with_backoff(Duration::from_millis(1));
    let embedding = provider.embed_text("hello").await.expect("should embed");
    assert_eq!(embedding.len(), 1536);
}

#[tokio::test]
async fn persistent_server_errors_mean_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .expect(2)
        .mount(&server)
        .await;

    let provider = OpenAiProvider::new(&config_for(&server.uri(), "text-embedding-3-small"))
        .expect("should create provider")
        .with_backoff(Duration::from_millis(1));
    let result = provider.embed_text("hello").await;
    assert!(matches!(result, Err(RagError::ProviderUnavailable(_))));
}

#[tokio::test]
async fn malformed_and_short_responses_are_embedding_errors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"input": ["broken"]})))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"input": ["a", "b"]})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"index": 0, "embedding": vector(1536, 0.1)}]
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"input": ["narrow"]})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"index": 0, "embedding": [0.1, 0.2]}]
        })))
        .mount(&server)
        .await;

    let provider = OpenAiProvider::new(&config_for(&server.uri(), "text-embedding-3-small"))
        .expect("should create provider");

    let broken = provider.embed_text("broken").await;
    assert!(matches!(broken, Err(RagError::Embedding(_))));

    let short = provider
        .embed_batch(&["a".to_string(), "b".to_string()])
        .await;
    assert!(matches!(short, Err(RagError::Embedding(_))));

    let narrow = provider.embed_text("narrow").await;
    assert!(matches!(narrow, Err(RagError::Embedding(_))));
}

#[tokio::test]
async fn unreachable_backend_means_unavailable() {
    // Nothing listens on port 1
    let mut config = config_for("http://127.0.0.1:1", "text-embedding-3-small");
    config.retry_attempts = 1;
    let provider = OpenAiProvider::new(&config).expect("should create provider");

    let result = provider.embed_text("hello").await;
    assert!(matches!(result, Err(RagError::ProviderUnavailable(_))));
}
