use super::*;
use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_client(server_url: &str) -> OpenAiEmbedding {
    let config = Config {
        openai_embedding_dimension: 3,
        ..Config::default()
    };
    OpenAiEmbedding::new(&config, "sk-test".to_string()).with_base_url(server_url)
}

#[test]
fn client_configuration() {
    let config = Config::default();
    let client = OpenAiEmbedding::new(&config, "sk-test".to_string());
    assert_eq!(client.model, "text-embedding-3-small");
    assert_eq!(client.dimension(), 1536);
    assert_eq!(client.name(), "openai (text-embedding-3-small)");
}

#[tokio::test(flavor = "multi_thread")]
async fn sends_bearer_auth_and_parses_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .and(header("Authorization", "Bearer sk-test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [
                { "index": 0, "embedding": [1.0, 0.0, 0.0] },
                { "index": 1, "embedding": [0.0, 1.0, 0.0] }
            ]
        })))
        .mount(&server)
        .await;

    let client = test_client(&server.uri());
    let texts = vec!["alpha".to_string(), "beta".to_string()];
    let vectors = tokio::task::spawn_blocking(move || client.embed_many(&texts))
        .await
        .expect("task should not panic")
        .expect("embed should succeed");

    assert_eq!(vectors[0], vec![1.0, 0.0, 0.0]);
    assert_eq!(vectors[1], vec![0.0, 1.0, 0.0]);
}

#[tokio::test(flavor = "multi_thread")]
async fn reorders_vectors_by_reported_index() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [
                { "index": 1, "embedding": [0.0, 1.0, 0.0] },
                { "index": 0, "embedding": [1.0, 0.0, 0.0] }
            ]
        })))
        .mount(&server)
        .await;

    let client = test_client(&server.uri());
    let texts = vec!["alpha".to_string(), "beta".to_string()];
    let vectors = tokio::task::spawn_blocking(move || client.embed_many(&texts))
        .await
        .expect("task should not panic")
        .expect("embed should succeed");

    assert_eq!(vectors[0], vec![1.0, 0.0, 0.0]);
    assert_eq!(vectors[1], vec![0.0, 1.0, 0.0]);
}

#[tokio::test(flavor = "multi_thread")]
async fn auth_failure_surfaces_as_embedding_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let client = test_client(&server.uri());
    let result = tokio::task::spawn_blocking(move || client.embed_one("query"))
        .await
        .expect("task should not panic");
    assert!(matches!(result, Err(crate::RagError::Embedding(_))));
}

#[test]
fn empty_input_yields_empty_output() {
    let client = test_client("http://localhost:1");
    let vectors = client.embed_many(&[]).expect("empty batch should succeed");
    assert!(vectors.is_empty());
}
