use super::*;
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(server: &MockServer, dimension: usize) -> OllamaClient {
    let address = server.address();
    let config = OllamaConfig {
        host: address.ip().to_string(),
        port: address.port(),
        model: "test-model".to_string(),
        batch_size: 2,
        ..OllamaConfig::default()
    };
    OllamaClient::new(&config, dimension)
        .expect("Failed to create client")
        .with_retry_attempts(1)
}

async fn mount_tags(server: &MockServer, expected_calls: u64) {
    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "models": [
                { "name": "test-model:latest", "size": 274302450, "digest": "abc123" },
                { "name": "other-model:latest" }
            ]
        })))
        .expect(expected_calls)
        .mount(server)
        .await;
}

#[test]
fn client_configuration() {
    let config = OllamaConfig {
        protocol: "http".to_string(),
        host: "test-host".to_string(),
        port: 1234,
        model: "test-model".to_string(),
        batch_size: 128,
        timeout_secs: 30,
    };
    let client = OllamaClient::new(&config, 768).expect("Failed to create client");

    assert_eq!(client.model, "test-model");
    assert_eq!(client.batch_size, 128);
    assert_eq!(client.dimension, 768);
    assert_eq!(client.base_url.host_str(), Some("test-host"));
    assert_eq!(client.base_url.port(), Some(1234));
    assert_eq!(client.retry_attempts, DEFAULT_RETRY_ATTEMPTS);
    assert!(!client.model_ready.load(Ordering::Acquire));
}

#[test]
fn client_builder_methods() {
    let client = OllamaClient::new(&OllamaConfig::default(), 768)
        .expect("Failed to create client")
        .with_timeout(Duration::from_secs(60))
        .with_retry_attempts(5);

    assert_eq!(client.retry_attempts, 5);
}

#[test]
fn model_name_matching_handles_latest_tag() {
    let client = OllamaClient::new(&OllamaConfig::default(), 768).expect("client");
    assert!(client.matches_model("nomic-embed-text:latest"));

    let config = OllamaConfig {
        model: "nomic-embed-text".to_string(),
        ..OllamaConfig::default()
    };
    let client = OllamaClient::new(&config, 768).expect("client");
    assert!(client.matches_model("nomic-embed-text:latest"));
    assert!(!client.matches_model("mxbai-embed-large:latest"));
}

#[test]
fn empty_text_is_rejected_before_any_request() {
    let config = OllamaConfig {
        host: "127.0.0.1".to_string(),
        port: 9,
        ..OllamaConfig::default()
    };
    let client = OllamaClient::new(&config, 768).expect("client");

    let result = client.embed(&["ok".to_string(), "   ".to_string()]);
    assert!(matches!(result, Err(RagError::Embedding(_))));
}

#[tokio::test]
async fn embeds_in_order_and_checks_model_once() {
    let server = MockServer::start().await;
    mount_tags(&server, 1).await;

    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .and(body_partial_json(json!({ "input": ["first", "second"] })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "embeddings": [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0]]
        })))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .and(body_partial_json(json!({ "input": ["third"] })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "embeddings": [[0.0, 0.0, 1.0]]
        })))
        .mount(&server)
        .await;

    let client = client_for(&server, 3);
    let vectors = tokio::task::spawn_blocking(move || {
        let texts = vec![
            "first".to_string(),
            "second".to_string(),
            "third".to_string(),
        ];
        let vectors = client.embed(&texts)?;
        client.embed_query("third")?;
        Ok::<_, RagError>(vectors)
    })
    .await
    .expect("blocking task should not panic")
    .expect("embedding should succeed");

    assert_eq!(
        vectors,
        vec![
            vec![1.0, 0.0, 0.0],
            vec![0.0, 1.0, 0.0],
            vec![0.0, 0.0, 1.0]
        ]
    );
}

#[tokio::test]
async fn missing_model_is_model_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "models": [{ "name": "other-model:latest" }]
        })))
        .mount(&server)
        .await;

    let client = client_for(&server, 3);
    let result = tokio::task::spawn_blocking(move || client.embed_query("hello"))
        .await
        .expect("blocking task should not panic");

    assert!(matches!(result, Err(RagError::ModelUnavailable(_))));
}

#[tokio::test]
async fn unexpected_dimension_is_model_unavailable() {
    let server = MockServer::start().await;
    mount_tags(&server, 1).await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "embeddings": [[0.5, 0.5]]
        })))
        .mount(&server)
        .await;

    let client = client_for(&server, 3);
    let result = tokio::task::spawn_blocking(move || client.embed_query("hello"))
        .await
        .expect("blocking task should not panic");

    match result {
        Err(RagError::ModelUnavailable(message)) => {
            assert!(message.contains("returned 2 dimensions"), "{message}");
        }
        other => panic!("expected model unavailable, got {other:?}"),
    }
}

#[tokio::test]
async fn client_error_is_not_retried() {
    let server = MockServer::start().await;
    mount_tags(&server, 1).await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "input length exceeds context length"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, 3).with_retry_attempts(3);
    let result = tokio::task::spawn_blocking(move || client.embed_query("hello"))
        .await
        .expect("blocking task should not panic");

    assert!(matches!(result, Err(RagError::Embedding(_))));
}

#[tokio::test]
async fn server_error_is_model_unavailable() {
    let server = MockServer::start().await;
    mount_tags(&server, 1).await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, 3);
    let result = tokio::task::spawn_blocking(move || client.embed_query("hello"))
        .await
        .expect("blocking task should not panic");

    match result {
        Err(error @ RagError::ModelUnavailable(_)) => assert!(error.is_fatal()),
        other => panic!("expected model unavailable, got {other:?}"),
    }
}

#[tokio::test]
async fn short_response_is_model_unavailable() {
    let server = MockServer::start().await;
    mount_tags(&server, 1).await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "embeddings": [[1.0, 0.0, 0.0]]
        })))
        .mount(&server)
        .await;

    let client = client_for(&server, 3);
    let result = tokio::task::spawn_blocking(move || {
        client.embed(&["first".to_string(), "second".to_string()])
    })
    .await
    .expect("blocking task should not panic");

    assert!(matches!(result, Err(RagError::ModelUnavailable(_))));
}
