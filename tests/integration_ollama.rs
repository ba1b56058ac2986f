#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

// Integration tests that require a local Ollama instance
// Run with: cargo test --test integration_ollama -- --ignored

use std::env;
use std::sync::Arc;
use std::time::Duration;

use faq_web_rag::config::OllamaConfig;
use faq_web_rag::database::lancedb::{DistanceMetric, VectorStore};
use faq_web_rag::embeddings::Embedder;
use faq_web_rag::embeddings::ollama::OllamaClient;
use faq_web_rag::retriever::{Retriever, Searcher};
use tempfile::TempDir;
use tracing::{debug, info};

const TEST_MODEL: &str = "nomic-embed-text:latest";
const TEST_DIMENSION: usize = 768;
const DEFAULT_OLLAMA_HOST: &str = "localhost";
const DEFAULT_OLLAMA_PORT: u16 = 11434;

fn create_integration_test_client() -> OllamaClient {
    let host = env::var("OLLAMA_HOST").unwrap_or_else(|_| DEFAULT_OLLAMA_HOST.to_string());
    let port = env::var("OLLAMA_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(DEFAULT_OLLAMA_PORT);
    let model = env::var("OLLAMA_MODEL").unwrap_or_else(|_| TEST_MODEL.to_string());

    let config = OllamaConfig {
        host,
        port,
        model,
        batch_size: 5, // Smaller batch size for testing
        ..OllamaConfig::default()
    };

    OllamaClient::new(&config, TEST_DIMENSION)
        .expect("Failed to create Ollama client")
        .with_timeout(Duration::from_secs(60)) // Longer timeout for embedding generation
        .with_retry_attempts(3)
}

fn init_test_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter("debug")
        .with_test_writer()
        .try_init()
        .ok(); // Ignore error if already initialized
}

#[test]
#[ignore = "requires a local Ollama instance"]
fn real_ollama_health_check() {
    init_test_tracing();

    let client = create_integration_test_client();
    let result = client.health_check();

    assert!(
        result.is_ok(),
        "Health check should succeed with local Ollama: {:?}",
        result
    );
}

#[test]
#[ignore = "requires a local Ollama instance"]
fn real_ollama_list_models() {
    init_test_tracing();

    let client = create_integration_test_client();
    let models = client.list_models().expect("Model listing should succeed");

    assert!(
        !models.is_empty(),
        "Should have at least one model available"
    );
    for model in &models {
        debug!("Available model: {} (size: {:?})", model.name, model.size);
    }
}

#[test]
#[ignore = "requires a local Ollama instance"]
fn real_ollama_batch_embeddings() {
    init_test_tracing();

    let client = create_integration_test_client();
    let texts: Vec<String> = (0..12)
        .map(|i| format!("Test document number {} about machine learning.", i))
        .collect();

    let embeddings = client.embed(&texts).expect("Batch embedding should succeed");

    assert_eq!(embeddings.len(), texts.len());
    assert!(embeddings.iter().all(|e| e.len() == TEST_DIMENSION));
    info!(
        "Generated {} embeddings across several batches",
        embeddings.len()
    );
}

#[test]
#[ignore = "requires a local Ollama instance"]
fn real_ollama_embeddings_are_deterministic() {
    init_test_tracing();

    let client = create_integration_test_client();
    let text = "What is overfitting?".to_string();

    let first = client.embed_query(&text).expect("should embed");
    let second = client.embed_query(&text).expect("should embed");

    let max_delta = first
        .iter()
        .zip(&second)
        .map(|(a, b)| (a - b).abs())
        .fold(0.0_f32, f32::max);
    assert!(max_delta < 1e-4, "embeddings drifted by {}", max_delta);
}

#[tokio::test]
#[ignore = "requires a local Ollama instance"]
async fn real_ollama_faq_retrieval() {
    init_test_tracing();

    let temp_dir = TempDir::new().expect("should create temp dir");
    let store = VectorStore::open(&temp_dir.path().join("vectors"), Duration::from_secs(30))
        .await
        .expect("should open store");
    let embedder: Arc<dyn Embedder> = Arc::new(create_integration_test_client());

    let texts: Vec<String> = [
        "What is overfitting?",
        "What is a neural network?",
        "What is gradient descent?",
    ]
    .iter()
    .map(|s| (*s).to_string())
    .collect();

    let vectors = {
        let embedder = Arc::clone(&embedder);
        let texts = texts.clone();
        tokio::task::spawn_blocking(move || embedder.embed(&texts))
            .await
            .expect("embedding task should complete")
            .expect("should embed")
    };

    let collection = store.collection("ml_faq_collection");
    collection
        .create(TEST_DIMENSION, DistanceMetric::Cosine)
        .await
        .expect("should create collection");
    collection
        .ingest(vectors, texts, None)
        .await
        .expect("should ingest");

    let retriever = Retriever::new(embedder, collection);
    let answer = retriever
        .search("Why does my model memorize the training data?")
        .await
        .expect("should search");
    info!("Top answer: {}", answer);
    assert_eq!(answer, "What is overfitting?");
}
