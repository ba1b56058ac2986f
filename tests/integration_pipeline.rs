#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

// End-to-end pipeline tests using the offline hashing embedder

use std::path::PathBuf;
use std::sync::Arc;

use faq_web_rag::RagError;
use faq_web_rag::commands::{ingest_faq, ingest_web, run_search};
use faq_web_rag::config::{Config, EmbeddingBackend};
use faq_web_rag::database::lancedb::{DistanceMetric, VectorStore};
use faq_web_rag::embeddings::{Embedder, build_embedder};
use faq_web_rag::retriever::Retriever;
use faq_web_rag::search::SourceOutcome;
use tempfile::TempDir;

const FAQ: &str = r#"["What is overfitting?", "What is a neural network?", "What is gradient descent?"]"#;

const WEB_RESPONSE: &str = r#"{
    "organic": [
        {
            "title": "Machine learning best practices",
            "url": "https://ml.example/best-practices",
            "snippet": "Hold out a validation set and watch for overfitting."
        },
        {
            "title": "Gradient descent tuning",
            "url": "https://ml.example/gradient-descent",
            "snippet": "Pick a learning rate schedule for gradient descent."
        }
    ]
}"#;

fn create_test_config() -> (Config, TempDir) {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let mut config = Config {
        base_dir: temp_dir.path().to_path_buf(),
        ..Config::default()
    };
    config.embedding.backend = EmbeddingBackend::Hashing;
    config.embedding.dimension = 256;
    (config, temp_dir)
}

fn write_file(dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, content).expect("should write file");
    path
}

#[tokio::test]
async fn faq_query_returns_matching_record() {
    let (config, temp_dir) = create_test_config();
    let dataset = write_file(&temp_dir, "faq.json", FAQ);

    let summary = ingest_faq(&config, &dataset, None)
        .await
        .expect("should ingest FAQ");
    assert_eq!(summary.collection, "ml_faq_collection");
    assert_eq!(summary.ingested, 3);

    let answer = run_search(&config, "overfitting", Some("faq"))
        .await
        .expect("should search");
    assert_eq!(answer.answers().len(), 1);
    assert_eq!(answer.get("faq"), Some("What is overfitting?"));
}

#[tokio::test]
async fn combined_search_degrades_without_web_collection() {
    let (config, temp_dir) = create_test_config();
    let dataset = write_file(&temp_dir, "faq.json", FAQ);
    ingest_faq(&config, &dataset, None)
        .await
        .expect("should ingest FAQ");

    let answer = run_search(&config, "overfitting", None)
        .await
        .expect("FAQ alone should answer");

    assert_eq!(answer.get("faq"), Some("What is overfitting?"));
    assert_eq!(answer.get("web"), Some("No results found in web search"));
    assert!(answer.is_degraded());

    let json = answer.to_json();
    assert_eq!(json["faq"], "What is overfitting?");
    assert!(
        json["errors"][0]
            .as_str()
            .is_some_and(|error| error.starts_with("web search failed:"))
    );
}

#[tokio::test]
async fn combined_search_uses_both_sources() {
    let (config, temp_dir) = create_test_config();
    ingest_faq(&config, &write_file(&temp_dir, "faq.json", FAQ), None)
        .await
        .expect("should ingest FAQ");
    let response = write_file(&temp_dir, "response.json", WEB_RESPONSE);
    let summary = ingest_web(
        &config,
        &response.to_string_lossy(),
        "machine learning best practices",
        None,
    )
    .await
    .expect("should ingest web results");
    assert_eq!(summary.collection, "web_search_collection");
    assert_eq!(summary.ingested, 2);

    let answer = run_search(&config, "How does gradient descent work?", None)
        .await
        .expect("should search");

    assert!(!answer.is_degraded());
    assert_eq!(answer.get("faq"), Some("What is gradient descent?"));
    let web = answer.get("web").expect("web entry should exist");
    assert!(web.contains("Title: Gradient descent tuning"));
    assert!(web.contains("\n\n---\n\n"));
}

#[tokio::test]
async fn empty_store_fails_every_source() {
    let (config, _temp_dir) = create_test_config();

    let error = run_search(&config, "overfitting", None)
        .await
        .expect_err("no collections exist");

    match error.downcast_ref::<RagError>() {
        Some(RagError::AllSourcesFailed { failures }) => assert_eq!(failures.len(), 2),
        other => panic!("expected aggregate failure, got {other:?}"),
    }
}

#[tokio::test]
async fn unknown_source_is_rejected() {
    let (config, _temp_dir) = create_test_config();

    let error = run_search(&config, "overfitting", Some("news"))
        .await
        .expect_err("source is not configured");
    assert!(error.to_string().contains("news"));
}

#[tokio::test]
async fn collections_survive_reload() {
    let (config, temp_dir) = create_test_config();
    config.save().expect("should save config");
    let dataset = write_file(&temp_dir, "faq.txt", "What is overfitting?\nWhat is dropout?\n");
    ingest_faq(&config, &dataset, None)
        .await
        .expect("should ingest FAQ");

    let reloaded = Config::load(temp_dir.path()).expect("should reload config");
    assert_eq!(reloaded.embedding.backend, EmbeddingBackend::Hashing);

    let answer = run_search(&reloaded, "dropout", Some("faq"))
        .await
        .expect("should search");
    assert_eq!(answer.get("faq"), Some("What is dropout?"));
    assert!(matches!(
        answer.outcome("faq"),
        Some(SourceOutcome::Found { .. })
    ));
}

#[tokio::test]
async fn stored_text_is_its_own_best_match() {
    let (config, _temp_dir) = create_test_config();
    let embedder: Arc<dyn Embedder> = build_embedder(&config).expect("should build embedder");
    let store = VectorStore::new(&config).await.expect("should open store");
    let collection = store.collection("round_trip");
    collection
        .create(embedder.dimension(), DistanceMetric::Cosine)
        .await
        .expect("should create collection");

    let texts: Vec<String> = [
        "Early stopping halts training when validation loss stops improving.",
        "A confusion matrix tabulates predicted against actual classes.",
        "Cross validation rotates which fold is held out.",
    ]
    .iter()
    .map(|s| (*s).to_string())
    .collect();
    let vectors = embedder.embed(&texts).expect("should embed");
    collection
        .ingest(vectors, texts.clone(), None)
        .await
        .expect("should ingest");

    let retriever = Retriever::new(Arc::clone(&embedder), collection);
    for text in &texts {
        let results = retriever.retrieve(text).await.expect("should retrieve");
        assert_eq!(&results[0].record.text, text);
        assert!(results[0].similarity_score > 0.999);
    }
}
