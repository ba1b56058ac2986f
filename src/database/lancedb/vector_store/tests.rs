use super::*;
use crate::database::lancedb::DistanceMetric;
use tempfile::TempDir;

async fn create_test_store() -> (VectorStore, TempDir) {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let store = VectorStore::open(&temp_dir.path().join("vectors"), Duration::from_secs(10))
        .await
        .expect("should open vector store");
    (store, temp_dir)
}

#[tokio::test]
async fn vector_store_initialization() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = Config {
        base_dir: temp_dir.path().to_path_buf(),
        ..Config::default()
    };

    let result = VectorStore::new(&config).await;
    assert!(
        result.is_ok(),
        "Failed to initialize VectorStore: {:?}",
        result.err()
    );
    assert!(config.vector_database_path().exists());

    let store = result.expect("should get result successfully");
    assert_eq!(store.timeout(), config.store.timeout());
}

#[tokio::test]
async fn new_store_has_no_collections() {
    let (store, _temp_dir) = create_test_store().await;
    let names = store
        .collection_names()
        .await
        .expect("should list collections");
    assert!(names.is_empty());
}

#[tokio::test]
async fn collections_are_listed_after_creation() {
    let (store, _temp_dir) = create_test_store().await;

    store
        .collection("ml_faq_collection")
        .create(4, DistanceMetric::Cosine)
        .await
        .expect("should create faq collection");
    store
        .collection("web_search_collection")
        .create(4, DistanceMetric::Cosine)
        .await
        .expect("should create web collection");

    let mut names = store
        .collection_names()
        .await
        .expect("should list collections");
    names.sort();
    assert_eq!(names, ["ml_faq_collection", "web_search_collection"]);
}

#[tokio::test]
async fn collections_persist_across_reopen() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let path = temp_dir.path().join("vectors");

    {
        let store = VectorStore::open(&path, Duration::from_secs(10))
            .await
            .expect("should open store");
        let collection = store.collection("faq");
        collection
            .create(3, DistanceMetric::Cosine)
            .await
            .expect("should create collection");
        collection
            .ingest(
                vec![vec![1.0, 0.0, 0.0]],
                vec!["persisted".to_string()],
                None,
            )
            .await
            .expect("should ingest");
    }

    let reopened = VectorStore::open(&path, Duration::from_secs(10))
        .await
        .expect("should reopen store");
    let count = reopened
        .collection("faq")
        .count()
        .await
        .expect("should count records");
    assert_eq!(count, 1);
}

#[tokio::test]
async fn bounded_reports_timeout() {
    let result: Result<()> = bounded(Duration::from_millis(10), "slow op", async {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(())
    })
    .await;

    match result {
        Err(RagError::Timeout { operation, after }) => {
            assert_eq!(operation, "slow op");
            assert_eq!(after, Duration::from_millis(10));
        }
        other => panic!("expected timeout, got {other:?}"),
    }
}

#[test]
fn corruption_recovery_moves_directory_aside() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let db_path = temp_dir.path().join("vectors");
    std::fs::create_dir_all(&db_path).expect("should create db dir");
    std::fs::write(db_path.join("garbage"), b"not a lance file").expect("should write");

    attempt_corruption_recovery(&db_path).expect("recovery should succeed");

    assert!(db_path.exists());
    assert!(!db_path.join("garbage").exists());
    assert!(temp_dir.path().join("vectors.corrupted_backup").exists());
}

#[test]
fn corruption_recovery_keeps_data_when_backup_fails() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let db_path = temp_dir.path().join("vectors");
    std::fs::create_dir_all(&db_path).expect("should create db dir");
    std::fs::write(db_path.join("data.lance"), b"records").expect("should write");

    // A non-empty directory at the backup path makes the rename fail
    let backup_path = temp_dir.path().join("vectors.corrupted_backup");
    std::fs::create_dir_all(&backup_path).expect("should create backup dir");
    std::fs::write(backup_path.join("older"), b"previous backup").expect("should write");

    let error = attempt_corruption_recovery(&db_path).expect_err("rename should fail");
    assert!(matches!(error, RagError::Database(_)));

    assert_eq!(
        std::fs::read(db_path.join("data.lance")).expect("data should survive"),
        b"records"
    );
    assert!(backup_path.join("older").exists());
}
