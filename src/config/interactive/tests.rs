use super::*;
use tempfile::TempDir;

#[test]
fn load_existing_config_falls_back_to_defaults() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = load_existing_config(temp_dir.path()).expect("config loaded successfully");
    assert!(!config.ollama.host.is_empty());
    assert!(config.ollama.port > 0);
    assert!(!config.ollama.model.is_empty());
    assert!(config.ollama.batch_size > 0);
    assert_eq!(config.get_base_dir(), temp_dir.path());
}

#[test]
fn load_existing_config_reads_saved_file() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let mut config = Config {
        base_dir: temp_dir.path().to_path_buf(),
        ..Config::default()
    };
    config.ollama.host = "embed-box".to_string();
    config.save().expect("should save config");

    let loaded = load_existing_config(temp_dir.path()).expect("config loaded successfully");
    assert_eq!(loaded.ollama.host, "embed-box");
}

#[test]
fn connection_probe_reports_unreachable_server() {
    let ollama = OllamaConfig {
        host: "127.0.0.1".to_string(),
        port: 9,
        ..OllamaConfig::default()
    };
    assert!(!test_ollama_connection(&ollama));
}
