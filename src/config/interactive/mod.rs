#[cfg(test)]
mod tests;

use std::path::Path;

use anyhow::{Context, Result};
use console::style;
use dialoguer::{Confirm, Input, Select};

use super::{Config, ConfigError, EmbeddingBackend, OllamaConfig};

#[inline]
pub fn run_interactive_config(config_dir: &Path) -> Result<()> {
    eprintln!("{}", style("🔧 FAQ + Web RAG Configuration Setup").bold().cyan());
    eprintln!();

    let mut config = load_existing_config(config_dir)?;

    eprintln!("{}", style("Embedding Backend").bold().yellow());
    configure_backend(&mut config)?;

    if config.embedding.backend == EmbeddingBackend::Ollama {
        eprintln!();
        eprintln!("{}", style("Ollama Configuration").bold().yellow());
        eprintln!("Configure your local Ollama instance for embedding generation.");
        eprintln!();

        configure_ollama(&mut config.ollama)?;

        eprintln!();
        eprintln!("{}", style("Testing configuration...").yellow());

        if test_ollama_connection(&config.ollama) {
            eprintln!("{}", style("✓ Ollama connection successful!").green());
        } else {
            eprintln!(
                "{}",
                style("⚠ Warning: Could not connect to Ollama").yellow()
            );
            eprintln!("You can continue, but make sure Ollama is running before ingesting.");
        }
    }

    eprintln!();
    if Confirm::new()
        .with_prompt("Save configuration?")
        .default(true)
        .interact()?
    {
        config.save().context("Failed to save configuration")?;
        eprintln!("{}", style("✓ Configuration saved successfully!").green());
        eprintln!(
            "Configuration saved to: {}",
            style(config.config_file_path().display()).cyan()
        );
    } else {
        eprintln!("Configuration not saved.");
    }

    Ok(())
}

#[inline]
pub fn show_config(config: &Config) {
    eprintln!("{}", style("📋 Current Configuration").bold().cyan());
    eprintln!();

    eprintln!("{}", style("Embedding:").bold().yellow());
    eprintln!(
        "  Backend: {}",
        style(format!("{:?}", config.embedding.backend)).cyan()
    );
    eprintln!("  Dimension: {}", style(config.embedding.dimension).cyan());

    if config.embedding.backend == EmbeddingBackend::Ollama {
        eprintln!();
        eprintln!("{}", style("Ollama Settings:").bold().yellow());
        eprintln!("  Host: {}", style(&config.ollama.host).cyan());
        eprintln!("  Port: {}", style(config.ollama.port).cyan());
        eprintln!("  Model: {}", style(&config.ollama.model).cyan());
        eprintln!("  Batch Size: {}", style(config.ollama.batch_size).cyan());
        match config.ollama.ollama_url() {
            Ok(url) => eprintln!("  Ollama URL: {}", style(url).cyan()),
            Err(e) => eprintln!("  Ollama URL: {} ({})", style("Invalid").red(), e),
        }
    }

    eprintln!();
    eprintln!("{}", style("Vector Store:").bold().yellow());
    eprintln!(
        "  Path: {}",
        style(config.vector_database_path().display()).cyan()
    );
    eprintln!(
        "  Distance Metric: {}",
        style(config.store.distance_metric).cyan()
    );
    eprintln!("  Timeout: {}s", style(config.store.timeout_secs).cyan());

    eprintln!();
    eprintln!("{}", style("Search Sources:").bold().yellow());
    for source in &config.search.sources {
        eprintln!(
            "  {} -> {} (top_k {}, timeout {}ms)",
            style(&source.name).cyan(),
            source.collection,
            source.top_k,
            source.timeout_ms
        );
    }

    eprintln!();
    eprintln!(
        "Config file: {}",
        style(config.config_file_path().display()).dim()
    );
}

fn load_existing_config(config_dir: &Path) -> Result<Config> {
    Config::load(config_dir).map_or_else(
        |_| {
            eprintln!(
                "{}",
                style("No valid configuration found. Using defaults.").yellow()
            );
            Ok(Config {
                base_dir: config_dir.to_path_buf(),
                ..Config::default()
            })
        },
        |config| {
            eprintln!("{}", style("Found existing configuration.").green());
            Ok(config)
        },
    )
}

fn configure_backend(config: &mut Config) -> Result<()> {
    let backends = &["ollama", "hashing"];
    let default_index = usize::from(config.embedding.backend == EmbeddingBackend::Hashing);

    let backend_index = Select::new()
        .with_prompt("Embedding backend")
        .default(default_index)
        .items(backends)
        .interact()?;

    config.embedding.backend = if backend_index == 0 {
        EmbeddingBackend::Ollama
    } else {
        EmbeddingBackend::Hashing
    };

    let dimension: u32 = Input::new()
        .with_prompt("Embedding dimension")
        .default(config.embedding.dimension)
        .validate_with(|input: &u32| -> Result<(), &str> {
            if (16..=4096).contains(input) {
                Ok(())
            } else {
                Err("Dimension must be between 16 and 4096")
            }
        })
        .interact_text()?;

    config.embedding.set_dimension(dimension)?;
    Ok(())
}

fn configure_ollama(ollama: &mut OllamaConfig) -> Result<()> {
    let protocols = &["http", "https"];
    let default_index = protocols
        .iter()
        .position(|&p| p == ollama.protocol)
        .unwrap_or(0);

    let protocol_index = Select::new()
        .with_prompt("Ollama protocol")
        .default(default_index)
        .items(protocols)
        .interact()?;

    let protocol = protocols[protocol_index].to_string();

    let host: String = Input::new()
        .with_prompt("Ollama host")
        .default(ollama.host.clone())
        .validate_with(|input: &String| -> Result<(), ConfigError> {
            let temp_config = OllamaConfig {
                protocol: protocol.clone(),
                host: input.clone(),
                ..OllamaConfig::default()
            };
            temp_config.validate()
        })
        .interact_text()?;

    let port: u16 = Input::new()
        .with_prompt("Ollama port")
        .default(ollama.port)
        .validate_with(|input: &u16| -> Result<(), &str> {
            if *input == 0 {
                Err("Port must be greater than 0")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    let model: String = Input::new()
        .with_prompt("Embedding model")
        .default(ollama.model.clone())
        .validate_with(|input: &String| -> Result<(), &str> {
            if input.trim().is_empty() {
                Err("Model name cannot be empty")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    let batch_size: u32 = Input::new()
        .with_prompt("Batch size for embedding generation")
        .default(ollama.batch_size)
        .validate_with(|input: &u32| -> Result<(), &str> {
            if *input == 0 {
                Err("Batch size must be greater than 0")
            } else if *input > 1000 {
                Err("Batch size must be 1000 or less")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    ollama.set_protocol(protocol)?;
    ollama.set_host(host)?;
    ollama.set_port(port)?;
    ollama.set_model(model)?;
    ollama.set_batch_size(batch_size)?;

    Ok(())
}

fn test_ollama_connection(ollama: &OllamaConfig) -> bool {
    let url = format!(
        "{}://{}:{}/api/version",
        ollama.protocol, ollama.host, ollama.port
    );

    let agent: ureq::Agent = ureq::Agent::config_builder()
        .timeout_global(Some(std::time::Duration::from_secs(5)))
        .build()
        .into();

    match agent.get(&url).call() {
        Ok(_) => true,
        Err(ureq::Error::StatusCode(code)) if (400..500).contains(&code) => true,
        Err(_) => false,
    }
}
