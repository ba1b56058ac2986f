// Configuration management module
// TOML settings plus the interactive setup wizard

pub mod interactive;
pub mod settings;

pub use interactive::{run_interactive_config, show_config};
pub use settings::{
    Config, ConfigError, EmbeddingBackend, EmbeddingConfig, OllamaConfig, SearchConfig,
    SourceConfig, StoreConfig,
};

use std::path::{Path, PathBuf};

/// Resolve the configuration directory, preferring an explicit override
#[inline]
pub fn resolve_config_dir(override_dir: Option<&Path>) -> Result<PathBuf, ConfigError> {
    override_dir.map_or_else(Config::default_dir, |dir| Ok(dir.to_path_buf()))
}
