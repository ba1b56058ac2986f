// Embeddings module
// Text-to-vector backends behind a common trait


pub mod hashing;
pub mod ollama;

use std::fmt;
use std::sync::Arc;

use crate::config::{Config, EmbeddingBackend};
use crate::{RagError, Result};

pub use hashing::HashingEmbedder;
pub use ollama::OllamaClient;

/// A fixed-length embedding produced by one model version
pub type EmbeddingVector = Vec<f32>;

/// Turns text into fixed-dimension vectors.
///
/// Implementations are deterministic for a fixed model version and
/// preserve input order. Expensive model state is loaded lazily on the
/// first call and reused afterwards.
pub trait Embedder: Send + Sync + fmt::Debug {
    /// Embed a batch of texts, one vector per input, in input order
    fn embed(&self, texts: &[String]) -> Result<Vec<EmbeddingVector>>;

    /// Embed a single query string
    #[inline]
    fn embed_query(&self, text: &str) -> Result<EmbeddingVector> {
        self.embed(&[text.to_string()])?
            .pop()
            .ok_or_else(|| RagError::Embedding("embedder returned no vector".to_string()))
    }

    /// Length of every vector this embedder produces
    fn dimension(&self) -> usize;

    /// Identifier of the model version behind this embedder
    fn model_name(&self) -> &str;
}

/// Reject input that no backend can encode
#[inline]
pub fn validate_text(text: &str) -> Result<()> {
    if text.trim().is_empty() {
        return Err(RagError::Embedding(
            "cannot embed empty or whitespace-only text".to_string(),
        ));
    }
    Ok(())
}

/// Build the configured embedding backend.
///
/// Call once per process and share the handle; the Ollama backend
/// caches its model check for the lifetime of the returned value.
#[inline]
pub fn build_embedder(config: &Config) -> Result<Arc<dyn Embedder>> {
    let dimension = config.embedding.dimension as usize;
    match config.embedding.backend {
        EmbeddingBackend::Ollama => {
            let client = OllamaClient::new(&config.ollama, dimension)
                .map_err(|e| RagError::Config(format!("{e:#}")))?;
            Ok(Arc::new(client))
        }
        EmbeddingBackend::Hashing => Ok(Arc::new(HashingEmbedder::new(dimension)?)),
    }
}
