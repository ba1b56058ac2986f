//! Single-collection retrieval
//!
//! A [`Retriever`] binds one embedder to one collection and turns a query
//! string into the best-matching stored text.


use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::database::lancedb::{SearchResult, VectorCollection};
use crate::embeddings::{Embedder, EmbeddingVector};
use crate::{RagError, Result};

/// Returned when the collection holds nothing to match against
pub const NO_RESULTS: &str = "No results found";

/// Separator placed between answers when more than one match is returned
pub const ANSWER_SEPARATOR: &str = "\n\n---\n\n";

/// Anything that can answer a text query with text
#[async_trait]
pub trait Searcher: Send + Sync {
    async fn search(&self, query: &str) -> Result<String>;
}

pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    collection: VectorCollection,
    top_k: usize,
}

impl Retriever {
    #[inline]
    pub fn new(embedder: Arc<dyn Embedder>, collection: VectorCollection) -> Self {
        Self {
            embedder,
            collection,
            top_k: 1,
        }
    }

    /// Number of matches joined into one answer
    #[inline]
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k.max(1);
        self
    }

    #[inline]
    pub fn collection_name(&self) -> &str {
        self.collection.name()
    }

    /// Ranked matches for `query`, best first
    #[inline]
    pub async fn retrieve(&self, query: &str) -> Result<Vec<SearchResult>> {
        let vector = self
            .embed_query(query)
            .await
            .map_err(|e| self.retrieval_error(e))?;

        self.collection
            .query(&vector, self.top_k)
            .await
            .map_err(|e| self.retrieval_error(e))
    }

    async fn embed_query(&self, query: &str) -> Result<EmbeddingVector> {
        let embedder = Arc::clone(&self.embedder);
        let query = query.to_string();

        // Backends may block on network I/O
        tokio::task::spawn_blocking(move || embedder.embed_query(&query))
            .await
            .map_err(|e| RagError::Embedding(format!("embedding task failed: {}", e)))?
    }

    fn retrieval_error(&self, cause: RagError) -> RagError {
        RagError::Retrieval {
            collection: self.collection.name().to_string(),
            cause: Box::new(cause),
        }
    }
}

#[async_trait]
impl Searcher for Retriever {
    /// Best-matching stored text, or [`NO_RESULTS`] for an empty collection
    #[inline]
    async fn search(&self, query: &str) -> Result<String> {
        let results = self.retrieve(query).await?;
        debug!(
            "Retriever for '{}' found {} matches",
            self.collection.name(),
            results.len()
        );

        if results.is_empty() {
            return Ok(NO_RESULTS.to_string());
        }

        Ok(results
            .iter()
            .map(|result| result.record.text.as_str())
            .collect::<Vec<_>>()
            .join(ANSWER_SEPARATOR))
    }
}
