// Indexer module
// Batch pipelines that embed raw text and load it into a collection


pub mod faq;
pub mod web;

use std::sync::Arc;

use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::database::lancedb::{DistanceMetric, VectorCollection};
use crate::embeddings::{Embedder, EmbeddingVector};
use crate::{RagError, Result};

pub use faq::{FaqIngestor, load_dataset};
pub use web::{WebSearchIngestor, WebSearchResult, parse_search_response};

const DEFAULT_BATCH_SIZE: usize = 16;

/// Outcome of one ingest run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestSummary {
    pub collection: String,
    pub ingested: usize,
    /// Input index and reason for every text that could not be embedded
    pub skipped: Vec<(usize, String)>,
    pub first_seq: u64,
}

/// Embeds texts in chunks and commits them to one collection.
///
/// Texts the embedder rejects are skipped and reported; any other failure
/// aborts the run before anything is written.
#[derive(Clone)]
pub struct IngestPipeline {
    embedder: Arc<dyn Embedder>,
    collection: VectorCollection,
    metric: DistanceMetric,
    batch_size: usize,
    show_progress: bool,
}

impl IngestPipeline {
    #[inline]
    pub fn new(embedder: Arc<dyn Embedder>, collection: VectorCollection) -> Self {
        Self {
            embedder,
            collection,
            metric: DistanceMetric::Cosine,
            batch_size: DEFAULT_BATCH_SIZE,
            show_progress: false,
        }
    }

    /// Metric and batch size taken from the loaded configuration
    #[inline]
    pub fn from_config(
        config: &Config,
        embedder: Arc<dyn Embedder>,
        collection: VectorCollection,
    ) -> Self {
        Self::new(embedder, collection)
            .with_metric(config.store.distance_metric)
            .with_batch_size(config.ollama.batch_size as usize)
    }

    #[inline]
    pub fn with_metric(mut self, metric: DistanceMetric) -> Self {
        self.metric = metric;
        self
    }

    #[inline]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Draw a progress bar on an attended terminal
    #[inline]
    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    #[inline]
    pub fn collection_name(&self) -> &str {
        self.collection.name()
    }

    /// Embed `texts` and store them with their optional metadata
    #[inline]
    pub async fn run(
        &self,
        texts: Vec<String>,
        metadata: Option<Vec<serde_json::Value>>,
    ) -> Result<IngestSummary> {
        if let Some(metadata) = &metadata {
            if metadata.len() != texts.len() {
                return Err(RagError::Ingest {
                    collection: self.collection.name().to_string(),
                    failed: Vec::new(),
                    reason: format!(
                        "{} metadata entries for {} texts",
                        metadata.len(),
                        texts.len()
                    ),
                });
            }
        }

        self.collection
            .create(self.embedder.dimension(), self.metric)
            .await?;

        let bar = self.progress_bar(texts.len() as u64);
        let mut kept = Vec::with_capacity(texts.len());
        let mut vectors = Vec::with_capacity(texts.len());
        let mut skipped = Vec::new();

        for (chunk_index, chunk) in texts.chunks(self.batch_size).enumerate() {
            let offset = chunk_index * self.batch_size;
            bar.set_message(format!("batch {}", chunk_index + 1));

            match self.embed(chunk.to_vec()).await {
                Ok(embedded) => {
                    kept.extend(offset..offset + chunk.len());
                    vectors.extend(embedded);
                }
                Err(RagError::Embedding(reason)) => {
                    debug!(
                        "Batch {} rejected ({}), embedding items individually",
                        chunk_index + 1,
                        reason
                    );
                    for (position, text) in chunk.iter().enumerate() {
                        match self.embed(vec![text.clone()]).await {
                            Ok(mut embedded) => {
                                if let Some(vector) = embedded.pop() {
                                    kept.push(offset + position);
                                    vectors.push(vector);
                                }
                            }
                            Err(RagError::Embedding(reason)) => {
                                warn!("Skipping record {}: {}", offset + position, reason);
                                skipped.push((offset + position, reason));
                            }
                            Err(e) => {
                                bar.abandon();
                                return Err(e);
                            }
                        }
                    }
                }
                Err(e) => {
                    bar.abandon();
                    return Err(e);
                }
            }

            bar.inc(chunk.len() as u64);
        }

        if kept.is_empty() {
            bar.abandon();
            return Err(RagError::Ingest {
                collection: self.collection.name().to_string(),
                failed: skipped.iter().map(|(index, _)| *index).collect(),
                reason: "no valid texts to ingest".to_string(),
            });
        }

        let kept_metadata = metadata.map(|mut metadata| {
            kept.iter()
                .map(|&index| std::mem::take(&mut metadata[index]))
                .collect::<Vec<_>>()
        });
        let mut texts = texts;
        let kept_texts: Vec<String> = kept
            .iter()
            .map(|&index| std::mem::take(&mut texts[index]))
            .collect();

        bar.set_message("storing");
        let report = self
            .collection
            .ingest(vectors, kept_texts, kept_metadata)
            .await?;
        bar.finish_and_clear();

        info!(
            "Ingested {} records into '{}' ({} skipped)",
            report.inserted(),
            report.collection,
            skipped.len()
        );

        Ok(IngestSummary {
            collection: report.collection.clone(),
            ingested: report.inserted(),
            skipped,
            first_seq: report.first_seq,
        })
    }

    async fn embed(&self, texts: Vec<String>) -> Result<Vec<EmbeddingVector>> {
        let embedder = Arc::clone(&self.embedder);
        tokio::task::spawn_blocking(move || embedder.embed(&texts))
            .await
            .map_err(|e| RagError::Other(anyhow::anyhow!("embedding task failed: {}", e)))?
    }

    fn progress_bar(&self, len: u64) -> ProgressBar {
        if !self.show_progress || !console::user_attended_stderr() {
            return ProgressBar::hidden();
        }

        match ProgressStyle::with_template("{spinner} [{pos}/{len}] Embedding {msg}") {
            Ok(style) => ProgressBar::new(len).with_style(style),
            Err(_) => ProgressBar::new(len),
        }
    }
}
