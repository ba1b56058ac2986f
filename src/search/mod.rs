//! Multi-source search
//!
//! Fans one query out to several [`Searcher`]s at once and gathers a
//! per-source answer. Each source runs in its own task under its own
//! deadline, so an error, panic or stall in one source only costs that
//! source its slot. The caller sees an error only when every source fails.


use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::database::lancedb::VectorStore;
use crate::embeddings::Embedder;
use crate::retriever::{Retriever, Searcher};
use crate::{RagError, Result};

const DEFAULT_SOURCE_TIMEOUT: Duration = Duration::from_secs(5);

/// A named searcher plus the text shown when it fails
pub struct SearchSource {
    name: String,
    searcher: Arc<dyn Searcher>,
    fallback: String,
    timeout: Duration,
}

impl SearchSource {
    #[inline]
    pub fn new(name: impl Into<String>, searcher: Arc<dyn Searcher>) -> Self {
        let name = name.into();
        Self {
            fallback: format!("No results found in {name}"),
            name,
            searcher,
            timeout: DEFAULT_SOURCE_TIMEOUT,
        }
    }

    #[inline]
    pub fn with_fallback(mut self, fallback: impl Into<String>) -> Self {
        self.fallback = fallback.into();
        self
    }

    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, query: &str) -> SourceOutcome {
        let searcher = Arc::clone(&self.searcher);
        let owned_query = query.to_string();
        let handle = tokio::spawn(async move { searcher.search(&owned_query).await });
        let abort = handle.abort_handle();

        let failure = match tokio::time::timeout(self.timeout, handle).await {
            Ok(Ok(Ok(text))) => return SourceOutcome::Found { text },
            Ok(Ok(Err(e))) => e.to_string(),
            Ok(Err(join_error)) => format!("search task failed: {}", join_error),
            Err(_) => {
                abort.abort();
                format!("timed out after {:?}", self.timeout)
            }
        };

        warn!("Search source '{}' failed: {}", self.name, failure);
        SourceOutcome::Failed {
            fallback: self.fallback.clone(),
            reason: failure,
        }
    }
}

/// What one source produced for a query
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SourceOutcome {
    Found { text: String },
    Failed { fallback: String, reason: String },
}

impl SourceOutcome {
    /// The answer text, or the fallback for a failed source
    #[inline]
    pub fn text(&self) -> &str {
        match self {
            Self::Found { text } => text,
            Self::Failed { fallback, .. } => fallback,
        }
    }

    #[inline]
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceAnswer {
    pub source: String,
    pub outcome: SourceOutcome,
}

/// One entry per configured source, in configuration order
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CombinedAnswer {
    answers: Vec<SourceAnswer>,
}

impl CombinedAnswer {
    #[inline]
    pub fn answers(&self) -> &[SourceAnswer] {
        &self.answers
    }

    #[inline]
    pub fn outcome(&self, source: &str) -> Option<&SourceOutcome> {
        self.answers
            .iter()
            .find(|answer| answer.source == source)
            .map(|answer| &answer.outcome)
    }

    /// Answer text for `source`, the fallback text if it failed
    #[inline]
    pub fn get(&self, source: &str) -> Option<&str> {
        self.outcome(source).map(SourceOutcome::text)
    }

    /// Whether at least one source fell back
    #[inline]
    pub fn is_degraded(&self) -> bool {
        self.answers.iter().any(|answer| answer.outcome.is_failed())
    }

    /// Human-readable failure lines, one per failed source
    #[inline]
    pub fn errors(&self) -> Vec<String> {
        self.answers
            .iter()
            .filter_map(|answer| match &answer.outcome {
                SourceOutcome::Failed { reason, .. } => {
                    Some(format!("{} search failed: {}", answer.source, reason))
                }
                SourceOutcome::Found { .. } => None,
            })
            .collect()
    }

    /// Flatten into `{source -> text}`
    #[inline]
    pub fn to_map(&self) -> BTreeMap<String, String> {
        self.answers
            .iter()
            .map(|answer| (answer.source.clone(), answer.outcome.text().to_string()))
            .collect()
    }

    /// `{source: text, ..., "errors": [..] | null}`
    #[inline]
    pub fn to_json(&self) -> serde_json::Value {
        let mut object = serde_json::Map::new();
        for answer in &self.answers {
            object.insert(
                answer.source.clone(),
                serde_json::Value::String(answer.outcome.text().to_string()),
            );
        }

        let errors = self.errors();
        object.insert(
            "errors".to_string(),
            if errors.is_empty() {
                serde_json::Value::Null
            } else {
                serde_json::Value::from(errors)
            },
        );
        serde_json::Value::Object(object)
    }
}

pub struct CombinedSearcher {
    sources: Vec<SearchSource>,
}

impl CombinedSearcher {
    /// Source names must be unique and at least one source is required
    #[inline]
    pub fn new(sources: Vec<SearchSource>) -> Result<Self> {
        if sources.is_empty() {
            return Err(RagError::Config(
                "combined search needs at least one source".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for source in &sources {
            if !seen.insert(source.name.as_str()) {
                return Err(RagError::Config(format!(
                    "duplicate search source name: {}",
                    source.name
                )));
            }
        }

        Ok(Self { sources })
    }

    /// One [`Retriever`] per configured source, sharing a single embedder
    #[inline]
    pub fn from_config(
        config: &Config,
        store: &VectorStore,
        embedder: &Arc<dyn Embedder>,
    ) -> Result<Self> {
        let sources = config
            .search
            .sources
            .iter()
            .map(|source| {
                let retriever = Retriever::new(
                    Arc::clone(embedder),
                    store.collection(&source.collection),
                )
                .with_top_k(source.top_k);

                SearchSource::new(source.name.clone(), Arc::new(retriever))
                    .with_fallback(source.fallback_text())
                    .with_timeout(source.timeout())
            })
            .collect();

        Self::new(sources)
    }

    #[inline]
    pub fn source_names(&self) -> Vec<&str> {
        self.sources.iter().map(SearchSource::name).collect()
    }

    /// Query every source concurrently.
    ///
    /// Always yields exactly one entry per source. Fails with
    /// `AllSourcesFailed` only when no source produced an answer.
    #[inline]
    pub async fn search(&self, query: &str) -> Result<CombinedAnswer> {
        debug!(
            "Combined search across {} sources: {:?}",
            self.sources.len(),
            query
        );

        let outcomes = join_all(self.sources.iter().map(|source| source.run(query))).await;

        let answers: Vec<SourceAnswer> = self
            .sources
            .iter()
            .zip(outcomes)
            .map(|(source, outcome)| SourceAnswer {
                source: source.name.clone(),
                outcome,
            })
            .collect();

        if answers.iter().all(|answer| answer.outcome.is_failed()) {
            let failures = answers
                .into_iter()
                .filter_map(|answer| match answer.outcome {
                    SourceOutcome::Failed { reason, .. } => Some((answer.source, reason)),
                    SourceOutcome::Found { .. } => None,
                })
                .collect();
            return Err(RagError::AllSourcesFailed { failures });
        }

        let answer = CombinedAnswer { answers };
        if answer.is_degraded() {
            info!("Combined search degraded: {:?}", answer.errors());
        }
        Ok(answer)
    }
}
