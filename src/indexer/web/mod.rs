//! Web search result ingestion
//!
//! Stores organic search results as a query cache. Each result is
//! flattened into one stable text blob so re-querying returns a readable
//! answer, and its structured fields travel along as metadata.


use anyhow::{Context, anyhow};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, info, warn};

use super::{IngestPipeline, IngestSummary};
use crate::{RagError, Result};

/// One organic search result
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebSearchResult {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub title: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub url: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub snippet: String,
}

/// Strings pass through, numbers and booleans are printed, anything else
/// reads as empty so one odd field never costs the whole result
fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(text) => text,
        serde_json::Value::Number(number) => number.to_string(),
        serde_json::Value::Bool(flag) => flag.to_string(),
        serde_json::Value::Null | serde_json::Value::Array(_) | serde_json::Value::Object(_) => {
            String::new()
        }
    })
}

impl WebSearchResult {
    #[inline]
    pub fn new(
        title: impl Into<String>,
        url: impl Into<String>,
        snippet: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            snippet: snippet.into(),
        }
    }

    /// True when title, url and snippet are all blank
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.title.trim().is_empty() && self.url.trim().is_empty() && self.snippet.trim().is_empty()
    }

    /// The persisted text form of this result
    #[inline]
    pub fn flatten(&self) -> String {
        format!(
            "Title: {}\nURL: {}\nSnippet: {}",
            self.title, self.url, self.snippet
        )
    }

    fn metadata(&self, query: &str) -> serde_json::Value {
        serde_json::json!({
            "title": self.title,
            "url": self.url,
            "snippet": self.snippet,
            "query": query,
        })
    }
}

#[derive(Deserialize)]
struct SearchResponse {
    organic: Option<Vec<serde_json::Value>>,
}

/// Pull the organic results out of a search-proxy JSON response.
///
/// Entries that are not objects are ignored. Missing, null or structured
/// fields read as empty strings; numbers and booleans are kept as text.
#[inline]
pub fn parse_search_response(body: &str) -> Result<Vec<WebSearchResult>> {
    let response: SearchResponse =
        serde_json::from_str(body).context("Failed to parse search response as JSON")?;

    let organic = response
        .organic
        .ok_or_else(|| anyhow!("Unexpected response format - 'organic' key not found"))?;

    let results: Vec<WebSearchResult> = organic
        .into_iter()
        .filter_map(|entry| match serde_json::from_value(entry) {
            Ok(result) => Some(result),
            Err(e) => {
                debug!("Ignoring malformed organic entry: {}", e);
                None
            }
        })
        .collect();

    debug!("Parsed {} organic results", results.len());
    Ok(results)
}

/// Caches web search results for one query
pub struct WebSearchIngestor {
    pipeline: IngestPipeline,
}

impl WebSearchIngestor {
    #[inline]
    pub fn new(pipeline: IngestPipeline) -> Self {
        Self { pipeline }
    }

    /// Parse a raw search response and ingest its results
    #[inline]
    pub async fn ingest_response(&self, query: &str, body: &str) -> Result<IngestSummary> {
        let results = parse_search_response(body)?;
        self.ingest_results(query, results).await
    }

    /// Flatten and store `results`, tagging each with `query`.
    ///
    /// Skipped and failed indices refer to positions in `results`; blank
    /// results are reported as skipped alongside rejected ones.
    #[inline]
    pub async fn ingest_results(
        &self,
        query: &str,
        results: Vec<WebSearchResult>,
    ) -> Result<IngestSummary> {
        let total = results.len();
        let mut positions = Vec::with_capacity(total);
        let mut texts = Vec::with_capacity(total);
        let mut metadata = Vec::with_capacity(total);
        let mut blank = Vec::new();

        for (index, result) in results.iter().enumerate() {
            if result.is_empty() {
                warn!("Skipping empty search result at position {}", index);
                blank.push(index);
                continue;
            }
            positions.push(index);
            texts.push(result.flatten());
            metadata.push(result.metadata(query));
        }

        if texts.is_empty() {
            return Err(RagError::Ingest {
                collection: self.pipeline.collection_name().to_string(),
                failed: (0..total).collect(),
                reason: "No valid results found to store".to_string(),
            });
        }

        info!(
            "Storing {} of {} search results for query {:?}",
            texts.len(),
            total,
            query
        );

        match self.pipeline.run(texts, Some(metadata)).await {
            Ok(mut summary) => {
                let rejected = std::mem::take(&mut summary.skipped)
                    .into_iter()
                    .map(|(index, reason)| (positions[index], reason));
                let mut skipped: Vec<(usize, String)> = blank
                    .into_iter()
                    .map(|index| (index, "empty search result".to_string()))
                    .chain(rejected)
                    .collect();
                skipped.sort_by_key(|(index, _)| *index);
                summary.skipped = skipped;
                Ok(summary)
            }
            Err(RagError::Ingest {
                collection,
                failed,
                reason,
            }) => {
                let mut failed: Vec<usize> = blank
                    .into_iter()
                    .chain(failed.into_iter().map(|index| positions[index]))
                    .collect();
                failed.sort_unstable();
                Err(RagError::Ingest {
                    collection,
                    failed,
                    reason,
                })
            }
            Err(e) => Err(e),
        }
    }
}
