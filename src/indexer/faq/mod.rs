//! FAQ dataset ingestion
//!
//! Accepts either a JSON array (plain strings or `{question, answer}`
//! objects) or a text file with one record per line.


use std::path::Path;

use serde::Deserialize;
use tracing::info;

use super::{IngestPipeline, IngestSummary};
use crate::{RagError, Result};

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum FaqEntry {
    Text(String),
    Pair {
        question: String,
        #[serde(default)]
        answer: Option<String>,
    },
}

impl FaqEntry {
    fn into_text(self) -> String {
        match self {
            Self::Text(text) => text,
            Self::Pair {
                question,
                answer: Some(answer),
            } if !answer.trim().is_empty() => format!("{}\n{}", question.trim(), answer.trim()),
            Self::Pair { question, .. } => question,
        }
    }
}

/// Read the records of a FAQ dataset file.
///
/// Blank records are dropped here so that indices in later skip reports
/// refer to real entries.
#[inline]
pub fn load_dataset(path: &Path) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path)?;

    let is_json = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

    let records: Vec<String> = if is_json {
        let entries: Vec<FaqEntry> = serde_json::from_str(&content).map_err(|e| {
            RagError::Config(format!(
                "Invalid FAQ dataset {}: {}",
                path.display(),
                e
            ))
        })?;
        entries.into_iter().map(FaqEntry::into_text).collect()
    } else {
        content.lines().map(str::to_string).collect()
    };

    Ok(records
        .into_iter()
        .map(|record| record.trim().to_string())
        .filter(|record| !record.is_empty())
        .collect())
}

/// Loads a static FAQ dataset into its collection
pub struct FaqIngestor {
    pipeline: IngestPipeline,
}

impl FaqIngestor {
    #[inline]
    pub fn new(pipeline: IngestPipeline) -> Self {
        Self { pipeline }
    }

    /// Load `path` and ingest every record in it
    #[inline]
    pub async fn ingest_file(&self, path: &Path) -> Result<IngestSummary> {
        let records = load_dataset(path)?;
        info!(
            "Loaded {} FAQ records from {}",
            records.len(),
            path.display()
        );
        self.ingest_texts(records).await
    }

    #[inline]
    pub async fn ingest_texts(&self, texts: Vec<String>) -> Result<IngestSummary> {
        if texts.is_empty() {
            return Err(RagError::Ingest {
                collection: self.pipeline.collection_name().to_string(),
                failed: Vec::new(),
                reason: "FAQ dataset contains no records".to_string(),
            });
        }
        self.pipeline.run(texts, None).await
    }
}
