use std::time::Duration;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, RagError>;

#[derive(Error, Debug)]
pub enum RagError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Embedding model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Collection not found: {0}")]
    CollectionNotFound(String),

    #[error(
        "Dimension mismatch for collection '{collection}': existing {existing}, requested {requested}"
    )]
    DimensionMismatch {
        collection: String,
        existing: usize,
        requested: usize,
    },

    #[error(
        "Distance metric mismatch for collection '{collection}': existing {existing}, requested {requested}"
    )]
    MetricMismatch {
        collection: String,
        existing: String,
        requested: String,
    },

    #[error("Ingest into '{collection}' failed for records {failed:?}: {reason}")]
    Ingest {
        collection: String,
        failed: Vec<usize>,
        reason: String,
    },

    #[error("Retrieval from '{collection}' failed: {cause}")]
    Retrieval {
        collection: String,
        #[source]
        cause: Box<RagError>,
    },

    #[error("All {} search sources failed: {}", failures.len(), format_failures(failures))]
    AllSourcesFailed { failures: Vec<(String, String)> },

    #[error("Database error: {0}")]
    Database(String),

    #[error("Timed out after {after:?}: {operation}")]
    Timeout { operation: String, after: Duration },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl RagError {
    /// Configuration-class errors that retrying cannot fix
    #[inline]
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::ModelUnavailable(_)
            | Self::CollectionNotFound(_)
            | Self::DimensionMismatch { .. }
            | Self::MetricMismatch { .. }
            | Self::Config(_) => true,
            Self::Retrieval { cause, .. } => cause.is_fatal(),
            _ => false,
        }
    }
}

fn format_failures(failures: &[(String, String)]) -> String {
    failures
        .iter()
        .map(|(source, reason)| format!("{source}: {reason}"))
        .collect::<Vec<_>>()
        .join("; ")
}

pub mod commands;
pub mod config;
pub mod database;
pub mod embeddings;
pub mod indexer;
pub mod retriever;
pub mod search;
