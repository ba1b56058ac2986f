// LanceDB vector database module
// Named collections of embedded texts with top-k similarity search


pub mod collection;
pub mod vector_store;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub use collection::VectorCollection;
pub use vector_store::VectorStore;

/// Similarity metric a collection is searched with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    Cosine,
    L2,
    Dot,
}

impl DistanceMetric {
    #[inline]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cosine => "cosine",
            Self::L2 => "l2",
            Self::Dot => "dot",
        }
    }

    #[inline]
    pub fn distance_type(self) -> lancedb::DistanceType {
        match self {
            Self::Cosine => lancedb::DistanceType::Cosine,
            Self::L2 => lancedb::DistanceType::L2,
            Self::Dot => lancedb::DistanceType::Dot,
        }
    }

    /// Convert a raw distance into a score where higher is better
    #[inline]
    pub fn similarity(self, distance: f32) -> f32 {
        match self {
            Self::Cosine | Self::Dot => 1.0 - distance,
            Self::L2 => 1.0 / (1.0 + distance),
        }
    }
}

impl fmt::Display for DistanceMetric {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DistanceMetric {
    type Err = String;

    #[inline]
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cosine" => Ok(Self::Cosine),
            "l2" | "euclidean" => Ok(Self::L2),
            "dot" => Ok(Self::Dot),
            other => Err(format!("unknown distance metric: {other}")),
        }
    }
}

/// A stored embedding and the text it was produced from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Unique identifier for this record
    pub id: String,
    /// Position in insertion order within its collection
    pub seq: u64,
    pub vector: Vec<f32>,
    /// The text the vector was embedded from, returned verbatim on retrieval
    pub text: String,
    /// Optional free-form metadata supplied at ingestion
    pub metadata: Option<serde_json::Value>,
    /// RFC 3339 timestamp of the ingest batch that wrote this record
    pub created_at: String,
}

/// One ranked hit from a similarity query
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub record: Record,
    pub similarity_score: f32,
    pub distance: f32,
}

/// Shape of an existing collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CollectionInfo {
    pub name: String,
    pub dimension: usize,
    pub metric: DistanceMetric,
}

/// Outcome of a successful ingest batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestReport {
    pub collection: String,
    pub ids: Vec<String>,
    pub first_seq: u64,
}

impl IngestReport {
    #[inline]
    pub fn inserted(&self) -> usize {
        self.ids.len()
    }
}
