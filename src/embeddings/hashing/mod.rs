
use tracing::debug;

use super::{Embedder, EmbeddingVector, validate_text};
use crate::{RagError, Result};

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Deterministic feature-hashing embedder.
///
/// Each lowercase alphanumeric token is hashed with FNV-1a into one of
/// `dimension` signed buckets and the result is L2-normalized, so texts
/// sharing vocabulary land close together under cosine distance. Needs
/// no model download, which makes it the backend for offline use and tests.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimension: usize,
    model_name: String,
}

impl HashingEmbedder {
    #[inline]
    pub fn new(dimension: usize) -> Result<Self> {
        if dimension == 0 {
            return Err(RagError::Config(
                "hashing embedder dimension must be greater than 0".to_string(),
            ));
        }
        Ok(Self {
            dimension,
            model_name: format!("hashing-fnv1a-{dimension}"),
        })
    }

    fn embed_one(&self, text: &str) -> Result<EmbeddingVector> {
        validate_text(text)?;

        let mut vector = vec![0.0_f32; self.dimension];
        let mut token_count = 0_usize;

        for token in tokenize(text) {
            let hash = fnv1a(token.as_bytes());
            let bucket = (hash % self.dimension as u64) as usize;
            let sign = if hash >> 63 == 1 { -1.0 } else { 1.0 };
            vector[bucket] += sign;
            token_count += 1;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if token_count == 0 || norm == 0.0 {
            return Err(RagError::Embedding(format!(
                "text has no indexable tokens: {:?}",
                text.chars().take(40).collect::<String>()
            )));
        }

        for value in &mut vector {
            *value /= norm;
        }
        Ok(vector)
    }
}

impl Embedder for HashingEmbedder {
    #[inline]
    fn embed(&self, texts: &[String]) -> Result<Vec<EmbeddingVector>> {
        debug!("Hashing {} texts into {} dimensions", texts.len(), self.dimension);
        texts.iter().map(|text| self.embed_one(text)).collect()
    }

    #[inline]
    fn dimension(&self) -> usize {
        self.dimension
    }

    #[inline]
    fn model_name(&self) -> &str {
        &self.model_name
    }
}

fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(str::to_lowercase)
}

fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(FNV_OFFSET_BASIS, |hash, byte| {
        (hash ^ u64::from(*byte)).wrapping_mul(FNV_PRIME)
    })
}
