//! Deterministic local embeddings
//!
//! `HashEmbeddingModel` needs no model files or network. It hashes each
//! lowercase token into one of `dimension` buckets (feature hashing with a
//! sign bit), so texts that share words land near each other. It stands in
//! for a real backend in tests and in offline runs.
//!
//! # Examples
//!
//! ```rust
//! use finrules_store::embedding::{cosine_similarity, HashEmbeddingModel};
//! use finrules_domain::traits::EmbeddingModel;
//!
//! let model = HashEmbeddingModel::new(256);
//! let a = model.embed("يجب إرفاق الفاتورة").unwrap();
//! let b = model.embed("يجب إرفاق العقد").unwrap();
//! let c = model.embed("completely unrelated words").unwrap();
//! assert!(cosine_similarity(&a, &b) > cosine_similarity(&a, &c));
//! ```

use finrules_domain::traits::{EmbeddingError, EmbeddingModel};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Default embedding dimension
pub const DEFAULT_DIMENSION: usize = 384;

/// Feature-hashing embedding model
#[derive(Debug, Clone, Copy)]
pub struct HashEmbeddingModel {
    dimension: usize,
}

impl HashEmbeddingModel {
    /// Create a model producing `dimension`-sized unit vectors
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    fn hash_token(token: &str) -> u64 {
        let mut hasher = DefaultHasher::new();
        token.hash(&mut hasher);
        hasher.finish()
    }
}

impl Default for HashEmbeddingModel {
    fn default() -> Self {
        Self::new(DEFAULT_DIMENSION)
    }
}

impl EmbeddingModel for HashEmbeddingModel {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let lowered = text.to_lowercase();
        let tokens: Vec<&str> = lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .collect();

        if tokens.is_empty() {
            return Err(EmbeddingError::InvalidInput(
                "Empty text cannot be embedded".to_string(),
            ));
        }

        let mut embedding = vec![0.0f32; self.dimension];
        for token in tokens {
            let hash = Self::hash_token(token);
            let bucket = (hash % self.dimension as u64) as usize;
            let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
            embedding[bucket] += sign;
        }

        // Normalize to unit length for cosine similarity
        let magnitude: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for value in &mut embedding {
                *value /= magnitude;
            }
        }

        Ok(embedding)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Cosine similarity in [-1, 1]; 0 for zero or mismatched vectors
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let magnitude_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let magnitude_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if magnitude_a == 0.0 || magnitude_b == 0.0 {
        return 0.0;
    }

    dot_product / (magnitude_a * magnitude_b)
}

/// Encode a vector as little-endian bytes for storage
pub fn to_blob(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// Decode a stored vector; `None` if the length is not a multiple of 4
pub fn from_blob(bytes: &[u8]) -> Option<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return None;
    }
    Some(
        bytes
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect(),
    )
}
