//! HNSW Vector Index for Similarity Search
//!
//! Wraps `hnsw_rs` for nearest-neighbour search over chunk embeddings.
//!
//! # Architecture
//!
//! - In-memory only; rebuilt from the `chunks` table on open
//! - HNSW has no delete, so replacing or removing a chunk leaves a stale
//!   node behind. Stale nodes are skipped at search time and the index is
//!   over-fetched by the stale count to compensate. The store rebuilds the
//!   index once stale nodes dominate.
//!
//! # HNSW Parameters
//!
//! - **M**: Number of bi-directional links per node (default: 16)
//! - **efConstruction**: Candidate list size during construction (default: 200)
//! - **efSearch**: Candidate list size during search (caller supplied)

use hnsw_rs::prelude::*;
use std::collections::HashMap;
use thiserror::Error;

const DEFAULT_M: usize = 16;
const DEFAULT_EF_CONSTRUCTION: usize = 200;
const DEFAULT_MAX_ELEMENTS: usize = 100_000;

/// Errors that can occur during vector index operations
#[derive(Error, Debug)]
pub enum VectorIndexError {
    /// Invalid embedding dimension
    #[error("Invalid embedding dimension: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Expected dimension
        expected: usize,
        /// Actual dimension provided
        actual: usize,
    },
}

/// Nearest-neighbour index keyed by chunk id
///
/// # Examples
///
/// ```
/// use finrules_store::vector_index::VectorIndex;
///
/// let mut index = VectorIndex::new(3);
/// index.add("doc_0", &[1.0, 0.0, 0.0]).unwrap();
/// index.add("doc_1", &[0.0, 1.0, 0.0]).unwrap();
///
/// let hits = index.search(&[1.0, 0.0, 0.0], 1, 64).unwrap();
/// assert_eq!(hits[0].0, "doc_0");
/// ```
pub struct VectorIndex {
    dimension: usize,
    hnsw: Hnsw<'static, f32, DistCosine>,
    /// Internal HNSW id -> chunk id, including stale nodes
    nodes: HashMap<usize, String>,
    /// Chunk id -> its live internal id
    live: HashMap<String, usize>,
    next_id: usize,
}

fn new_hnsw() -> Hnsw<'static, f32, DistCosine> {
    let nb_layer = 16.min((DEFAULT_MAX_ELEMENTS as f32).ln().trunc() as usize);
    Hnsw::<'static, f32, DistCosine>::new(
        DEFAULT_M,
        DEFAULT_MAX_ELEMENTS,
        nb_layer,
        DEFAULT_EF_CONSTRUCTION,
        DistCosine {},
    )
}

impl VectorIndex {
    /// Create an empty index for `dimension`-sized vectors
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            hnsw: new_hnsw(),
            nodes: HashMap::new(),
            live: HashMap::new(),
            next_id: 0,
        }
    }

    /// Embedding dimension
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Insert or replace the vector of `chunk_id`
    pub fn add(&mut self, chunk_id: &str, embedding: &[f32]) -> Result<(), VectorIndexError> {
        if embedding.len() != self.dimension {
            return Err(VectorIndexError::DimensionMismatch {
                expected: self.dimension,
                actual: embedding.len(),
            });
        }

        let internal_id = self.next_id;
        self.next_id += 1;

        let data = embedding.to_vec();
        self.hnsw.insert((&data, internal_id));
        self.nodes.insert(internal_id, chunk_id.to_string());
        self.live.insert(chunk_id.to_string(), internal_id);
        Ok(())
    }

    /// Forget `chunk_id`; its node becomes stale
    pub fn remove(&mut self, chunk_id: &str) -> bool {
        self.live.remove(chunk_id).is_some()
    }

    /// Whether `chunk_id` has a live vector
    pub fn contains(&self, chunk_id: &str) -> bool {
        self.live.contains_key(chunk_id)
    }

    /// Up to `k` live chunks nearest to `query`, as
    /// `(chunk_id, cosine_distance)` sorted by ascending distance
    ///
    /// Cosine distance lies in [0, 2].
    pub fn search(
        &self,
        query: &[f32],
        k: usize,
        ef_search: usize,
    ) -> Result<Vec<(String, f32)>, VectorIndexError> {
        if query.len() != self.dimension {
            return Err(VectorIndexError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }
        if k == 0 || self.live.is_empty() {
            return Ok(Vec::new());
        }

        // Over-fetch to make room for stale nodes
        let fetch = self.nodes.len().min(k + self.stale_count());
        let neighbours = self.hnsw.search(query, fetch, ef_search.max(fetch));

        let mut hits: Vec<(String, f32)> = neighbours
            .into_iter()
            .filter_map(|n| {
                let chunk_id = self.nodes.get(&n.d_id)?;
                let live = self.live.get(chunk_id).is_some_and(|&id| id == n.d_id);
                live.then(|| (chunk_id.clone(), n.distance))
            })
            .collect();

        hits.sort_by(|a, b| a.1.total_cmp(&b.1));
        hits.truncate(k);
        Ok(hits)
    }

    /// Number of live vectors
    pub fn len(&self) -> usize {
        self.live.len()
    }

    /// Check if the index is empty
    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    /// Nodes that no longer map to a live chunk
    pub fn stale_count(&self) -> usize {
        self.nodes.len() - self.live.len()
    }

    /// Drop every vector
    pub fn clear(&mut self) {
        self.hnsw = new_hnsw();
        self.nodes.clear();
        self.live.clear();
        self.next_id = 0;
    }
}
