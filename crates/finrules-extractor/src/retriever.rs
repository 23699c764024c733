//! Multi-query retrieval with deduplication

use finrules_domain::traits::VectorStore;
use finrules_domain::RetrievedChunk;
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// Merged result of a set of queries
#[derive(Debug, Clone, Default)]
pub struct Retrieval {
    /// Unique chunks in order of first retrieval
    pub chunks: Vec<RetrievedChunk>,
    /// Queries that returned at least one chunk
    pub answered_queries: usize,
    /// Queries whose store call failed
    pub failed_queries: usize,
}

impl Retrieval {
    /// Whether no query produced any chunk
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

/// Issues topical queries against a store and merges the hits
#[derive(Debug, Clone, Copy)]
pub struct Retriever {
    top_k_per_query: usize,
}

impl Retriever {
    /// Create a retriever asking for `top_k_per_query` chunks per query
    pub fn new(top_k_per_query: usize) -> Self {
        Self { top_k_per_query }
    }

    /// Run every query, keeping the first occurrence of each chunk id
    ///
    /// Failing or empty queries are skipped. An empty result means no
    /// retrieval context is available.
    pub fn retrieve_for_tracks<S: VectorStore>(
        &self,
        store: &S,
        queries: &[String],
        document_id: Option<&str>,
    ) -> Retrieval {
        let mut seen = HashSet::new();
        let mut retrieval = Retrieval::default();

        for query in queries {
            let hits = match store.query_scoped(query, self.top_k_per_query, document_id) {
                Ok(hits) => hits,
                Err(e) => {
                    warn!("Retrieval query '{}' failed, skipping: {}", query, e);
                    retrieval.failed_queries += 1;
                    continue;
                }
            };

            if hits.is_empty() {
                debug!("Retrieval query '{}' returned nothing", query);
                continue;
            }
            retrieval.answered_queries += 1;

            for hit in hits {
                if seen.insert(hit.chunk.id.clone()) {
                    retrieval.chunks.push(hit);
                }
            }
        }

        info!(
            "Retrieved {} unique chunk(s) from {}/{} queries",
            retrieval.chunks.len(),
            retrieval.answered_queries,
            queries.len()
        );
        retrieval
    }
}
