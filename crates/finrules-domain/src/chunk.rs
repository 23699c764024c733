//! Chunks - the unit of indexing and retrieval

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A contiguous slice of a document's content
///
/// Chunks are derived deterministically from a document and never mutated;
/// re-indexing the same document replaces them by id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Globally unique id: `{document_id}_{index}` or `{document_id}_full`
    pub id: String,

    /// Owning document
    pub document_id: String,

    /// Position within the document (0 for an unchunked document)
    pub index: usize,

    /// Chunk text
    pub text: String,

    /// Offset of the first character, in chars
    pub start_offset: usize,

    /// Offset one past the last character, in chars
    pub end_offset: usize,

    /// Free-form metadata (document name, type, ...)
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl Chunk {
    /// Create chunk `index` of a chunked document
    pub fn new(
        document_id: impl Into<String>,
        index: usize,
        text: impl Into<String>,
        start_offset: usize,
        end_offset: usize,
    ) -> Self {
        let document_id = document_id.into();
        Self {
            id: Self::chunk_id(&document_id, index),
            document_id,
            index,
            text: text.into(),
            start_offset,
            end_offset,
            metadata: BTreeMap::new(),
        }
    }

    /// Create the single chunk of an unchunked document
    pub fn whole(document_id: impl Into<String>, text: impl Into<String>) -> Self {
        let document_id = document_id.into();
        let text = text.into();
        Self {
            id: format!("{}_full", document_id),
            document_id,
            index: 0,
            start_offset: 0,
            end_offset: text.chars().count(),
            text,
            metadata: BTreeMap::new(),
        }
    }

    /// Id of chunk `index` within `document_id`
    pub fn chunk_id(document_id: &str, index: usize) -> String {
        format!("{}_{}", document_id, index)
    }

    /// Attach a metadata entry
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// How a chunk was found
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalMethod {
    /// Nearest neighbour by embedding distance
    Vector,
    /// Keyword scoring fallback
    Keyword,
}

/// A chunk returned by a query, with its relevance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedChunk {
    /// The stored chunk
    pub chunk: Chunk,

    /// Relevance in [0, 1]
    pub relevance_score: f64,

    /// Which search channel produced the hit
    pub retrieval_method: RetrievalMethod,
}

impl RetrievedChunk {
    /// Wrap a chunk with its score, clamped to [0, 1]
    pub fn new(chunk: Chunk, relevance_score: f64, retrieval_method: RetrievalMethod) -> Self {
        Self {
            chunk,
            relevance_score: relevance_score.clamp(0.0, 1.0),
            retrieval_method,
        }
    }

    /// Chunk id shortcut
    pub fn id(&self) -> &str {
        &self.chunk.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_ids() {
        let chunk = Chunk::new("doc_1", 3, "text", 10, 14);
        assert_eq!(chunk.id, "doc_1_3");

        let whole = Chunk::whole("doc_1", "نص كامل");
        assert_eq!(whole.id, "doc_1_full");
        assert_eq!(whole.end_offset, 7);
    }

    #[test]
    fn test_retrieved_score_clamped() {
        let chunk = Chunk::new("d", 0, "t", 0, 1);
        let hit = RetrievedChunk::new(chunk.clone(), 1.7, RetrievalMethod::Keyword);
        assert_eq!(hit.relevance_score, 1.0);

        let hit = RetrievedChunk::new(chunk, -0.2, RetrievalMethod::Vector);
        assert_eq!(hit.relevance_score, 0.0);
    }
}
