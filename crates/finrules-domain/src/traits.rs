//! Trait definitions for external interactions
//!
//! These traits define the boundaries between domain logic and infrastructure.
//! Infrastructure implementations live in other crates.

use crate::{Chunk, Document, RetrievedChunk};
use std::time::Duration;
use thiserror::Error;

/// Trait for text generation backends
///
/// Implemented by the infrastructure layer (finrules-llm)
pub trait LlmProvider {
    /// Error type for LLM operations
    type Error: std::fmt::Display;

    /// Generate a completion of at most `max_tokens` tokens
    fn generate(&self, prompt: &str, max_tokens: usize) -> Result<String, Self::Error>;

    /// Whether the backend is configured at all
    ///
    /// Unavailable providers let callers skip straight to their fallback.
    fn is_available(&self) -> bool {
        true
    }

    /// Upper bound on one `generate` call when each request to the backend
    /// is limited to `per_attempt`
    ///
    /// Providers that retry internally widen this to cover every attempt and
    /// the waits between them.
    fn call_budget(&self, per_attempt: Duration) -> Duration {
        per_attempt
    }
}

/// Errors that can occur during embedding generation
#[derive(Error, Debug)]
pub enum EmbeddingError {
    /// No embedding backend configured
    #[error("Embedding backend unavailable")]
    Unavailable,

    /// Invalid input text
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Backend call failed
    #[error("Embedding failed: {0}")]
    InferenceFailed(String),

    /// Backend returned a vector of the wrong size
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Configured dimension
        expected: usize,
        /// Returned dimension
        actual: usize,
    },
}

/// Trait for embedding models
///
/// Object-safe so a store can hold `Box<dyn EmbeddingModel>`.
pub trait EmbeddingModel: Send + Sync {
    /// Generate an embedding vector for the given text
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Get the dimension of embeddings produced by this model
    fn dimension(&self) -> usize;
}

/// Outcome of an upsert
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexReport {
    /// Chunks written
    pub indexed: usize,
    /// Chunks stored with an embedding
    pub embedded: usize,
}

/// Trait for the chunk store
///
/// Implemented by the infrastructure layer (finrules-store)
pub trait VectorStore {
    /// Error type for store operations
    type Error: std::fmt::Display;

    /// Insert or replace chunks by id
    ///
    /// Either every chunk is written or none is.
    fn upsert(&mut self, chunks: &[Chunk]) -> Result<IndexReport, Self::Error>;

    /// Search across all documents
    fn query(&self, text: &str, top_k: usize) -> Result<Vec<RetrievedChunk>, Self::Error> {
        self.query_scoped(text, top_k, None)
    }

    /// Search, restricted to one document when `document_id` is set
    fn query_scoped(
        &self,
        text: &str,
        top_k: usize,
        document_id: Option<&str>,
    ) -> Result<Vec<RetrievedChunk>, Self::Error>;

    /// Drop every chunk of a document, returning how many were removed
    fn remove_document(&mut self, document_id: &str) -> Result<usize, Self::Error>;

    /// Make `chunks` the only stored chunks of `document_id`
    ///
    /// Chunks the new content no longer produces are dropped. Stores that
    /// can should do this atomically.
    fn replace_document(&mut self, document_id: &str, chunks: &[Chunk]) -> Result<IndexReport, Self::Error> {
        self.remove_document(document_id)?;
        self.upsert(chunks)
    }

    /// Total stored chunks
    fn count(&self) -> Result<usize, Self::Error>;
}

/// Errors raised by a document parser
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Source kind the parser cannot handle
    #[error("Unsupported source: {0}")]
    Unsupported(String),

    /// Document has nothing to parse
    #[error("Document has no content source")]
    MissingSource,

    /// Source could not be read
    #[error("Failed to read source: {0}")]
    Io(String),

    /// Parsed content is blank
    #[error("Document content is empty")]
    Empty,
}

/// Trait for turning a document's source into text
pub trait DocumentParser {
    /// Parse the document's source into cleaned text
    fn parse(&self, document: &Document) -> Result<String, ParseError>;
}
