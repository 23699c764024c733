//! Finrules Domain Layer
//!
//! This crate contains the data model shared by every stage of the
//! rule-extraction pipeline and the trait seams behind which external
//! collaborators (LLM, embedding backend, vector store, document parser) live.
//!
//! ## Key Concepts
//!
//! - **Document**: a regulation (PDF, web page or text) whose content is mined for rules
//! - **Chunk**: an overlapping, sentence-aware slice of a document, the unit of indexing
//! - **CandidateRule**: a rule proposed by the extractor, before track mapping
//! - **ExtractedRule**: a candidate rule mapped (or not) to a track
//! - **Track**: a regulatory category with its catalog of existing rules
//! - **Gap**: an extracted rule the track catalog does not (fully) cover
//!
//! ## Architecture
//!
//! - Pure data and trait definitions only
//! - Infrastructure implementations live in `finrules-llm` and `finrules-store`
//! - Only serialization, error-derive and id-generation crates as dependencies

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod chunk;
pub mod document;
pub mod gap;
pub mod result;
pub mod rule;
pub mod track;
pub mod traits;

// Re-exports for convenience
pub use chunk::{Chunk, RetrievalMethod, RetrievedChunk};
pub use document::{Document, DocumentDescriptor, DocumentId, DocumentSource, DocumentStatus, DocumentType};
pub use gap::{Gap, GapType, Severity};
pub use result::{ExtractionResult, ExtractionStatistics, GapTypeCounts, PipelineStage, StatusCounts};
pub use rule::{CandidateRule, ExtractedRule, ExtractionMethod, RuleStatus, SourceReference};
pub use track::{ExistingRule, Track, TrackCatalog, TrackCatalogError};

use std::time::{SystemTime, UNIX_EPOCH};

/// Seconds since the Unix epoch, or 0 if the system clock is before it
pub fn unix_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
