//! Finrules Extractor
//!
//! Turns document text into candidate rules and maps them to tracks.
//!
//! # Architecture
//!
//! ```text
//! Text → Chunker → VectorStore → Retriever → Extractor → TrackMapper → ExtractedRule[]
//!                                              ↓ (model down / bad JSON)
//!                                        PatternExtractor
//! ```
//!
//! # Key Features
//!
//! - **Sentence-aware chunking** with overlap between adjacent chunks
//! - **Multi-query retrieval** merged by chunk id, first occurrence wins
//! - **Batched extraction**: one model call per `batch_size` chunks
//! - **Pattern fallback** over Arabic obligation constructions
//! - **Track mapping** by model classification or keyword scoring
//!
//! # Example Usage
//!
//! ```no_run
//! use finrules_extractor::{Chunker, Extractor, ExtractorConfig, Segment, TrackMapper};
//! use finrules_domain::{Document, DocumentDescriptor, TrackCatalog};
//! use finrules_llm::MockProvider;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let llm = Arc::new(MockProvider::new(r#"{"rules": []}"#));
//! let catalog = Arc::new(TrackCatalog::reference());
//! let config = ExtractorConfig::default();
//!
//! let document = Document::from_descriptor(&DocumentDescriptor::inline("لائحة", "يجب إرفاق العقد."));
//! let segments: Vec<Segment> = Chunker::new(config.chunk_size, config.chunk_overlap)
//!     .chunk_document(document.id.as_str(), &document.raw_content)
//!     .into_iter()
//!     .map(Segment::from)
//!     .collect();
//!
//! let extractor = Extractor::new(Arc::clone(&llm), Arc::clone(&catalog), config.clone())?;
//! let outcome = extractor.extract(&document, &segments).await;
//!
//! let mapper = TrackMapper::new(llm, catalog, config);
//! let rules = mapper.map(outcome.rules).await;
//! println!("Mapped {} rules", rules.len());
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

mod chunking;
mod config;
mod error;
mod extractor;
mod mapper;
mod parser;
mod patterns;
mod prompt;
mod retriever;


pub use chunking::{Chunker, TextSpan, SENTENCE_TERMINATORS};
pub use config::ExtractorConfig;
pub use error::ExtractorError;
pub use extractor::{
    ExtractionOutcome, Extractor, Segment, MODEL_CONFIDENCE_WEIGHT, PATTERN_BASE_CONFIDENCE,
    PATTERN_SCORE_FACTOR, RETRIEVAL_SCORE_WEIGHT,
};
pub use mapper::{keyword_match, TrackAssignment, TrackMapper, KEYWORD_CONFIDENCE_CAP, REMAP_THRESHOLD};
pub use parser::{parse_extraction_response, parse_mapping_response, MappingResponse, RawRule};
pub use patterns::{PatternExtractor, MIN_RULE_CHARS};
pub use prompt::PromptBuilder;
pub use retriever::{Retrieval, Retriever};
