//! Finrules Agent
//!
//! Runs regulatory documents through the full rule-mining pipeline and
//! aggregates the results.
//!
//! # Example
//!
//! ```no_run
//! use finrules_agent::{Pipeline, PipelineConfig};
//! use finrules_domain::{DocumentDescriptor, TrackCatalog};
//! use finrules_llm::UnavailableProvider;
//! use finrules_store::{HashEmbeddingModel, SqliteVectorStore, StoreConfig};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let store = SqliteVectorStore::open(StoreConfig::at("finrules.db"), Some(Box::new(HashEmbeddingModel::default())))?;
//! let pipeline = Pipeline::new(UnavailableProvider, store, TrackCatalog::reference(), PipelineConfig::default())?;
//!
//! let result = pipeline
//!     .process_document(&DocumentDescriptor::inline("لائحة", "يجب التحقق من الفاتورة قبل الصرف."))
//!     .await?;
//! println!("{} rule(s), {} gap(s)", result.extracted_rules.len(), result.gaps.len());
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod backend;
pub mod cli;
pub mod config;
pub mod error;
pub mod parser;
pub mod pipeline;
pub mod report;

pub use backend::Backend;
pub use cli::{Cli, Preset};
pub use config::PipelineConfig;
pub use error::PipelineError;
pub use parser::TextParser;
pub use pipeline::Pipeline;
pub use report::{BatchFailure, BatchReport, ComprehensiveReport, DocumentSummary, ReportMetadata, ReportSummary};
