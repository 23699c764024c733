//! Error types for the pipeline

use thiserror::Error;

/// Systemic pipeline failures
///
/// Recoverable stage failures (indexing, retrieval, extraction, mapping)
/// never surface here; they degrade the run and show up in its statistics.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Invalid or unreadable configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Another holder of the store lock panicked
    #[error("Vector store lock poisoned")]
    LockPoisoned,

    /// Blocking task panicked or was cancelled
    #[error("Task join error: {0}")]
    Task(String),

    /// I/O error outside document parsing
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<finrules_extractor::ExtractorError> for PipelineError {
    fn from(e: finrules_extractor::ExtractorError) -> Self {
        PipelineError::Config(e.to_string())
    }
}

impl From<regex::Error> for PipelineError {
    fn from(e: regex::Error) -> Self {
        PipelineError::Config(format!("invalid pattern: {}", e))
    }
}
