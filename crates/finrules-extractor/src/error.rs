//! Error types for the Extractor

use thiserror::Error;

/// Errors that can occur during extraction and mapping
#[derive(Error, Debug)]
pub enum ExtractorError {
    /// LLM provider error
    #[error("LLM error: {0}")]
    Llm(String),

    /// Vector store error
    #[error("Store error: {0}")]
    Store(String),

    /// Model call exceeded its deadline
    #[error("LLM call timed out after {0}s")]
    Timeout(u64),

    /// Model output had no usable JSON object
    #[error("Invalid response format: {0}")]
    InvalidFormat(String),

    /// JSON parsing error
    #[error("JSON parse error: {0}")]
    JsonParse(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Blocking task panicked or was cancelled
    #[error("Task join error: {0}")]
    Task(String),
}

impl From<serde_json::Error> for ExtractorError {
    fn from(e: serde_json::Error) -> Self {
        ExtractorError::JsonParse(e.to_string())
    }
}

impl From<regex::Error> for ExtractorError {
    fn from(e: regex::Error) -> Self {
        ExtractorError::Config(format!("invalid pattern: {}", e))
    }
}
