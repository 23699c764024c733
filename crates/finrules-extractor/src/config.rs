//! Configuration for the Extractor

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for chunking, extraction and mapping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    /// Target chunk size (characters)
    pub chunk_size: usize,

    /// Characters shared by adjacent chunks
    pub chunk_overlap: usize,

    /// Chunks retrieved per query
    pub retrieval_top_k: usize,

    /// Chunks sent to the model per extraction call
    pub batch_size: usize,

    /// Maximum batch text sent to the model (characters)
    pub max_context_chars: usize,

    /// Maximum time for a single model call (seconds)
    pub llm_timeout_secs: u64,

    /// Token limit for extraction calls
    pub extraction_max_tokens: usize,

    /// Token limit for track classification calls
    pub mapping_max_tokens: usize,
}

impl ExtractorConfig {
    /// Get the model call timeout as a Duration
    pub fn llm_timeout(&self) -> Duration {
        Duration::from_secs(self.llm_timeout_secs)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.chunk_size == 0 {
            return Err("chunk_size must be greater than 0".to_string());
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err("chunk_overlap must be smaller than chunk_size".to_string());
        }
        if self.retrieval_top_k == 0 {
            return Err("retrieval_top_k must be greater than 0".to_string());
        }
        if self.batch_size == 0 {
            return Err("batch_size must be greater than 0".to_string());
        }
        if self.max_context_chars == 0 {
            return Err("max_context_chars must be greater than 0".to_string());
        }
        if self.llm_timeout_secs == 0 {
            return Err("llm_timeout_secs must be greater than 0".to_string());
        }
        if self.extraction_max_tokens == 0 || self.mapping_max_tokens == 0 {
            return Err("token limits must be greater than 0".to_string());
        }
        Ok(())
    }
}

impl Default for ExtractorConfig {
    /// Default configuration with balanced settings
    fn default() -> Self {
        Self {
            chunk_size: 2000,
            chunk_overlap: 200,
            retrieval_top_k: 5,
            batch_size: 5,
            max_context_chars: 8000,
            llm_timeout_secs: 60,
            extraction_max_tokens: 2000,
            mapping_max_tokens: 500,
        }
    }
}

impl ExtractorConfig {
    /// Fast preset: fewer retrieved chunks, bigger batches, shorter timeouts
    pub fn fast() -> Self {
        Self {
            chunk_size: 3000,
            chunk_overlap: 150,
            retrieval_top_k: 3,
            batch_size: 8,
            max_context_chars: 8000,
            llm_timeout_secs: 30,
            extraction_max_tokens: 1500,
            mapping_max_tokens: 300,
        }
    }

    /// Thorough preset: smaller chunks and batches for better attribution
    pub fn thorough() -> Self {
        Self {
            chunk_size: 1200,
            chunk_overlap: 200,
            retrieval_top_k: 10,
            batch_size: 3,
            max_context_chars: 8000,
            llm_timeout_secs: 180,
            extraction_max_tokens: 3000,
            mapping_max_tokens: 500,
        }
    }

    /// Load configuration from TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self, String> {
        toml::from_str(toml_str).map_err(|e| format!("Failed to parse TOML: {}", e))
    }

    /// Serialize configuration to TOML string
    pub fn to_toml(&self) -> Result<String, String> {
        toml::to_string_pretty(self).map_err(|e| format!("Failed to serialize to TOML: {}", e))
    }
}
