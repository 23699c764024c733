//! Pipeline configuration
//!
//! Settings come from three layers, later ones winning: built-in presets,
//! an optional TOML file, and environment variables.

use crate::error::PipelineError;
use finrules_extractor::ExtractorConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::warn;

/// Configuration of a pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Index the document and extract from retrieved chunks
    pub use_rag: bool,

    /// Chunking, extraction and mapping settings
    #[serde(flatten)]
    pub extraction: ExtractorConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            use_rag: true,
            extraction: ExtractorConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Fast preset: fewer, larger model calls
    pub fn fast() -> Self {
        Self {
            use_rag: true,
            extraction: ExtractorConfig::fast(),
        }
    }

    /// Thorough preset: smaller chunks and batches
    pub fn thorough() -> Self {
        Self {
            use_rag: true,
            extraction: ExtractorConfig::thorough(),
        }
    }

    /// Preset by name: "default", "fast" or "thorough"
    pub fn preset(name: &str) -> Option<Self> {
        match name {
            "default" => Some(Self::default()),
            "fast" => Some(Self::fast()),
            "thorough" => Some(Self::thorough()),
            _ => None,
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), PipelineError> {
        self.extraction.validate().map_err(PipelineError::Config)
    }

    /// Load configuration from TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self, PipelineError> {
        toml::from_str(toml_str).map_err(|e| PipelineError::Config(format!("Failed to parse TOML: {}", e)))
    }

    /// Serialize configuration to TOML string
    pub fn to_toml(&self) -> Result<String, PipelineError> {
        toml::to_string_pretty(self)
            .map_err(|e| PipelineError::Config(format!("Failed to serialize to TOML: {}", e)))
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, PipelineError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Apply `CHUNK_SIZE`, `CHUNK_OVERLAP`, `RETRIEVAL_TOP_K`, `BATCH_SIZE`,
    /// `USE_RAG` and `LLM_TIMEOUT_SECS` from the environment
    pub fn with_env_overrides(self) -> Result<Self, PipelineError> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from `lookup`; unparsable values are an error
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self, PipelineError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let extraction = &mut self.extraction;
        override_number(&lookup, "CHUNK_SIZE", &mut extraction.chunk_size)?;
        override_number(&lookup, "CHUNK_OVERLAP", &mut extraction.chunk_overlap)?;
        override_number(&lookup, "RETRIEVAL_TOP_K", &mut extraction.retrieval_top_k)?;
        override_number(&lookup, "BATCH_SIZE", &mut extraction.batch_size)?;
        override_number(&lookup, "LLM_TIMEOUT_SECS", &mut extraction.llm_timeout_secs)?;

        if let Some(value) = lookup("USE_RAG") {
            self.use_rag = match value.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                other => {
                    return Err(PipelineError::Config(format!("USE_RAG: invalid boolean '{}'", other)));
                }
            };
        }

        Ok(self)
    }
}

fn override_number<F, T>(lookup: &F, key: &str, target: &mut T) -> Result<(), PipelineError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let Some(value) = lookup(key) else {
        return Ok(());
    };
    *target = value.trim().parse().map_err(|e| {
        warn!("Rejecting {}={}", key, value);
        PipelineError::Config(format!("{}: {}", key, e))
    })?;
    Ok(())
}
