//! Ollama embedding backend (`POST /api/embeddings`)

use crate::ollama::{build_client, status_error, DEFAULT_ENDPOINT};
use crate::retry::RetryPolicy;
use crate::LlmError;
use finrules_domain::traits::{EmbeddingError, EmbeddingModel};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default timeout for embedding requests
pub const DEFAULT_EMBED_TIMEOUT_SECS: u64 = 30;

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embedding: Vec<f32>,
}

/// Embedding model served by Ollama
///
/// The dimension is fixed at construction and every returned vector is
/// checked against it.
#[derive(Debug, Clone)]
pub struct OllamaEmbedder {
    endpoint: String,
    model: String,
    dimension: usize,
    client: reqwest::blocking::Client,
    retry: RetryPolicy,
}

impl OllamaEmbedder {
    /// Create an embedder for `model` producing `dimension`-sized vectors
    pub fn new(
        endpoint: impl Into<String>,
        model: impl Into<String>,
        dimension: usize,
    ) -> Result<Self, LlmError> {
        Ok(Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            model: model.into(),
            dimension,
            client: build_client(Duration::from_secs(DEFAULT_EMBED_TIMEOUT_SECS))?,
            retry: RetryPolicy::default(),
        })
    }

    /// Create an embedder against `http://localhost:11434`
    pub fn default_endpoint(model: impl Into<String>, dimension: usize) -> Result<Self, LlmError> {
        Self::new(DEFAULT_ENDPOINT, model, dimension)
    }

    /// Set the retry policy
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn embed_once(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        let url = format!("{}/api/embeddings", self.endpoint);
        let response = self
            .client
            .post(&url)
            .json(&EmbedRequest {
                model: &self.model,
                prompt: text,
            })
            .send()?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(status_error(status, &self.model, body));
        }

        let parsed: EmbedResponse = response
            .json()
            .map_err(|e| LlmError::InvalidResponse(format!("Failed to parse embedding: {}", e)))?;
        Ok(parsed.embedding)
    }
}

impl EmbeddingModel for OllamaEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if text.trim().is_empty() {
            return Err(EmbeddingError::InvalidInput(
                "Empty text cannot be embedded".to_string(),
            ));
        }

        let embedding = self
            .retry
            .run("ollama embed", |_| self.embed_once(text))
            .map_err(|e| EmbeddingError::InferenceFailed(e.to_string()))?;

        if embedding.len() != self.dimension {
            return Err(EmbeddingError::DimensionMismatch {
                expected: self.dimension,
                actual: embedding.len(),
            });
        }
        Ok(embedding)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedder_rejects_empty_text() {
        let embedder = OllamaEmbedder::default_endpoint("nomic-embed-text", 768).unwrap();
        assert_eq!(embedder.dimension(), 768);
        assert!(matches!(
            embedder.embed("   "),
            Err(EmbeddingError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_embedder_unreachable_backend() {
        let embedder = OllamaEmbedder::new("http://127.0.0.1:1", "m", 8)
            .unwrap()
            .with_retry(RetryPolicy::none());
        assert!(matches!(
            embedder.embed("نص"),
            Err(EmbeddingError::InferenceFailed(_))
        ));
    }
}
