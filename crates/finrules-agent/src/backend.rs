//! Model backend selection

use finrules_domain::traits::{EmbeddingModel, LlmProvider};
use finrules_llm::{LlmError, OllamaEmbedder, OllamaProvider, UnavailableProvider};
use finrules_store::HashEmbeddingModel;
use std::time::Duration;
use tracing::{info, warn};

/// Generation backend chosen at startup
#[derive(Debug, Clone)]
pub enum Backend {
    /// Local Ollama model
    Ollama(OllamaProvider),
    /// No model configured; every caller uses its fallback
    Offline(UnavailableProvider),
}

impl Backend {
    /// Ollama when `model` is set, offline otherwise
    pub fn select(host: &str, model: Option<&str>, timeout: Duration) -> Result<Self, LlmError> {
        match model {
            Some(model) => {
                info!("Using Ollama model '{}' at {}", model, host);
                Ok(Backend::Ollama(OllamaProvider::new(host, model)?.with_timeout(timeout)?))
            }
            None => {
                warn!("No LLM model configured, running with pattern extraction and keyword mapping");
                Ok(Backend::Offline(UnavailableProvider))
            }
        }
    }
}

impl LlmProvider for Backend {
    type Error = LlmError;

    fn generate(&self, prompt: &str, max_tokens: usize) -> Result<String, Self::Error> {
        match self {
            Backend::Ollama(provider) => provider.generate(prompt, max_tokens),
            Backend::Offline(provider) => provider.generate(prompt, max_tokens),
        }
    }

    fn is_available(&self) -> bool {
        match self {
            Backend::Ollama(provider) => provider.is_available(),
            Backend::Offline(provider) => provider.is_available(),
        }
    }

    fn call_budget(&self, per_attempt: Duration) -> Duration {
        match self {
            Backend::Ollama(provider) => provider.call_budget(per_attempt),
            Backend::Offline(provider) => provider.call_budget(per_attempt),
        }
    }
}

/// Ollama embeddings when `model` is set, hashed embeddings otherwise
pub fn select_embedder(
    host: &str,
    model: Option<&str>,
    dimension: usize,
) -> Result<Box<dyn EmbeddingModel>, LlmError> {
    match model {
        Some(model) => {
            info!("Using Ollama embedding model '{}' ({} dims)", model, dimension);
            Ok(Box::new(OllamaEmbedder::new(host, model, dimension)?))
        }
        None => {
            info!("No embedding model configured, using hashed embeddings");
            Ok(Box::new(HashEmbeddingModel::new(dimension)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offline_without_model() {
        let backend = Backend::select("http://localhost:11434", None, Duration::from_secs(5)).unwrap();
        assert!(matches!(backend, Backend::Offline(_)));
        assert!(!backend.is_available());
        assert!(matches!(backend.generate("x", 10), Err(LlmError::Unavailable)));
    }

    #[test]
    fn test_ollama_with_model() {
        let backend = Backend::select("http://localhost:11434", Some("qwen2.5"), Duration::from_secs(5)).unwrap();
        match &backend {
            Backend::Ollama(provider) => assert_eq!(provider.model(), "qwen2.5"),
            Backend::Offline(_) => panic!("expected an Ollama backend"),
        }
        assert!(backend.is_available());
    }

    #[test]
    fn test_hashed_embedder_dimension() {
        let embedder = select_embedder("http://localhost:11434", None, 384).unwrap();
        assert_eq!(embedder.dimension(), 384);
        assert_eq!(embedder.embed("راتب").unwrap().len(), 384);
    }
}
