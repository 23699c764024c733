//! Ollama Provider Implementation
//!
//! Text generation through a local Ollama instance (`POST /api/generate`).
//!
//! # Features
//!
//! - Blocking HTTP, meant to run on a blocking thread
//! - Configurable endpoint, model and timeout
//! - Retry with exponential backoff on transient failures
//! - `num_predict` bounded by the caller's `max_tokens`
//!
//! # Examples
//!
//! ```no_run
//! use finrules_llm::OllamaProvider;
//! use finrules_domain::traits::LlmProvider;
//!
//! let provider = OllamaProvider::new("http://localhost:11434", "qwen2.5")?;
//! let reply = provider.generate("قل مرحبا", 20)?;
//! # Ok::<(), finrules_llm::LlmError>(())
//! ```

use crate::retry::RetryPolicy;
use crate::LlmError;
use finrules_domain::traits::LlmProvider as LlmProviderTrait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Default Ollama API endpoint
pub const DEFAULT_ENDPOINT: &str = "http://localhost:11434";

/// Default timeout for LLM requests (60 seconds)
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Ollama API provider for local LLM inference
#[derive(Debug, Clone)]
pub struct OllamaProvider {
    endpoint: String,
    model: String,
    client: reqwest::blocking::Client,
    timeout: Duration,
    retry: RetryPolicy,
}

/// Request body for Ollama generate API
#[derive(Serialize)]
struct OllamaGenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Serialize)]
struct GenerateOptions {
    num_predict: usize,
    temperature: f32,
}

/// Response from Ollama generate API
#[derive(Deserialize)]
struct OllamaGenerateResponse {
    response: String,
}

/// Build a blocking client with the given timeout
pub(crate) fn build_client(timeout: Duration) -> Result<reqwest::blocking::Client, LlmError> {
    reqwest::blocking::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| LlmError::Other(format!("Failed to build HTTP client: {}", e)))
}

/// Map a non-success HTTP status to an error
pub(crate) fn status_error(status: reqwest::StatusCode, model: &str, body: String) -> LlmError {
    if status == reqwest::StatusCode::NOT_FOUND {
        LlmError::ModelNotAvailable(model.to_string())
    } else if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        LlmError::RateLimitExceeded
    } else if status.is_server_error() {
        LlmError::Communication(format!("HTTP {}: {}", status, body))
    } else {
        LlmError::InvalidResponse(format!("HTTP {}: {}", status, body))
    }
}

impl OllamaProvider {
    /// Create a new Ollama provider
    ///
    /// # Parameters
    ///
    /// - `endpoint`: Ollama API endpoint (e.g., "http://localhost:11434")
    /// - `model`: Model to use (e.g., "qwen2.5", "llama3")
    pub fn new(endpoint: impl Into<String>, model: impl Into<String>) -> Result<Self, LlmError> {
        Ok(Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            model: model.into(),
            client: build_client(Duration::from_secs(DEFAULT_TIMEOUT_SECS))?,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            retry: RetryPolicy::default(),
        })
    }

    /// Create a provider against `http://localhost:11434`
    pub fn default_endpoint(model: impl Into<String>) -> Result<Self, LlmError> {
        Self::new(DEFAULT_ENDPOINT, model)
    }

    /// Set the per-request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self, LlmError> {
        self.client = build_client(timeout)?;
        self.timeout = timeout;
        Ok(self)
    }

    /// Set the retry policy
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Set the maximum number of attempts
    pub fn with_max_retries(mut self, max_attempts: u32) -> Self {
        self.retry = self.retry.with_max_attempts(max_attempts);
        self
    }

    /// Configured model name
    pub fn model(&self) -> &str {
        &self.model
    }

    fn generate_once(&self, prompt: &str, max_tokens: usize) -> Result<String, LlmError> {
        let url = format!("{}/api/generate", self.endpoint);
        let body = OllamaGenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            options: GenerateOptions {
                num_predict: max_tokens,
                temperature: 0.1,
            },
        };

        let response = self.client.post(&url).json(&body).send()?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().unwrap_or_else(|_| "Unknown error".to_string());
            return Err(status_error(status, &self.model, text));
        }

        let parsed: OllamaGenerateResponse = response
            .json()
            .map_err(|e| LlmError::InvalidResponse(format!("Failed to parse response: {}", e)))?;
        Ok(parsed.response)
    }
}

impl LlmProviderTrait for OllamaProvider {
    type Error = LlmError;

    fn generate(&self, prompt: &str, max_tokens: usize) -> Result<String, Self::Error> {
        debug!(
            "Ollama generate: model={}, prompt_chars={}, max_tokens={}",
            self.model,
            prompt.chars().count(),
            max_tokens
        );
        self.retry
            .run("ollama generate", |_| self.generate_once(prompt, max_tokens))
    }

    fn call_budget(&self, per_attempt: Duration) -> Duration {
        // Each request is cut off by the client at `self.timeout`
        self.retry.budget(self.timeout.max(per_attempt))
    }
}
