//! Finrules LLM Provider Layer
//!
//! Pluggable generation and embedding backends behind the `LlmProvider` and
//! `EmbeddingModel` traits from `finrules-domain`.
//!
//! # Providers
//!
//! - `MockProvider`: Scripted replies for testing
//! - `UnavailableProvider`: A backend that is never there (degraded mode)
//! - `OllamaProvider`: Local Ollama `/api/generate`
//! - `OllamaEmbedder`: Local Ollama `/api/embeddings`
//!
//! All network calls are blocking and wrapped in a [`RetryPolicy`].
//!
//! # Examples
//!
//! ```
//! use finrules_llm::MockProvider;
//! use finrules_domain::traits::LlmProvider;
//!
//! let provider = MockProvider::new("Hello from LLM!");
//! let result = provider.generate("test prompt", 100).unwrap();
//! assert_eq!(result, "Hello from LLM!");
//! ```

#![warn(missing_docs)]

pub mod embedder;
pub mod ollama;
pub mod retry;

use finrules_domain::traits::LlmProvider as LlmProviderTrait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use thiserror::Error;

pub use embedder::OllamaEmbedder;
pub use ollama::OllamaProvider;
pub use retry::{RetryPolicy, Transient};

/// Errors that can occur during LLM operations
#[derive(Error, Debug)]
pub enum LlmError {
    /// Network or API communication error
    #[error("Communication error: {0}")]
    Communication(String),

    /// Request exceeded its deadline
    #[error("Request timed out: {0}")]
    Timeout(String),

    /// Invalid response from LLM
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Rate limit exceeded
    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    /// Model not available
    #[error("Model not available: {0}")]
    ModelNotAvailable(String),

    /// No backend configured
    #[error("LLM backend unavailable")]
    Unavailable,

    /// Generic error
    #[error("LLM error: {0}")]
    Other(String),
}

impl Transient for LlmError {
    fn is_transient(&self) -> bool {
        matches!(
            self,
            LlmError::Communication(_) | LlmError::Timeout(_) | LlmError::RateLimitExceeded
        )
    }
}

impl From<reqwest::Error> for LlmError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            LlmError::Timeout(e.to_string())
        } else if e.is_decode() {
            LlmError::InvalidResponse(e.to_string())
        } else {
            LlmError::Communication(e.to_string())
        }
    }
}

#[derive(Debug, Clone)]
enum Reply {
    Text(String),
    Error,
}

/// Mock LLM provider for deterministic testing
///
/// Replies are chosen in this order: the next queued reply, the first rule
/// whose trigger appears in the prompt, then the default reply. Clones share
/// state, so a test can keep a handle after moving the provider into a
/// pipeline.
///
/// # Examples
///
/// ```
/// use finrules_llm::MockProvider;
/// use finrules_domain::traits::LlmProvider;
///
/// let provider = MockProvider::default();
/// provider.add_response("classify", r#"{"track_id": "none"}"#);
/// provider.push_reply("first");
///
/// assert_eq!(provider.generate("anything", 10).unwrap(), "first");
/// assert_eq!(provider.generate("please classify", 10).unwrap(), r#"{"track_id": "none"}"#);
/// assert_eq!(provider.call_count(), 2);
/// ```
#[derive(Debug, Clone)]
pub struct MockProvider {
    default_reply: Arc<Mutex<Reply>>,
    rules: Arc<Mutex<Vec<(String, Reply)>>>,
    queue: Arc<Mutex<VecDeque<Reply>>>,
    prompts: Arc<Mutex<Vec<String>>>,
}

impl MockProvider {
    /// Create a new MockProvider with a fixed response for all prompts
    pub fn new(response: impl Into<String>) -> Self {
        Self {
            default_reply: Arc::new(Mutex::new(Reply::Text(response.into()))),
            rules: Arc::new(Mutex::new(Vec::new())),
            queue: Arc::new(Mutex::new(VecDeque::new())),
            prompts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// A provider that fails every call not otherwise scripted
    pub fn failing() -> Self {
        let provider = Self::default();
        if let Ok(mut reply) = provider.default_reply.lock() {
            *reply = Reply::Error;
        }
        provider
    }

    /// Reply with `response` whenever the prompt contains `trigger`
    pub fn add_response(&self, trigger: impl Into<String>, response: impl Into<String>) {
        if let Ok(mut rules) = self.rules.lock() {
            rules.push((trigger.into(), Reply::Text(response.into())));
        }
    }

    /// Fail whenever the prompt contains `trigger`
    pub fn add_error(&self, trigger: impl Into<String>) {
        if let Ok(mut rules) = self.rules.lock() {
            rules.push((trigger.into(), Reply::Error));
        }
    }

    /// Queue a one-shot reply, consumed before any rule
    pub fn push_reply(&self, response: impl Into<String>) {
        if let Ok(mut queue) = self.queue.lock() {
            queue.push_back(Reply::Text(response.into()));
        }
    }

    /// Queue a one-shot failure
    pub fn push_error(&self) {
        if let Ok(mut queue) = self.queue.lock() {
            queue.push_back(Reply::Error);
        }
    }

    /// Get the number of times generate was called
    pub fn call_count(&self) -> usize {
        self.prompts.lock().map(|p| p.len()).unwrap_or(0)
    }

    /// Prompts received so far, oldest first
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }

    /// Forget recorded prompts
    pub fn reset_call_count(&self) {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.clear();
        }
    }

    fn lock_err<T>(_: T) -> LlmError {
        LlmError::Other("mock state poisoned".to_string())
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new("Default mock response")
    }
}

impl LlmProviderTrait for MockProvider {
    type Error = LlmError;

    fn generate(&self, prompt: &str, _max_tokens: usize) -> Result<String, Self::Error> {
        self.prompts
            .lock()
            .map_err(Self::lock_err)?
            .push(prompt.to_string());

        let queued = self.queue.lock().map_err(Self::lock_err)?.pop_front();
        let reply = match queued {
            Some(reply) => reply,
            None => {
                let rules = self.rules.lock().map_err(Self::lock_err)?;
                match rules.iter().find(|(trigger, _)| prompt.contains(trigger.as_str())) {
                    Some((_, reply)) => reply.clone(),
                    None => self.default_reply.lock().map_err(Self::lock_err)?.clone(),
                }
            }
        };

        match reply {
            Reply::Text(text) => Ok(text),
            Reply::Error => Err(LlmError::Other("Mock error".to_string())),
        }
    }
}

/// A provider that is never available
///
/// Forces every caller onto its fallback path.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableProvider;

impl LlmProviderTrait for UnavailableProvider {
    type Error = LlmError;

    fn generate(&self, _prompt: &str, _max_tokens: usize) -> Result<String, Self::Error> {
        Err(LlmError::Unavailable)
    }

    fn is_available(&self) -> bool {
        false
    }
}
