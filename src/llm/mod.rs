//! LLM client seam
//!
//! The pipeline is provider-agnostic: it talks to `LlmClient` trait objects.
//! Three implementations ship here:
//! - `ChatCompletionsClient`: HTTP adapter for OpenAI-compatible endpoints
//! - `FallbackChain`: iterates a configured provider chain, cheap-fast first
//! - `MockLlm`: preconfigured responses for tests

mod fallback;
mod http;
mod mock;

pub use fallback::FallbackChain;
pub use http::ChatCompletionsClient;
pub use mock::MockLlm;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A single message in a completion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// "system", "user", or "assistant".
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".into(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }
}

/// Text completion request.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl CompletionRequest {
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            temperature: 0.1,
            max_tokens: 2048,
        }
    }
}

/// Vision completion request: images plus a prompt.
#[derive(Debug, Clone)]
pub struct VisionRequest {
    pub model: String,
    /// Raw image bytes, one entry per page/image.
    pub images: Vec<Vec<u8>>,
    pub prompt: String,
    pub max_tokens: u32,
}

/// Token usage and cost for one call.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Usage {
    pub tokens_in: u64,
    pub tokens_out: u64,
    pub usd: f64,
}

/// One LLM call on the ledger: who was called and what it cost.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostRecord {
    pub provider: String,
    pub model: String,
    pub tokens_in: u64,
    pub tokens_out: u64,
    pub usd: f64,
}

/// A completed LLM call.
#[derive(Debug, Clone)]
pub struct Completion {
    pub text: String,
    pub usage: Usage,
}

/// Errors from LLM calls.
///
/// The first three variants trigger provider fallback; `InvalidResponse`
/// triggers a single stricter re-ask at the enrichment layer.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("rate limited by {0}")]
    RateLimited(String),

    #[error("call timed out after {0}s")]
    Timeout(u64),

    #[error("quota exhausted for {0}")]
    Quota(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("all providers in the chain failed; last: {0}")]
    ChainExhausted(String),

    #[error("per-document cost budget exceeded (${spent:.4} >= ${budget:.4})")]
    BudgetExceeded { spent: f64, budget: f64 },
}

impl LlmError {
    /// Whether the next provider in the chain should be tried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LlmError::RateLimited(_)
                | LlmError::Timeout(_)
                | LlmError::Quota(_)
                | LlmError::Transport(_)
        )
    }
}

/// Provider-agnostic LLM client.
///
/// Implementations must be cheap to share behind `Arc`.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Stable provider name for cost records and logs.
    fn provider(&self) -> &str;

    /// Run a text completion.
    async fn complete(&self, request: CompletionRequest) -> Result<Completion, LlmError>;

    /// Run a vision completion over one or more images.
    async fn vision_complete(&self, request: VisionRequest) -> Result<Completion, LlmError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(LlmError::RateLimited("groq".into()).is_retryable());
        assert!(LlmError::Timeout(30).is_retryable());
        assert!(LlmError::Quota("openai".into()).is_retryable());
        assert!(!LlmError::InvalidResponse("not json".into()).is_retryable());
        assert!(!LlmError::BudgetExceeded { spent: 1.0, budget: 0.5 }.is_retryable());
    }
}
