//! Provider fallback chain.
//!
//! Tries providers in configured order (cheap-fast first). Rate limits,
//! timeouts, quota errors, and transport failures advance to the next
//! provider; invalid responses surface to the caller, which owns the
//! stricter re-ask. Each provider carries its own semaphore so the chain
//! stays under per-provider rate limits regardless of worker count.

use super::{
    ChatMessage, Completion, CompletionRequest, CostRecord, LlmClient, LlmError, VisionRequest,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

struct Slot {
    client: Arc<dyn LlmClient>,
    model: String,
    limiter: Arc<Semaphore>,
}

/// Ordered chain of LLM providers with per-call timeout and budget check.
pub struct FallbackChain {
    slots: Vec<Slot>,
    timeout: Duration,
    /// Per-document spend ceiling in USD; `None` disables the check.
    cost_budget_usd: Option<f64>,
}

impl FallbackChain {
    pub fn new(timeout_s: u64) -> Self {
        Self {
            slots: Vec::new(),
            timeout: Duration::from_secs(timeout_s),
            cost_budget_usd: None,
        }
    }

    /// Build a chain from configured provider slots, in order.
    ///
    /// `make_client` supplies the transport per provider; endpoints and
    /// API keys live with the caller, not in the pipeline config.
    pub fn from_slots(
        slots: &[crate::config::ProviderSlot],
        timeout_s: u64,
        cost_budget_usd: Option<f64>,
        mut make_client: impl FnMut(&crate::config::ProviderSlot) -> Arc<dyn LlmClient>,
    ) -> Self {
        let mut chain = Self::new(timeout_s).with_budget(cost_budget_usd);
        for slot in slots {
            let client = make_client(slot);
            chain.push(client, slot.model.clone(), slot.concurrency);
        }
        chain
    }

    pub fn with_budget(mut self, usd: Option<f64>) -> Self {
        self.cost_budget_usd = usd;
        self
    }

    /// Append a provider. Order of calls is fallback order.
    pub fn push(
        &mut self,
        client: Arc<dyn LlmClient>,
        model: impl Into<String>,
        concurrency: usize,
    ) {
        self.slots.push(Slot {
            client,
            model: model.into(),
            limiter: Arc::new(Semaphore::new(concurrency.max(1))),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    fn check_budget(&self, spent_usd: f64) -> Result<(), LlmError> {
        if let Some(budget) = self.cost_budget_usd {
            if spent_usd >= budget {
                return Err(LlmError::BudgetExceeded {
                    spent: spent_usd,
                    budget,
                });
            }
        }
        Ok(())
    }

    /// Run a text completion through the chain.
    ///
    /// `spent_usd` is the document's LLM spend so far; the budget check runs
    /// before every attempt so a runaway document stops between providers.
    pub async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        max_tokens: u32,
        spent_usd: f64,
    ) -> Result<(Completion, CostRecord), LlmError> {
        if self.slots.is_empty() {
            return Err(LlmError::ChainExhausted("no providers configured".into()));
        }

        let mut last_error = String::new();
        for slot in &self.slots {
            self.check_budget(spent_usd)?;

            // Closed semaphores don't occur here; holders release on drop.
            let _permit = slot
                .limiter
                .acquire()
                .await
                .map_err(|e| LlmError::Transport(format!("semaphore closed: {e}")))?;

            let mut request = CompletionRequest::new(slot.model.clone(), messages.clone());
            request.max_tokens = max_tokens;
            request_span(slot, "complete");
            match tokio::time::timeout(self.timeout, slot.client.complete(request)).await {
                Ok(Ok(completion)) => {
                    return Ok(record(slot, completion));
                }
                Ok(Err(e)) if e.is_retryable() => {
                    warn!(provider = slot.client.provider(), error = %e, "provider failed, falling back");
                    last_error = e.to_string();
                }
                Ok(Err(e)) => return Err(e),
                Err(_) => {
                    warn!(provider = slot.client.provider(), "provider timed out, falling back");
                    last_error = LlmError::Timeout(self.timeout.as_secs()).to_string();
                }
            }
        }
        Err(LlmError::ChainExhausted(last_error))
    }

    /// Run a vision completion through the chain.
    pub async fn vision_complete(
        &self,
        images: Vec<Vec<u8>>,
        prompt: impl Into<String>,
        max_tokens: u32,
        spent_usd: f64,
    ) -> Result<(Completion, CostRecord), LlmError> {
        if self.slots.is_empty() {
            return Err(LlmError::ChainExhausted("no providers configured".into()));
        }

        let prompt = prompt.into();
        let mut last_error = String::new();
        for slot in &self.slots {
            self.check_budget(spent_usd)?;

            let _permit = slot
                .limiter
                .acquire()
                .await
                .map_err(|e| LlmError::Transport(format!("semaphore closed: {e}")))?;

            let request = VisionRequest {
                model: slot.model.clone(),
                images: images.clone(),
                prompt: prompt.clone(),
                max_tokens,
            };
            request_span(slot, "vision");
            match tokio::time::timeout(self.timeout, slot.client.vision_complete(request)).await {
                Ok(Ok(completion)) => return Ok(record(slot, completion)),
                Ok(Err(e)) if e.is_retryable() => {
                    warn!(provider = slot.client.provider(), error = %e, "provider failed, falling back");
                    last_error = e.to_string();
                }
                Ok(Err(e)) => return Err(e),
                Err(_) => {
                    last_error = LlmError::Timeout(self.timeout.as_secs()).to_string();
                }
            }
        }
        Err(LlmError::ChainExhausted(last_error))
    }
}

fn request_span(slot: &Slot, kind: &str) {
    debug!(
        provider = slot.client.provider(),
        model = %slot.model,
        kind,
        "llm call"
    );
}

fn record(slot: &Slot, completion: Completion) -> (Completion, CostRecord) {
    let cost = CostRecord {
        provider: slot.client.provider().to_string(),
        model: slot.model.clone(),
        tokens_in: completion.usage.tokens_in,
        tokens_out: completion.usage.tokens_out,
        usd: completion.usage.usd,
    };
    (completion, cost)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlm;

    fn chain_of(clients: Vec<Arc<dyn LlmClient>>) -> FallbackChain {
        let mut chain = FallbackChain::new(5);
        for client in clients {
            chain.push(client, "test-model", 2);
        }
        chain
    }

    #[tokio::test]
    async fn first_provider_wins_when_healthy() {
        let primary = Arc::new(MockLlm::new("groq").push_text("from groq"));
        let backup = Arc::new(MockLlm::new("anthropic").push_text("from anthropic"));
        let chain = chain_of(vec![primary, backup.clone()]);

        let (completion, cost) = chain
            .complete(vec![ChatMessage::user("hi")], 256, 0.0)
            .await
            .unwrap();
        assert_eq!(completion.text, "from groq");
        assert_eq!(cost.provider, "groq");
        assert_eq!(backup.call_count(), 0);
    }

    #[tokio::test]
    async fn rate_limit_falls_through_to_next() {
        let primary = Arc::new(MockLlm::new("groq").push_rate_limited());
        let backup = Arc::new(MockLlm::new("anthropic").push_text("rescued"));
        let chain = chain_of(vec![primary, backup]);

        let (completion, cost) = chain
            .complete(vec![ChatMessage::user("hi")], 256, 0.0)
            .await
            .unwrap();
        assert_eq!(completion.text, "rescued");
        assert_eq!(cost.provider, "anthropic");
    }

    #[tokio::test]
    async fn invalid_response_does_not_fall_through() {
        let primary = Arc::new(MockLlm::new("groq"));
        let backup = Arc::new(MockLlm::new("anthropic").push_text("never"));
        // Empty mock with no fallback returns Transport; force invalid instead.
        let mut chain = FallbackChain::new(5);
        struct Invalid;
        #[async_trait::async_trait]
        impl LlmClient for Invalid {
            fn provider(&self) -> &str {
                "invalid"
            }
            async fn complete(
                &self,
                _request: CompletionRequest,
            ) -> Result<Completion, LlmError> {
                Err(LlmError::InvalidResponse("garbage".into()))
            }
            async fn vision_complete(
                &self,
                _request: VisionRequest,
            ) -> Result<Completion, LlmError> {
                Err(LlmError::InvalidResponse("garbage".into()))
            }
        }
        chain.push(Arc::new(Invalid), "m", 1);
        chain.push(backup.clone(), "m", 1);
        let _ = primary;

        let err = chain
            .complete(vec![ChatMessage::user("hi")], 256, 0.0)
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::InvalidResponse(_)));
        assert_eq!(backup.call_count(), 0);
    }

    #[tokio::test]
    async fn exhausted_chain_reports_last_error() {
        let a = Arc::new(MockLlm::new("a").push_rate_limited());
        let b = Arc::new(MockLlm::new("b").push_timeout());
        let chain = chain_of(vec![a, b]);

        let err = chain
            .complete(vec![ChatMessage::user("hi")], 256, 0.0)
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::ChainExhausted(_)));
    }

    #[tokio::test]
    async fn budget_check_blocks_before_any_call() {
        let primary = Arc::new(MockLlm::new("groq").push_text("unreachable"));
        let chain = chain_of(vec![primary.clone()]).with_budget(Some(0.50));

        let err = chain
            .complete(vec![ChatMessage::user("hi")], 256, 0.75)
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::BudgetExceeded { .. }));
        assert_eq!(primary.call_count(), 0);
    }
}
