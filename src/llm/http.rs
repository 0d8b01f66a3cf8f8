//! HTTP adapter for OpenAI-compatible chat-completions endpoints.
//!
//! Groq, OpenAI, Google (via their compatibility layer), and most local
//! gateways speak this wire format, so one adapter covers the whole chain;
//! providers differ only in base URL, key, and model names.

use super::{Completion, CompletionRequest, LlmClient, LlmError, Usage, VisionRequest};
use async_trait::async_trait;
use base64::Engine;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

/// OpenAI-compatible chat-completions client.
pub struct ChatCompletionsClient {
    provider: String,
    base_url: String,
    api_key: String,
    http: reqwest::Client,
    usd_per_1k_in: f64,
    usd_per_1k_out: f64,
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    choices: Vec<WireChoice>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct WireChoice {
    message: WireMessage,
}

#[derive(Debug, Deserialize)]
struct WireMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct WireUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

impl ChatCompletionsClient {
    pub fn new(
        provider: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            provider: provider.into(),
            base_url: base_url.into(),
            api_key: api_key.into(),
            http: reqwest::Client::new(),
            usd_per_1k_in: 0.0,
            usd_per_1k_out: 0.0,
        }
    }

    /// Attach per-1K-token pricing for cost records.
    pub fn with_pricing(mut self, usd_per_1k_in: f64, usd_per_1k_out: f64) -> Self {
        self.usd_per_1k_in = usd_per_1k_in;
        self.usd_per_1k_out = usd_per_1k_out;
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    fn classify_status(&self, status: reqwest::StatusCode, body: &str) -> LlmError {
        match status.as_u16() {
            429 => LlmError::RateLimited(self.provider.clone()),
            402 | 403 if body.contains("quota") => LlmError::Quota(self.provider.clone()),
            _ => LlmError::Transport(format!("{}: HTTP {} {}", self.provider, status, body)),
        }
    }

    async fn send(&self, body: serde_json::Value) -> Result<Completion, LlmError> {
        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .timeout(Duration::from_secs(120))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout(120)
                } else {
                    LlmError::Transport(format!("{}: {}", self.provider, e))
                }
            })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| LlmError::Transport(format!("{}: {}", self.provider, e)))?;

        if !status.is_success() {
            return Err(self.classify_status(status, &text));
        }

        let wire: WireResponse = serde_json::from_str(&text)
            .map_err(|e| LlmError::InvalidResponse(format!("{}: {}", self.provider, e)))?;
        let content = wire
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .ok_or_else(|| LlmError::InvalidResponse("empty choices".into()))?;

        let usage = wire.usage.unwrap_or_default();
        let usd = usage.prompt_tokens as f64 / 1000.0 * self.usd_per_1k_in
            + usage.completion_tokens as f64 / 1000.0 * self.usd_per_1k_out;

        Ok(Completion {
            text: content,
            usage: Usage {
                tokens_in: usage.prompt_tokens,
                tokens_out: usage.completion_tokens,
                usd,
            },
        })
    }
}

#[async_trait]
impl LlmClient for ChatCompletionsClient {
    fn provider(&self) -> &str {
        &self.provider
    }

    async fn complete(&self, request: CompletionRequest) -> Result<Completion, LlmError> {
        tracing::debug!(
            provider = %self.provider,
            model = %request.model,
            messages = request.messages.len(),
            "llm complete"
        );
        self.send(json!({
            "model": request.model,
            "messages": request.messages,
            "temperature": request.temperature,
            "max_tokens": request.max_tokens,
        }))
        .await
    }

    async fn vision_complete(&self, request: VisionRequest) -> Result<Completion, LlmError> {
        let mut content = vec![json!({"type": "text", "text": request.prompt})];
        for image in &request.images {
            let encoded = base64::engine::general_purpose::STANDARD.encode(image);
            content.push(json!({
                "type": "image_url",
                "image_url": {"url": format!("data:image/png;base64,{}", encoded)},
            }));
        }
        tracing::debug!(
            provider = %self.provider,
            model = %request.model,
            images = request.images.len(),
            "llm vision complete"
        );
        self.send(json!({
            "model": request.model,
            "messages": [{"role": "user", "content": content}],
            "max_tokens": request.max_tokens,
        }))
        .await
    }
}
