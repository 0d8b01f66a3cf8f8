//! Mock LLM client for tests: preconfigured responses, call recording.

use super::{Completion, CompletionRequest, LlmClient, LlmError, Usage, VisionRequest};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

enum Scripted {
    Text(String),
    Error(fn(&str) -> LlmError),
}

/// Mock client that replays a scripted queue of responses.
///
/// Responses are consumed in order; once the queue drains, every further
/// call returns the fallback text (or a transport error if none was set).
pub struct MockLlm {
    name: String,
    queue: Mutex<VecDeque<Scripted>>,
    fallback: Option<String>,
    calls: AtomicUsize,
    /// Prompts seen by `complete`, for assertions on the prompting contract.
    prompts: Mutex<Vec<String>>,
}

impl MockLlm {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            queue: Mutex::new(VecDeque::new()),
            fallback: None,
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Queue a successful text response.
    pub fn push_text(self, text: impl Into<String>) -> Self {
        self.queue
            .lock()
            .unwrap()
            .push_back(Scripted::Text(text.into()));
        self
    }

    /// Queue a rate-limit error.
    pub fn push_rate_limited(self) -> Self {
        self.queue
            .lock()
            .unwrap()
            .push_back(Scripted::Error(|name| LlmError::RateLimited(name.to_string())));
        self
    }

    /// Queue a timeout error.
    pub fn push_timeout(self) -> Self {
        self.queue
            .lock()
            .unwrap()
            .push_back(Scripted::Error(|_| LlmError::Timeout(30)));
        self
    }

    /// Every call after the queue drains returns this text.
    pub fn with_fallback(mut self, text: impl Into<String>) -> Self {
        self.fallback = Some(text.into());
        self
    }

    /// Number of calls made (text + vision).
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Prompts recorded from `complete` calls, concatenated per call.
    pub fn recorded_prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    fn next(&self) -> Result<Completion, LlmError> {
        let scripted = self.queue.lock().unwrap().pop_front();
        match scripted {
            Some(Scripted::Text(text)) => Ok(completion(text)),
            Some(Scripted::Error(make)) => Err(make(&self.name)),
            None => match &self.fallback {
                Some(text) => Ok(completion(text.clone())),
                None => Err(LlmError::Transport(format!(
                    "mock '{}' has no scripted response left",
                    self.name
                ))),
            },
        }
    }
}

fn completion(text: String) -> Completion {
    let tokens_out = (text.len() / 4) as u64;
    Completion {
        text,
        usage: Usage {
            tokens_in: 100,
            tokens_out,
            usd: 0.0001,
        },
    }
}

#[async_trait]
impl LlmClient for MockLlm {
    fn provider(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: CompletionRequest) -> Result<Completion, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let joined = request
            .messages
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        self.prompts.lock().unwrap().push(joined);
        self.next()
    }

    async fn vision_complete(&self, _request: VisionRequest) -> Result<Completion, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.next()
    }
}
