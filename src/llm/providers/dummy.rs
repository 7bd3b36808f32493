//! Dummy LLM provider: echoes the latest user message back prefixed with `[echo]`.
//!
//! Used for keyless local runs and as a recording stand-in for real adapters
//! in tests: every call is captured and can be inspected with [`DummyProvider::calls`].

use std::sync::{Arc, Mutex};

use crate::llm::{Completion, Message, ProviderError, Role, UsageStats};

/// One captured `complete` invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub model: String,
    pub messages: Vec<Message>,
}

#[derive(Debug, Clone, Default)]
pub struct DummyProvider {
    calls: Arc<Mutex<Vec<RecordedCall>>>,
    fail_with: Option<String>,
}

impl DummyProvider {
    /// A provider whose every call fails with a transport error carrying `message`.
    pub fn failing(message: impl Into<String>) -> Self {
        Self { fail_with: Some(message.into()), ..Self::default() }
    }

    pub async fn complete(&self, messages: &[Message], model: &str) -> Result<Completion, ProviderError> {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(RecordedCall { model: model.to_string(), messages: messages.to_vec() });

        if let Some(msg) = &self.fail_with {
            return Err(ProviderError::Request(msg.clone()));
        }

        let last_user = messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .unwrap_or_default();
        let text = format!("[echo] {last_user}");

        let prompt_tokens = messages.iter().map(|m| word_count(&m.content)).sum();
        let completion_tokens = word_count(&text);
        Ok(Completion {
            text,
            usage: Some(UsageStats {
                model: model.to_string(),
                prompt_tokens,
                completion_tokens,
                total_tokens: prompt_tokens + completion_tokens,
            }),
        })
    }

    /// Snapshot of every call made so far, oldest first.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

fn word_count(s: &str) -> u64 {
    s.split_whitespace().count() as u64
}
