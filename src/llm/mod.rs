//! LLM provider abstraction.
//!
//! `LlmProvider` is an enum over concrete provider implementations; each
//! variant speaks its own wire schema but every one answers with the same
//! [`Completion`] shape. Which variant serves a model is decided by the
//! [`registry::ProviderRegistry`] routing table.
//!
//! Provider instances are shared immutable capabilities: clone them freely.

pub mod providers;
pub mod registry;

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::health::Readiness;

// ── Error ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("no provider registered for adapter kind: {0}")]
    UnknownProvider(String),
    #[error("API key not found. Please set {0}")]
    MissingCredential(String),
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },
    #[error("provider request failed: {0}")]
    Request(String),
}

// ── Messages ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One conversation turn. Never mutated after construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self { role, content: content.into() }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

// ── Responses ─────────────────────────────────────────────────────────────────

/// Token accounting attached to a chat reply. Reporting only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageStats {
    pub model: String,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

/// Normalised result of one provider round-trip.
#[derive(Debug, Clone)]
pub struct Completion {
    pub text: String,
    /// `None` when the backend omits usage data.
    pub usage: Option<UsageStats>,
}

// ── Adapter kinds ─────────────────────────────────────────────────────────────

/// Closed set of wire schemas a model can be routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdapterKind {
    /// Chat-completions API: full role set, fixed sampling parameters.
    ChatCompletions,
    /// Inference-service API: `system` and `user` roles only, temperature only.
    Inference,
    /// Local echo provider, no network.
    Dummy,
}

impl AdapterKind {
    /// Whether the backend schema can carry prior turns (including
    /// `assistant` messages). Restricted kinds get `[system, user]` only.
    pub fn accepts_history(&self) -> bool {
        !matches!(self, AdapterKind::Inference)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AdapterKind::ChatCompletions => "chat_completions",
            AdapterKind::Inference => "inference",
            AdapterKind::Dummy => "dummy",
        }
    }
}

impl fmt::Display for AdapterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Provider enum ─────────────────────────────────────────────────────────────

/// All available provider backends.
///
/// Adding a backend = new module + new variant + new arm in each method.
#[derive(Debug, Clone)]
pub enum LlmProvider {
    ChatCompletions(providers::chat_completions::ChatCompletionsProvider),
    Inference(providers::inference::InferenceProvider),
    Dummy(providers::dummy::DummyProvider),
}

impl LlmProvider {
    /// One round-trip to the backend. `messages` is sent as-is apart from
    /// whatever filtering the variant's schema requires.
    pub async fn complete(&self, messages: &[Message], model: &str) -> Result<Completion, ProviderError> {
        match self {
            LlmProvider::ChatCompletions(p) => p.complete(messages, model).await,
            LlmProvider::Inference(p) => p.complete(messages, model).await,
            LlmProvider::Dummy(p) => p.complete(messages, model).await,
        }
    }

    /// Probe the backend's model listing with the configured credential.
    pub async fn readiness(&self) -> Readiness {
        match self {
            LlmProvider::ChatCompletions(p) => p.readiness().await,
            LlmProvider::Inference(p) => p.readiness().await,
            LlmProvider::Dummy(_) => Readiness::valid("Dummy provider is active (no remote endpoint)"),
        }
    }

    pub fn kind(&self) -> AdapterKind {
        match self {
            LlmProvider::ChatCompletions(_) => AdapterKind::ChatCompletions,
            LlmProvider::Inference(_) => AdapterKind::Inference,
            LlmProvider::Dummy(_) => AdapterKind::Dummy,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_serialises_lowercase() {
        let json = serde_json::to_string(&Message::assistant("hi")).unwrap();
        assert_eq!(json, r#"{"role":"assistant","content":"hi"}"#);
    }

    #[test]
    fn adapter_kind_parses_snake_case() {
        let kind: AdapterKind = serde_json::from_str(r#""chat_completions""#).unwrap();
        assert_eq!(kind, AdapterKind::ChatCompletions);
        assert_eq!(kind.to_string(), "chat_completions");
    }

    #[test]
    fn only_inference_drops_history() {
        assert!(AdapterKind::ChatCompletions.accepts_history());
        assert!(AdapterKind::Dummy.accepts_history());
        assert!(!AdapterKind::Inference.accepts_history());
    }

    #[test]
    fn missing_credential_names_env_var() {
        let e = ProviderError::MissingCredential("AZURE_API_KEY".into());
        assert!(e.to_string().contains("AZURE_API_KEY"));
    }
}
