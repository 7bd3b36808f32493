//! Wire types shared by the HTTP providers.
//!
//! Both backends answer with the chat-completions response envelope and the
//! same error envelope; only the request bodies differ.

use serde::{Deserialize, Serialize};
use tracing::{debug, error, trace};

use crate::llm::{Completion, Message, ProviderError, UsageStats};

#[derive(Debug, Serialize)]
pub(super) struct WireMessage<'a> {
    pub role: &'static str,
    pub content: &'a str,
}

impl<'a> From<&'a Message> for WireMessage<'a> {
    fn from(m: &'a Message) -> Self {
        Self { role: m.role.as_str(), content: &m.content }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub(super) struct CompletionResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<UsageData>,
}

#[derive(Debug, Serialize, Deserialize)]
struct UsageData {
    prompt_tokens: u64,
    completion_tokens: u64,
    #[serde(default)]
    total_tokens: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
    #[serde(default)]
    code: Option<serde_json::Value>,
}

impl CompletionResponse {
    /// First choice's text plus usage labelled with `model`.
    pub(super) fn into_completion(self, model: &str) -> Result<Completion, ProviderError> {
        debug!(choices = self.choices.len(), "received LLM response");

        let text = self
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ProviderError::Request("empty or missing content in response".into()))?;

        let usage = self.usage.map(|u| UsageStats {
            model: model.to_string(),
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens.unwrap_or(u.prompt_tokens + u.completion_tokens),
        });

        Ok(Completion { text, usage })
    }
}

/// Send a prepared request and decode the completion envelope.
pub(super) async fn send(
    req: reqwest::RequestBuilder,
    url: &str,
    model: &str,
) -> Result<Completion, ProviderError> {
    let response = req.send().await.map_err(|e| {
        error!(%url, error = %e, timeout = e.is_timeout(), "LLM HTTP request failed (transport)");
        ProviderError::Request(e.to_string())
    })?;

    let response = check_status(response).await?;

    let parsed = response.json::<CompletionResponse>().await.map_err(|e| {
        error!(error = %e, "failed to deserialize LLM response");
        ProviderError::Request(format!("failed to parse response body: {e}"))
    })?;

    if tracing::enabled!(tracing::Level::TRACE) {
        let json = serde_json::to_string_pretty(&parsed)
            .unwrap_or_else(|e| format!("<serialization failed: {e}>"));
        trace!(response = %json, "full LLM response payload");
    }

    parsed.into_completion(model)
}

/// Return the response if successful, or a structured error.
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<failed to read error body>".to_string());

    let message = match serde_json::from_str::<ErrorEnvelope>(&body) {
        Ok(env) => {
            let code = env
                .error
                .code
                .map(|v| match v {
                    serde_json::Value::String(s) => format!("[code={s}] "),
                    other => format!("[code={other}] "),
                })
                .unwrap_or_default();
            format!("{code}{}", env.error.message)
        }
        Err(_) => body,
    };

    error!(%status, %message, "LLM request returned HTTP error");
    Err(ProviderError::Http { status: status.as_u16(), message })
}
