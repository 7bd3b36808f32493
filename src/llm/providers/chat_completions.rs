//! Chat-completions provider (Azure OpenAI deployment schema).
//!
//! Sends the full message list verbatim to
//! `{endpoint}/openai/deployments/{model}/chat/completions` together with the
//! fixed sampling parameters from `[providers.chat_completions]`. Callers never
//! supply sampling parameters.

use reqwest::{Client, Url};
use serde::Serialize;
use tracing::{debug, trace};

use crate::config::ChatCompletionsConfig;
use crate::health::{self, Readiness};
use crate::llm::{Completion, Message, ProviderError};

use super::wire::{self, WireMessage};

#[derive(Debug, Clone)]
pub struct ChatCompletionsProvider {
    client: Client,
    endpoint: Url,
    api_version: String,
    api_key_env: String,
    api_key: Option<String>,
    params: SamplingParams,
}

#[derive(Debug, Clone, Copy, Serialize)]
struct SamplingParams {
    temperature: f32,
    top_p: f32,
    seed: i64,
    frequency_penalty: f32,
    presence_penalty: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    messages: Vec<WireMessage<'a>>,
    #[serde(flatten)]
    params: SamplingParams,
}

impl ChatCompletionsProvider {
    pub fn new(config: &ChatCompletionsConfig) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| ProviderError::Request(format!("failed to build HTTP client: {e}")))?;
        let endpoint = Url::parse(&config.endpoint)
            .map_err(|e| ProviderError::Request(format!("invalid endpoint '{}': {e}", config.endpoint)))?;

        Ok(Self {
            client,
            endpoint,
            api_version: config.api_version.clone(),
            api_key_env: config.api_key_env.clone(),
            api_key: config.api_key.clone(),
            params: SamplingParams {
                temperature: config.temperature,
                top_p: config.top_p,
                seed: config.seed,
                frequency_penalty: config.frequency_penalty,
                presence_penalty: config.presence_penalty,
                max_tokens: config.max_tokens,
            },
        })
    }

    /// `endpoint` extended with `segments`, each percent-encoded as a single
    /// path segment, plus the `api-version` query.
    fn endpoint_url(&self, segments: &[&str]) -> Result<Url, ProviderError> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| ProviderError::Request(format!("endpoint cannot be a base URL: {}", self.endpoint)))?
            .pop_if_empty()
            .extend(segments);
        url.query_pairs_mut().clear().append_pair("api-version", &self.api_version);
        Ok(url)
    }

    fn completions_url(&self, model: &str) -> Result<Url, ProviderError> {
        // Dot segments would be dropped from the path rather than encoded.
        if matches!(model, "" | "." | "..") {
            return Err(ProviderError::Request(format!("invalid model identifier '{model}'")));
        }
        self.endpoint_url(&["openai", "deployments", model, "chat", "completions"])
    }

    fn models_url(&self) -> Result<Url, ProviderError> {
        self.endpoint_url(&["openai", "models"])
    }

    pub async fn complete(&self, messages: &[Message], model: &str) -> Result<Completion, ProviderError> {
        let key = self
            .api_key
            .as_deref()
            .ok_or_else(|| ProviderError::MissingCredential(self.api_key_env.clone()))?;
        let url = self.completions_url(model)?;

        let payload = ChatCompletionRequest {
            messages: messages.iter().map(WireMessage::from).collect(),
            params: self.params,
        };

        debug!(
            %model,
            messages = payload.messages.len(),
            temperature = self.params.temperature,
            "sending chat-completions request"
        );
        if tracing::enabled!(tracing::Level::TRACE) {
            let json = serde_json::to_string_pretty(&payload)
                .unwrap_or_else(|e| format!("<serialization failed: {e}>"));
            trace!(payload = %json, "full LLM request payload");
        }

        let req = self.client.post(url.clone()).header("api-key", key).json(&payload);
        wire::send(req, url.as_str(), model).await
    }

    pub async fn readiness(&self) -> Readiness {
        let Some(key) = self.api_key.as_deref() else {
            return Readiness::invalid(ProviderError::MissingCredential(self.api_key_env.clone()).to_string());
        };
        match self.models_url() {
            Ok(url) => health::check(url.as_str(), key).await,
            Err(e) => Readiness::invalid(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use axum::{
        Json, Router,
        extract::{Path, State},
        http::{HeaderMap, StatusCode, Uri},
        routing::post,
    };
    use serde_json::{Value, json};
    use tokio::net::TcpListener;

    type Seen = Arc<Mutex<Vec<(String, Value)>>>;
    type Stray = Arc<Mutex<Vec<String>>>;

    async fn completions(
        State(seen): State<Seen>,
        Path(deployment): Path<String>,
        headers: HeaderMap,
        Json(body): Json<Value>,
    ) -> (StatusCode, Json<Value>) {
        if headers.get("api-key").and_then(|v| v.to_str().ok()) != Some("k") {
            return (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "error": { "code": "401", "message": "invalid subscription key" } })),
            );
        }
        seen.lock().unwrap().push((deployment, body));
        (
            StatusCode::OK,
            Json(json!({
                "choices": [{ "message": { "role": "assistant", "content": "use a HashMap" } }],
                "usage": { "prompt_tokens": 12, "completion_tokens": 4, "total_tokens": 16 }
            })),
        )
    }

    async fn spawn_stub() -> (String, Seen) {
        let (endpoint, seen, _) = spawn_stub_with_fallback().await;
        (endpoint, seen)
    }

    /// Stub that also records the URI of every request no route matched.
    async fn spawn_stub_with_fallback() -> (String, Seen, Stray) {
        let seen: Seen = Arc::default();
        let stray: Stray = Arc::default();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let recorder = stray.clone();
        let app = Router::new()
            .route("/openai/deployments/{deployment}/chat/completions", post(completions))
            .fallback(move |uri: Uri| {
                let recorder = recorder.clone();
                async move {
                    recorder.lock().unwrap().push(uri.to_string());
                    StatusCode::NOT_FOUND
                }
            })
            .with_state(seen.clone());
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        (format!("http://{addr}/"), seen, stray)
    }

    fn config(endpoint: String, api_key: Option<&str>) -> ChatCompletionsConfig {
        ChatCompletionsConfig {
            endpoint,
            api_key: api_key.map(str::to_string),
            timeout_seconds: 5,
            ..ChatCompletionsConfig::default()
        }
    }

    #[tokio::test]
    async fn sends_full_history_and_fixed_params() {
        let (endpoint, seen) = spawn_stub().await;
        let p = ChatCompletionsProvider::new(&config(endpoint, Some("k"))).unwrap();
        let history = vec![
            Message::system("be terse"),
            Message::user("q1"),
            Message::assistant("a1"),
            Message::user("q2"),
        ];

        let c = p.complete(&history, "gpt-4o-mini").await.unwrap();
        assert_eq!(c.text, "use a HashMap");
        let usage = c.usage.unwrap();
        assert_eq!(usage.model, "gpt-4o-mini");
        assert_eq!(usage.total_tokens, 16);

        let seen = seen.lock().unwrap();
        let (deployment, body) = &seen[0];
        assert_eq!(deployment, "gpt-4o-mini");
        let roles: Vec<&str> = body["messages"]
            .as_array()
            .unwrap()
            .iter()
            .map(|m| m["role"].as_str().unwrap())
            .collect();
        assert_eq!(roles, ["system", "user", "assistant", "user"]);
        assert_eq!(body["seed"], 42);
        assert_eq!(body["max_tokens"], 2048);
        assert!((body["top_p"].as_f64().unwrap() - 0.9).abs() < 1e-6);
        assert!((body["presence_penalty"].as_f64().unwrap() - 0.1).abs() < 1e-6);
    }

    #[tokio::test]
    async fn rejected_key_maps_to_http_error() {
        let (endpoint, _) = spawn_stub().await;
        let p = ChatCompletionsProvider::new(&config(endpoint, Some("wrong"))).unwrap();
        let err = p.complete(&[Message::user("hi")], "gpt-4o-mini").await.unwrap_err();
        match err {
            ProviderError::Http { status, message } => {
                assert_eq!(status, 401);
                assert!(message.contains("invalid subscription key"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn missing_key_fails_before_sending() {
        let (endpoint, seen) = spawn_stub().await;
        let p = ChatCompletionsProvider::new(&config(endpoint, None)).unwrap();
        let err = p.complete(&[Message::user("hi")], "gpt-4o-mini").await.unwrap_err();
        assert!(matches!(err, ProviderError::MissingCredential(ref v) if v == "AZURE_API_KEY"));
        assert!(seen.lock().unwrap().is_empty());
        assert!(!p.readiness().await.valid);
    }

    #[tokio::test]
    async fn model_id_stays_inside_deployment_segment() {
        let (endpoint, seen, stray) = spawn_stub_with_fallback().await;
        let p = ChatCompletionsProvider::new(&config(endpoint, Some("k"))).unwrap();
        let model = "../../../admin/keys?x=";

        p.complete(&[Message::user("hi")], model).await.unwrap();

        let stray = stray.lock().unwrap().clone();
        assert!(stray.is_empty(), "request escaped: {stray:?}");
        assert_eq!(seen.lock().unwrap()[0].0, model);
    }

    #[tokio::test]
    async fn dot_segment_model_is_rejected() {
        let (endpoint, seen, stray) = spawn_stub_with_fallback().await;
        let p = ChatCompletionsProvider::new(&config(endpoint, Some("k"))).unwrap();
        for model in [".", ".."] {
            let err = p.complete(&[Message::user("hi")], model).await.unwrap_err();
            assert!(matches!(err, ProviderError::Request(_)));
        }
        assert!(seen.lock().unwrap().is_empty());
        assert!(stray.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn urls_keep_endpoint_base_path() {
        let p = ChatCompletionsProvider::new(&config("https://res.openai.azure.com/".into(), Some("k"))).unwrap();
        assert_eq!(
            p.completions_url("gpt-4o-mini").unwrap().as_str(),
            "https://res.openai.azure.com/openai/deployments/gpt-4o-mini/chat/completions?api-version=2024-05-01-preview"
        );
        assert_eq!(
            p.models_url().unwrap().as_str(),
            "https://res.openai.azure.com/openai/models?api-version=2024-05-01-preview"
        );
    }
}
