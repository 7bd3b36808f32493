//! Inference-service provider (Azure AI model inference schema).
//!
//! The schema has no assistant-role message, so `assistant` entries are
//! dropped before transmission. Only `temperature` is sent; the model is named
//! in the request body rather than the URL.

use reqwest::Client;
use serde::Serialize;
use tracing::{debug, trace};

use crate::config::InferenceConfig;
use crate::health::{self, Readiness};
use crate::llm::{Completion, Message, ProviderError, Role};

use super::wire::{self, WireMessage};

#[derive(Debug, Clone)]
pub struct InferenceProvider {
    client: Client,
    endpoint: String,
    api_version: String,
    api_key_env: String,
    api_key: Option<String>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct InferenceRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    temperature: f32,
}

impl InferenceProvider {
    pub fn new(config: &InferenceConfig) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| ProviderError::Request(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            api_version: config.api_version.clone(),
            api_key_env: config.api_key_env.clone(),
            api_key: config.api_key.clone(),
            temperature: config.temperature,
        })
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions?api-version={}", self.endpoint, self.api_version)
    }

    fn models_url(&self) -> String {
        format!("{}/info?api-version={}", self.endpoint, self.api_version)
    }

    pub async fn complete(&self, messages: &[Message], model: &str) -> Result<Completion, ProviderError> {
        let key = self
            .api_key
            .as_deref()
            .ok_or_else(|| ProviderError::MissingCredential(self.api_key_env.clone()))?;

        let payload = InferenceRequest {
            model,
            messages: messages
                .iter()
                .filter(|m| m.role != Role::Assistant)
                .map(WireMessage::from)
                .collect(),
            temperature: self.temperature,
        };

        debug!(
            %model,
            messages = payload.messages.len(),
            dropped = messages.len() - payload.messages.len(),
            "sending inference request"
        );
        if tracing::enabled!(tracing::Level::TRACE) {
            let json = serde_json::to_string_pretty(&payload)
                .unwrap_or_else(|e| format!("<serialization failed: {e}>"));
            trace!(payload = %json, "full LLM request payload");
        }

        let url = self.completions_url();
        let req = self.client.post(&url).header("api-key", key).json(&payload);
        wire::send(req, &url, model).await
    }

    pub async fn readiness(&self) -> Readiness {
        match self.api_key.as_deref() {
            Some(key) => health::check(&self.models_url(), key).await,
            None => Readiness::invalid(ProviderError::MissingCredential(self.api_key_env.clone()).to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use axum::{
        Json, Router,
        extract::State,
        http::{HeaderMap, StatusCode},
        routing::{get, post},
    };
    use serde_json::{Value, json};
    use tokio::net::TcpListener;

    type Seen = Arc<Mutex<Vec<Value>>>;

    fn authorised(headers: &HeaderMap) -> bool {
        headers.get("api-key").and_then(|v| v.to_str().ok()) == Some("k")
    }

    fn denied() -> (StatusCode, Json<Value>) {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": { "code": "401", "message": "invalid subscription key" } })),
        )
    }

    async fn completions(
        State(seen): State<Seen>,
        headers: HeaderMap,
        Json(body): Json<Value>,
    ) -> (StatusCode, Json<Value>) {
        if !authorised(&headers) {
            return denied();
        }
        seen.lock().unwrap().push(body);
        (
            StatusCode::OK,
            Json(json!({
                "choices": [{ "message": { "role": "assistant", "content": "42" } }],
                "usage": { "prompt_tokens": 9, "completion_tokens": 1, "total_tokens": 10 }
            })),
        )
    }

    async fn info(headers: HeaderMap) -> (StatusCode, Json<Value>) {
        if !authorised(&headers) {
            return denied();
        }
        (StatusCode::OK, Json(json!({ "model_name": "grok-3-mini" })))
    }

    async fn spawn_stub() -> (String, Seen) {
        let seen: Seen = Arc::default();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = Router::new()
            .route("/models/chat/completions", post(completions))
            .route("/models/info", get(info))
            .with_state(seen.clone());
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        (format!("http://{addr}/models"), seen)
    }

    fn config(endpoint: String) -> InferenceConfig {
        config_with_key(endpoint, Some("k"))
    }

    fn config_with_key(endpoint: String, api_key: Option<&str>) -> InferenceConfig {
        InferenceConfig {
            endpoint,
            api_key: api_key.map(str::to_string),
            timeout_seconds: 5,
            ..InferenceConfig::default()
        }
    }

    #[tokio::test]
    async fn assistant_turns_never_transmitted() {
        let (endpoint, seen) = spawn_stub().await;
        let p = InferenceProvider::new(&config(endpoint)).unwrap();
        let history = vec![
            Message::system("sys"),
            Message::user("q1"),
            Message::assistant("a1"),
            Message::user("q2"),
        ];

        let c = p.complete(&history, "grok-3-mini").await.unwrap();
        assert_eq!(c.text, "42");
        assert_eq!(c.usage.unwrap().model, "grok-3-mini");

        let seen = seen.lock().unwrap();
        let body = &seen[0];
        assert_eq!(body["model"], "grok-3-mini");
        let roles: Vec<&str> = body["messages"]
            .as_array()
            .unwrap()
            .iter()
            .map(|m| m["role"].as_str().unwrap())
            .collect();
        assert_eq!(roles, ["system", "user", "user"]);
        assert!(body.get("top_p").is_none());
        assert!(body.get("seed").is_none());
    }

    #[tokio::test]
    async fn readiness_probes_info_endpoint() {
        let (endpoint, _) = spawn_stub().await;
        let p = InferenceProvider::new(&config(endpoint)).unwrap();
        assert!(p.readiness().await.valid);
    }

    #[tokio::test]
    async fn rejected_key_maps_to_http_error() {
        let (endpoint, seen) = spawn_stub().await;
        let p = InferenceProvider::new(&config_with_key(endpoint, Some("wrong"))).unwrap();
        let err = p.complete(&[Message::user("hi")], "grok-3-mini").await.unwrap_err();
        match err {
            ProviderError::Http { status, message } => {
                assert_eq!(status, 401);
                assert!(message.contains("invalid subscription key"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_key_fails_before_sending() {
        let (endpoint, seen) = spawn_stub().await;
        let p = InferenceProvider::new(&config_with_key(endpoint, None)).unwrap();
        let err = p.complete(&[Message::user("hi")], "grok-3-mini").await.unwrap_err();
        assert!(matches!(err, ProviderError::MissingCredential(ref v) if v == "AZURE_API_KEY"));
        assert!(seen.lock().unwrap().is_empty());

        let r = p.readiness().await;
        assert!(!r.valid);
        assert!(r.message.contains("AZURE_API_KEY"));
    }

    #[tokio::test]
    async fn readiness_fails_on_rejected_key() {
        let (endpoint, _) = spawn_stub().await;
        let p = InferenceProvider::new(&config_with_key(endpoint, Some("wrong"))).unwrap();
        let r = p.readiness().await;
        assert!(!r.valid);
        assert!(r.message.contains("401"));
    }
}
