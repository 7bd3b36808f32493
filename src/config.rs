//! Configuration loading with env-var overrides.
//!
//! Reads `config/default.toml` (or the path in `CHATRELAY_CONFIG` / `--config`),
//! then applies `CHATRELAY_LOG_LEVEL` and `PORT` env overrides. Provider
//! credentials never come from TOML: each provider section names the env var
//! holding its key.

use std::{
    collections::HashMap,
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::Deserialize;

use crate::conversation::{SessionLimits, TruncationPolicy};
use crate::error::AppError;
use crate::llm::AdapterKind;
use crate::logger;

pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Chat-completions provider configuration (`[providers.chat_completions]`).
#[derive(Debug, Clone)]
pub struct ChatCompletionsConfig {
    /// Resource endpoint, e.g. `https://<resource>.openai.azure.com/`.
    pub endpoint: String,
    pub api_version: String,
    /// Name of the env var the key is read from.
    pub api_key_env: String,
    pub api_key: Option<String>,
    pub temperature: f32,
    pub top_p: f32,
    pub seed: i64,
    pub frequency_penalty: f32,
    pub presence_penalty: f32,
    pub max_tokens: u32,
    /// Per-request HTTP timeout in seconds.
    pub timeout_seconds: u64,
}

impl Default for ChatCompletionsConfig {
    fn default() -> Self {
        let raw = RawChatCompletions::default();
        Self {
            endpoint: raw.endpoint,
            api_version: raw.api_version,
            api_key_env: raw.api_key_env,
            api_key: None,
            temperature: raw.temperature,
            top_p: raw.top_p,
            seed: raw.seed,
            frequency_penalty: raw.frequency_penalty,
            presence_penalty: raw.presence_penalty,
            max_tokens: raw.max_tokens,
            timeout_seconds: raw.timeout_seconds,
        }
    }
}

/// Inference-service provider configuration (`[providers.inference]`).
#[derive(Debug, Clone)]
pub struct InferenceConfig {
    /// Models endpoint, e.g. `https://<resource>.services.ai.azure.com/models`.
    pub endpoint: String,
    pub api_version: String,
    pub api_key_env: String,
    pub api_key: Option<String>,
    pub temperature: f32,
    pub timeout_seconds: u64,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        let raw = RawInference::default();
        Self {
            endpoint: raw.endpoint,
            api_version: raw.api_version,
            api_key_env: raw.api_key_env,
            api_key: None,
            temperature: raw.temperature,
            timeout_seconds: raw.timeout_seconds,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProvidersConfig {
    pub chat_completions: ChatCompletionsConfig,
    pub inference: InferenceConfig,
}

/// Model routing table (`[routing]`).
#[derive(Debug, Clone)]
pub struct RoutingConfig {
    /// Kind used for any model not listed in `models`.
    pub default: AdapterKind,
    pub models: HashMap<String, AdapterKind>,
}

/// Conversation settings (`[chat]`).
#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// Model used when a request does not name one.
    pub default_model: String,
    /// Resolved system prompt text.
    pub system_prompt: String,
    pub truncation: TruncationPolicy,
    pub sessions: SessionLimits,
}

/// Fully-resolved configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind: String,
    pub log_level: String,
    pub chat: ChatConfig,
    pub providers: ProvidersConfig,
    pub routing: RoutingConfig,
}

impl Config {
    /// One error per routed provider whose credential is missing.
    ///
    /// These are reported at startup and do not stop the process.
    pub fn missing_credentials(&self) -> Vec<AppError> {
        let mut kinds: Vec<AdapterKind> = self.routing.models.values().copied().collect();
        kinds.push(self.routing.default);
        kinds.sort_by_key(|k| k.as_str());
        kinds.dedup();

        kinds
            .into_iter()
            .filter_map(|kind| {
                let (has_key, env_name) = match kind {
                    AdapterKind::ChatCompletions => {
                        let p = &self.providers.chat_completions;
                        (p.api_key.is_some(), &p.api_key_env)
                    }
                    AdapterKind::Inference => {
                        let p = &self.providers.inference;
                        (p.api_key.is_some(), &p.api_key_env)
                    }
                    AdapterKind::Dummy => return None,
                };
                (!has_key).then(|| {
                    AppError::Config(format!(
                        "API key not found for {kind} provider. Please set {env_name} in your .env file."
                    ))
                })
            })
            .collect()
    }
}

/// Values that take precedence over the TOML file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub log_level: Option<String>,
    /// Listen port; binds `0.0.0.0:<port>`.
    pub port: Option<String>,
}

// ── Raw TOML shape ────────────────────────────────────────────────────────────

#[derive(Deserialize, Default)]
struct RawConfig {
    #[serde(default)]
    server: RawServer,
    #[serde(default)]
    chat: RawChat,
    #[serde(default)]
    providers: RawProviders,
    #[serde(default)]
    routing: RawRouting,
}

#[derive(Deserialize)]
struct RawServer {
    #[serde(default = "default_bind")]
    bind: String,
    #[serde(default = "default_log_level")]
    log_level: String,
}

impl Default for RawServer {
    fn default() -> Self {
        Self { bind: default_bind(), log_level: default_log_level() }
    }
}

#[derive(Deserialize)]
struct RawChat {
    #[serde(default = "default_model")]
    default_model: String,
    /// Inline prompt; wins over `system_prompt_file`.
    #[serde(default)]
    system_prompt: Option<String>,
    /// Relative paths resolve against the config file's directory.
    #[serde(default = "default_system_prompt_file")]
    system_prompt_file: String,
    #[serde(default)]
    truncation: RawTruncation,
    #[serde(default)]
    sessions: RawSessions,
}

impl Default for RawChat {
    fn default() -> Self {
        Self {
            default_model: default_model(),
            system_prompt: None,
            system_prompt_file: default_system_prompt_file(),
            truncation: RawTruncation::default(),
            sessions: RawSessions::default(),
        }
    }
}

#[derive(Deserialize)]
struct RawTruncation {
    #[serde(default = "default_threshold")]
    threshold: usize,
    #[serde(default = "default_keep")]
    keep: usize,
}

impl Default for RawTruncation {
    fn default() -> Self {
        Self { threshold: default_threshold(), keep: default_keep() }
    }
}

#[derive(Deserialize)]
struct RawSessions {
    #[serde(default = "default_idle_timeout_seconds")]
    idle_timeout_seconds: u64,
    #[serde(default = "default_max_sessions")]
    max_sessions: usize,
}

impl Default for RawSessions {
    fn default() -> Self {
        Self { idle_timeout_seconds: default_idle_timeout_seconds(), max_sessions: default_max_sessions() }
    }
}

#[derive(Deserialize, Default)]
struct RawProviders {
    #[serde(default)]
    chat_completions: RawChatCompletions,
    #[serde(default)]
    inference: RawInference,
}

#[derive(Deserialize)]
struct RawChatCompletions {
    #[serde(default = "default_chat_endpoint")]
    endpoint: String,
    #[serde(default = "default_api_version")]
    api_version: String,
    #[serde(default = "default_api_key_env")]
    api_key_env: String,
    #[serde(default = "default_temperature")]
    temperature: f32,
    #[serde(default = "default_top_p")]
    top_p: f32,
    #[serde(default = "default_seed")]
    seed: i64,
    #[serde(default = "default_frequency_penalty")]
    frequency_penalty: f32,
    #[serde(default = "default_presence_penalty")]
    presence_penalty: f32,
    #[serde(default = "default_max_tokens")]
    max_tokens: u32,
    #[serde(default = "default_timeout_seconds")]
    timeout_seconds: u64,
}

impl Default for RawChatCompletions {
    fn default() -> Self {
        Self {
            endpoint: default_chat_endpoint(),
            api_version: default_api_version(),
            api_key_env: default_api_key_env(),
            temperature: default_temperature(),
            top_p: default_top_p(),
            seed: default_seed(),
            frequency_penalty: default_frequency_penalty(),
            presence_penalty: default_presence_penalty(),
            max_tokens: default_max_tokens(),
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

#[derive(Deserialize)]
struct RawInference {
    #[serde(default = "default_inference_endpoint")]
    endpoint: String,
    #[serde(default = "default_api_version")]
    api_version: String,
    #[serde(default = "default_api_key_env")]
    api_key_env: String,
    #[serde(default = "default_temperature")]
    temperature: f32,
    #[serde(default = "default_timeout_seconds")]
    timeout_seconds: u64,
}

impl Default for RawInference {
    fn default() -> Self {
        Self {
            endpoint: default_inference_endpoint(),
            api_version: default_api_version(),
            api_key_env: default_api_key_env(),
            temperature: default_temperature(),
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

#[derive(Deserialize)]
struct RawRouting {
    #[serde(default = "default_adapter")]
    default: AdapterKind,
    #[serde(default = "default_model_routes")]
    models: HashMap<String, AdapterKind>,
}

impl Default for RawRouting {
    fn default() -> Self {
        Self { default: default_adapter(), models: default_model_routes() }
    }
}

fn default_bind() -> String { "127.0.0.1:5000".to_string() }
fn default_log_level() -> String { "info".to_string() }
fn default_model() -> String { "gpt-4o-mini".to_string() }
fn default_system_prompt_file() -> String { "prompts/coding_assistant.txt".to_string() }
fn default_threshold() -> usize { 20 }
fn default_keep() -> usize { 19 }
fn default_idle_timeout_seconds() -> u64 { 3600 }
fn default_max_sessions() -> usize { 10_000 }
fn default_chat_endpoint() -> String { "https://localhost.openai.azure.com/".to_string() }
fn default_inference_endpoint() -> String { "https://localhost.services.ai.azure.com/models".to_string() }
fn default_api_version() -> String { "2024-05-01-preview".to_string() }
fn default_api_key_env() -> String { "AZURE_API_KEY".to_string() }
fn default_temperature() -> f32 { 0.3 }
fn default_top_p() -> f32 { 0.90 }
fn default_seed() -> i64 { 42 }
fn default_frequency_penalty() -> f32 { 0.3 }
fn default_presence_penalty() -> f32 { 0.1 }
fn default_max_tokens() -> u32 { 2048 }
fn default_timeout_seconds() -> u64 { 60 }
fn default_adapter() -> AdapterKind { AdapterKind::ChatCompletions }
fn default_model_routes() -> HashMap<String, AdapterKind> {
    HashMap::from([("grok-3-mini".to_string(), AdapterKind::Inference)])
}

// ── Loading ───────────────────────────────────────────────────────────────────

/// Load config from `path`, `CHATRELAY_CONFIG`, or `config/default.toml`,
/// in that order, then apply env-var overrides.
pub fn load(path: Option<&str>) -> Result<Config, AppError> {
    let env_path = env::var("CHATRELAY_CONFIG").ok();
    let path = path
        .map(str::to_string)
        .or(env_path)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let overrides = Overrides {
        log_level: env::var("CHATRELAY_LOG_LEVEL").ok(),
        port: env::var("PORT").ok(),
    };
    load_from(&expand_home(&path), &overrides)
}

/// Internal loader: accepts an explicit path and overrides.
/// Tests pass overrides directly instead of mutating env vars.
pub fn load_from(path: &Path, overrides: &Overrides) -> Result<Config, AppError> {
    let raw = fs::read_to_string(path)
        .map_err(|e| AppError::Config(format!("cannot read {}: {e}", path.display())))?;

    let parsed: RawConfig = toml::from_str(&raw)
        .map_err(|e| AppError::Config(format!("parse error in {}: {e}", path.display())))?;

    let bind = match overrides.port.as_deref() {
        Some(port) => {
            let port: u16 = port
                .trim()
                .parse()
                .map_err(|e| AppError::Config(format!("invalid PORT '{port}': {e}")))?;
            format!("0.0.0.0:{port}")
        }
        None => parsed.server.bind,
    };
    let log_level = overrides
        .log_level
        .clone()
        .unwrap_or(parsed.server.log_level);
    logger::parse_level(&log_level).map_err(|_| {
        AppError::Config(format!(
            "invalid log_level '{log_level}' (expected one of: off, error, warn, info, debug, trace)"
        ))
    })?;

    let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
    let system_prompt = match parsed.chat.system_prompt {
        Some(text) => text,
        None => {
            let prompt_path = resolve_relative(base_dir, &parsed.chat.system_prompt_file);
            fs::read_to_string(&prompt_path).map_err(|e| {
                AppError::Config(format!("cannot read system prompt {}: {e}", prompt_path.display()))
            })?
        }
    };
    let system_prompt = system_prompt.trim().to_string();
    if system_prompt.is_empty() {
        return Err(AppError::Config("system prompt must not be empty".into()));
    }

    let truncation = TruncationPolicy::new(parsed.chat.truncation.threshold, parsed.chat.truncation.keep)?;
    let sessions = SessionLimits::new(
        Duration::from_secs(parsed.chat.sessions.idle_timeout_seconds),
        parsed.chat.sessions.max_sessions,
    )?;

    let cc = parsed.providers.chat_completions;
    let inf = parsed.providers.inference;

    Ok(Config {
        bind,
        log_level,
        chat: ChatConfig {
            default_model: parsed.chat.default_model,
            system_prompt,
            truncation,
            sessions,
        },
        providers: ProvidersConfig {
            chat_completions: ChatCompletionsConfig {
                api_key: credential(&cc.api_key_env),
                endpoint: cc.endpoint,
                api_version: cc.api_version,
                api_key_env: cc.api_key_env,
                temperature: cc.temperature,
                top_p: cc.top_p,
                seed: cc.seed,
                frequency_penalty: cc.frequency_penalty,
                presence_penalty: cc.presence_penalty,
                max_tokens: cc.max_tokens,
                timeout_seconds: cc.timeout_seconds,
            },
            inference: InferenceConfig {
                api_key: credential(&inf.api_key_env),
                endpoint: inf.endpoint,
                api_version: inf.api_version,
                api_key_env: inf.api_key_env,
                temperature: inf.temperature,
                timeout_seconds: inf.timeout_seconds,
            },
        },
        routing: RoutingConfig {
            default: parsed.routing.default,
            models: parsed.routing.models,
        },
    })
}

/// Non-empty value of env var `name`.
fn credential(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn resolve_relative(base_dir: &Path, path: &str) -> PathBuf {
    let p = expand_home(path);
    if p.is_absolute() { p } else { base_dir.join(p) }
}

/// Expand a leading `~` to the user's home directory.
/// Absolute or relative paths without `~` are returned unchanged.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    PathBuf::from(path)
}

// ── test helpers ──────────────────────────────────────────────────────────────

/// Safe `Config` for unit tests: no API keys, endpoints that never answer.
#[cfg(test)]
impl Config {
    pub fn test_default() -> Self {
        Self {
            bind: "127.0.0.1:0".into(),
            log_level: "info".into(),
            chat: ChatConfig {
                default_model: "gpt-4o-mini".into(),
                system_prompt: "You are a test assistant.".into(),
                truncation: TruncationPolicy::new(20, 19).unwrap(),
                sessions: SessionLimits::default(),
            },
            providers: ProvidersConfig {
                chat_completions: ChatCompletionsConfig {
                    endpoint: "http://localhost:0/".into(),
                    timeout_seconds: 1,
                    ..ChatCompletionsConfig::default()
                },
                inference: InferenceConfig {
                    endpoint: "http://localhost:0/models".into(),
                    timeout_seconds: 1,
                    ..InferenceConfig::default()
                },
            },
            routing: RoutingConfig {
                default: AdapterKind::ChatCompletions,
                models: default_model_routes(),
            },
        }
    }
}
