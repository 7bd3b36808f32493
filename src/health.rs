//! Provider readiness probe.
//!
//! [`check`] lists the models available at an endpoint using the configured
//! credential. Any HTTP or transport failure yields `valid = false` with a
//! readable message; nothing is returned as an error.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Hard probe timeout, independent of the completion timeout.
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Body of `GET /api/status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Readiness {
    pub valid: bool,
    pub message: String,
}

impl Readiness {
    pub fn valid(message: impl Into<String>) -> Self {
        Self { valid: true, message: message.into() }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self { valid: false, message: message.into() }
    }
}

/// Probe `models_url` with `credential` sent as the `api-key` header.
pub async fn check(models_url: &str, credential: &str) -> Readiness {
    let client = match Client::builder().timeout(PROBE_TIMEOUT).build() {
        Ok(c) => c,
        Err(e) => return Readiness::invalid(format!("API Key validation failed. Error: {e}")),
    };

    let response = match client.get(models_url).header("api-key", credential).send().await {
        Ok(r) => r,
        Err(e) => {
            warn!(url = %models_url, error = %e, "readiness probe unreachable");
            return Readiness::invalid(format!("API Key validation failed. Error: {e}"));
        }
    };

    let status = response.status();
    if status.is_success() {
        debug!(url = %models_url, %status, "readiness probe ok");
        return Readiness::valid("Connection is configured");
    }

    let body = response.text().await.unwrap_or_default();
    warn!(url = %models_url, %status, "readiness probe rejected");
    let detail = if body.trim().is_empty() {
        format!("HTTP {status}")
    } else {
        format!("HTTP {status}: {}", body.trim())
    };
    Readiness::invalid(format!("API Key validation failed. Error: {detail}"))
}
