// Shared HTTP helpers

use perfscope_core::port::{CapabilityError, ProviderError};
use serde_json::Value;
use std::time::Duration;

pub(crate) const USER_AGENT: &str = concat!("perfscope/", env!("CARGO_PKG_VERSION"));

/// HTTP client with a per-request timeout
pub(crate) fn build_client(timeout: Duration) -> Result<reqwest::Client, CapabilityError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| CapabilityError::Unavailable(format!("failed to create HTTP client: {}", e)))
}

pub(crate) fn transport_error(err: reqwest::Error) -> ProviderError {
    ProviderError::Transport(err.to_string())
}

/// 5xx answers are transient, every other non-success status is final
pub(crate) fn status_error(status: reqwest::StatusCode, body: &str) -> ProviderError {
    let body: String = body.chars().take(200).collect();
    if status.is_server_error() {
        ProviderError::Transport(format!("HTTP {}: {}", status, body))
    } else {
        ProviderError::Provider(format!("HTTP {}: {}", status, body))
    }
}

pub(crate) fn capability_error(err: reqwest::Error, timeout: Duration) -> CapabilityError {
    if err.is_timeout() {
        CapabilityError::Timeout(timeout.as_millis() as u64)
    } else {
        CapabilityError::Network(err.to_string())
    }
}

/// Copy a numeric field into a metric bundle when present
pub(crate) fn put_number(
    metrics: &mut perfscope_core::domain::MetricBundle,
    name: &str,
    value: Option<&Value>,
) {
    if let Some(n) = value.and_then(Value::as_f64) {
        if n.is_finite() {
            metrics.insert(name.to_string(), n);
        }
    }
}
