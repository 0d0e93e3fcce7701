// Agent Result Domain Model

use crate::domain::metrics::MetricBundle;
use crate::domain::target::Target;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Adapter identifier (e.g. `local`, `webpagetest`, `screenshot:mobile`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AdapterId(String);

impl AdapterId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AdapterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Outcome tag of one adapter invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AgentOutcome {
    Success,
    Fallback,
    Failed,
}

impl AgentOutcome {
    /// Whether the payload may feed aggregation
    pub fn is_usable(&self) -> bool {
        matches!(self, AgentOutcome::Success | AgentOutcome::Fallback)
    }
}

impl fmt::Display for AgentOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentOutcome::Success => write!(f, "SUCCESS"),
            AgentOutcome::Fallback => write!(f, "FALLBACK"),
            AgentOutcome::Failed => write!(f, "FAILED"),
        }
    }
}

/// Adapter-specific payload
///
/// `metrics` holds the numeric values the aggregator averages; `details` is
/// free-form provider output (suggestions, artifact locations, test ids).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentPayload {
    #[serde(default)]
    pub metrics: MetricBundle,
    #[serde(default)]
    pub details: serde_json::Value,
}

impl AgentPayload {
    pub fn new(metrics: MetricBundle, details: serde_json::Value) -> Self {
        Self { metrics, details }
    }

    pub fn empty() -> Self {
        Self {
            metrics: MetricBundle::new(),
            details: serde_json::Value::Null,
        }
    }
}

/// Result of one (adapter, target) invocation. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentResult {
    pub adapter: AdapterId,
    pub target: Target,
    pub outcome: AgentOutcome,
    pub payload: AgentPayload,
    /// Present iff `outcome != Success`
    pub error: Option<String>,
}

impl AgentResult {
    pub fn success(adapter: AdapterId, target: Target, payload: AgentPayload) -> Self {
        Self {
            adapter,
            target,
            outcome: AgentOutcome::Success,
            payload,
            error: None,
        }
    }

    pub fn fallback(
        adapter: AdapterId,
        target: Target,
        payload: AgentPayload,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            adapter,
            target,
            outcome: AgentOutcome::Fallback,
            payload,
            error: Some(reason.into()),
        }
    }

    pub fn failed(adapter: AdapterId, target: Target, error: impl Into<String>) -> Self {
        Self {
            adapter,
            target,
            outcome: AgentOutcome::Failed,
            payload: AgentPayload::empty(),
            error: Some(error.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome == AgentOutcome::Success
    }
}

/// Append-only error log entry on a job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEntry {
    pub source: AdapterId,
    pub target: Target,
    pub message: String,
    pub timestamp: i64, // epoch ms
}

impl ErrorEntry {
    /// Error entry for a non-success result, `None` for a success
    pub fn from_result(result: &AgentResult, timestamp: i64) -> Option<Self> {
        result.error.as_ref().map(|message| Self {
            source: result.adapter.clone(),
            target: result.target.clone(),
            message: format!("[{}] {}", result.outcome, message),
            timestamp,
        })
    }
}
