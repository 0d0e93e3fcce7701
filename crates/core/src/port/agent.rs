// Agent Adapter Port

use crate::domain::{AdapterId, AgentResult, Target};
use async_trait::async_trait;
use std::fmt;

/// Declared fallback behavior of an adapter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackPolicy {
    /// Errors become `Failed`; no substitute result exists
    None,
    /// Provider is never called; an estimate is derived from local timing
    EstimateFromLocalTiming,
    /// Submission failures and timeouts become `Fallback` with an empty bundle
    EmptyOnTimeout,
    /// AI backend errors fall back to the deterministic rule engine
    RuleBased,
}

impl fmt::Display for FallbackPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FallbackPolicy::None => write!(f, "none"),
            FallbackPolicy::EstimateFromLocalTiming => write!(f, "estimate-from-local-timing"),
            FallbackPolicy::EmptyOnTimeout => write!(f, "empty-on-timeout"),
            FallbackPolicy::RuleBased => write!(f, "rule-based"),
        }
    }
}

/// Uniform per-target measurement adapter
///
/// `run` never fails: every provider error is converted into an
/// [`AgentResult`] with outcome `Failed` or `Fallback`.
#[async_trait]
pub trait Agent: Send + Sync {
    fn id(&self) -> &AdapterId;

    fn fallback_policy(&self) -> FallbackPolicy;

    async fn run(&self, target: &Target) -> AgentResult;
}
