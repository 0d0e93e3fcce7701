// External Test Provider Port
// Asynchronous providers: submit a test now, fetch its result later

use crate::domain::{AgentPayload, Target};
use async_trait::async_trait;
use thiserror::Error;

/// Provider-assigned test identifier
pub type TestId = String;

/// Options forwarded on submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestOptions {
    pub location: Option<String>,
    pub runs: u32,
}

impl Default for TestOptions {
    fn default() -> Self {
        Self {
            location: None,
            runs: 1,
        }
    }
}

/// State of a submitted test
#[derive(Debug, Clone, PartialEq)]
pub enum PollStatus {
    Pending,
    Complete(AgentPayload),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("Submission failed: {0}")]
    Submission(String),

    #[error("Provider reported failure: {0}")]
    Provider(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Malformed provider response: {0}")]
    Malformed(String),
}

/// External test provider capability
#[async_trait]
pub trait TestProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn submit(&self, target: &Target, options: &TestOptions) -> Result<TestId, ProviderError>;

    async fn fetch(&self, test_id: &TestId) -> Result<PollStatus, ProviderError>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::domain::MetricBundle;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Scripted provider behavior
    #[derive(Debug, Clone)]
    pub enum ProviderScript {
        /// `Pending` for the first `k` polls, then `Complete(payload)`
        CompleteAfter(usize, AgentPayload),
        /// `Pending` forever
        NeverCompletes,
        /// Submission is rejected
        RejectSubmission(String),
        /// Provider reports an error on the first poll
        FailOnPoll(String),
    }

    /// Fake provider driven by a script; counts every call
    pub struct ScriptedProvider {
        name: String,
        script: ProviderScript,
        submits: AtomicUsize,
        polls: AtomicUsize,
    }

    impl ScriptedProvider {
        pub fn new(name: impl Into<String>, script: ProviderScript) -> Self {
            Self {
                name: name.into(),
                script,
                submits: AtomicUsize::new(0),
                polls: AtomicUsize::new(0),
            }
        }

        pub fn completing_after(name: impl Into<String>, k: usize, score: f64) -> Self {
            let mut metrics = MetricBundle::new();
            metrics.insert("performance_score".to_string(), score);
            Self::new(
                name,
                ProviderScript::CompleteAfter(k, AgentPayload::new(metrics, serde_json::Value::Null)),
            )
        }

        pub fn submit_count(&self) -> usize {
            self.submits.load(Ordering::SeqCst)
        }

        pub fn poll_count(&self) -> usize {
            self.polls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TestProvider for ScriptedProvider {
        fn name(&self) -> &str {
            &self.name
        }

        async fn submit(
            &self,
            target: &Target,
            _options: &TestOptions,
        ) -> Result<TestId, ProviderError> {
            let n = self.submits.fetch_add(1, Ordering::SeqCst);
            match &self.script {
                ProviderScript::RejectSubmission(msg) => Err(ProviderError::Submission(msg.clone())),
                _ => Ok(format!("{}-{}-{}", self.name, n, target.as_str().len())),
            }
        }

        async fn fetch(&self, _test_id: &TestId) -> Result<PollStatus, ProviderError> {
            let seen = self.polls.fetch_add(1, Ordering::SeqCst);
            match &self.script {
                ProviderScript::CompleteAfter(k, payload) if seen >= *k => {
                    Ok(PollStatus::Complete(payload.clone()))
                }
                ProviderScript::CompleteAfter(..) | ProviderScript::NeverCompletes => {
                    Ok(PollStatus::Pending)
                }
                ProviderScript::FailOnPoll(msg) => Err(ProviderError::Provider(msg.clone())),
                ProviderScript::RejectSubmission(msg) => Err(ProviderError::Submission(msg.clone())),
            }
        }
    }
}
