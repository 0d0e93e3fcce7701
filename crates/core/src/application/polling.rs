//! Polling Client
//!
//! Generic submit-then-poll driver for asynchronous external test providers.
//! The loop waits `interval` before every poll, grows the interval by
//! `backoff_factor` up to `max_interval`, and gives up once the wall-clock
//! budget `timeout` is spent. Each individual provider call is bounded by
//! `request_timeout`.
//!
//! All waiting goes through `tokio::time`, so tests drive the loop with a
//! paused clock.

use crate::application::constants::{
    DEFAULT_MAX_POLL_INTERVAL, DEFAULT_POLL_BACKOFF_FACTOR, DEFAULT_POLL_INTERVAL,
    DEFAULT_POLL_TIMEOUT, DEFAULT_REQUEST_TIMEOUT,
};
use crate::domain::{AgentPayload, Target};
use crate::port::provider::TestOptions;
use crate::port::{PollStatus, ProviderError, TestId, TestProvider};
use std::time::Duration;
use thiserror::Error;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, warn};

/// Polling parameters (all injectable)
#[derive(Debug, Clone, PartialEq)]
pub struct PollConfig {
    pub interval: Duration,
    pub max_interval: Duration,
    pub backoff_factor: f64,
    pub timeout: Duration,
    pub request_timeout: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            max_interval: DEFAULT_MAX_POLL_INTERVAL,
            backoff_factor: DEFAULT_POLL_BACKOFF_FACTOR,
            timeout: DEFAULT_POLL_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl PollConfig {
    /// Interval that follows `current` after one more pending poll
    pub fn next_interval(&self, current: Duration) -> Duration {
        let factor = if self.backoff_factor.is_finite() && self.backoff_factor >= 1.0 {
            self.backoff_factor
        } else {
            1.0
        };
        current.mul_f64(factor).min(self.max_interval)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PollError {
    #[error("Submission failed: {0}")]
    Submission(String),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Provider timed out after {elapsed_ms}ms ({polls} polls)")]
    Timeout { elapsed_ms: u64, polls: usize },
}

impl PollError {
    /// Submission failures and timeouts are the recoverable kinds
    pub fn is_recoverable(&self) -> bool {
        matches!(self, PollError::Submission(_) | PollError::Timeout { .. })
    }
}

pub struct PollingClient {
    config: PollConfig,
}

impl PollingClient {
    pub fn new(config: PollConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PollConfig {
        &self.config
    }

    /// Submit a test and wait for its completion
    pub async fn submit_and_wait(
        &self,
        provider: &dyn TestProvider,
        target: &Target,
        options: &TestOptions,
    ) -> Result<(TestId, AgentPayload), PollError> {
        let test_id = match timeout(self.config.request_timeout, provider.submit(target, options))
            .await
        {
            Ok(Ok(id)) => id,
            Ok(Err(e)) => return Err(PollError::Submission(e.to_string())),
            Err(_) => {
                return Err(PollError::Submission(format!(
                    "submission timed out after {}ms",
                    self.config.request_timeout.as_millis()
                )))
            }
        };

        debug!(
            provider = provider.name(),
            target = %target,
            test_id = %test_id,
            "Test submitted"
        );

        let payload = self.wait(provider, &test_id).await?;
        Ok((test_id, payload))
    }

    /// Poll an already submitted test until it completes, fails or times out
    ///
    /// Transport errors and per-request timeouts are treated as a pending
    /// poll; provider-reported and malformed responses end the wait.
    pub async fn wait(
        &self,
        provider: &dyn TestProvider,
        test_id: &TestId,
    ) -> Result<AgentPayload, PollError> {
        let started = Instant::now();
        let deadline = started + self.config.timeout;
        let mut interval = self.config.interval;
        let mut polls = 0usize;

        loop {
            let now = Instant::now();
            if now >= deadline {
                return Err(PollError::Timeout {
                    elapsed_ms: now.duration_since(started).as_millis() as u64,
                    polls,
                });
            }
            sleep(interval.min(deadline - now)).await;

            polls += 1;
            match timeout(self.config.request_timeout, provider.fetch(test_id)).await {
                Ok(Ok(PollStatus::Complete(payload))) => {
                    debug!(
                        provider = provider.name(),
                        test_id = %test_id,
                        polls,
                        "Test complete"
                    );
                    return Ok(payload);
                }
                Ok(Ok(PollStatus::Pending)) => {}
                Ok(Err(ProviderError::Transport(msg))) => {
                    warn!(
                        provider = provider.name(),
                        test_id = %test_id,
                        error = %msg,
                        "Transient poll failure"
                    );
                }
                Ok(Err(e)) => return Err(PollError::Provider(e.to_string())),
                Err(_) => {
                    warn!(
                        provider = provider.name(),
                        test_id = %test_id,
                        "Poll request timed out"
                    );
                }
            }

            interval = self.config.next_interval(interval);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::provider::mocks::{ProviderScript, ScriptedProvider};

    fn config() -> PollConfig {
        PollConfig {
            interval: Duration::from_secs(5),
            max_interval: Duration::from_secs(20),
            backoff_factor: 2.0,
            timeout: Duration::from_secs(120),
            request_timeout: Duration::from_secs(10),
        }
    }

    fn target() -> Target {
        Target::parse("https://a.example").unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_k_pending_polls_then_complete() {
        for k in 0..4 {
            let provider = ScriptedProvider::completing_after("wpt", k, 77.0);
            let client = PollingClient::new(config());

            let (_, payload) = client
                .submit_and_wait(&provider, &target(), &TestOptions::default())
                .await
                .unwrap();

            assert_eq!(provider.poll_count(), k + 1);
            assert_eq!(provider.submit_count(), 1);
            assert_eq!(payload.metrics.get("performance_score"), Some(&77.0));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_always_pending_times_out() {
        let provider = ScriptedProvider::new("wpt", ProviderScript::NeverCompletes);
        let client = PollingClient::new(config());
        let started = Instant::now();

        let err = client
            .submit_and_wait(&provider, &target(), &TestOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, PollError::Timeout { .. }));
        assert!(err.is_recoverable());
        assert!(provider.poll_count() > 0);
        // The wall-clock budget bounds the wait
        assert!(Instant::now().duration_since(started) <= Duration::from_secs(121));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_submission_never_polls() {
        let provider = ScriptedProvider::new(
            "gtm",
            ProviderScript::RejectSubmission("quota exceeded".to_string()),
        );
        let client = PollingClient::new(config());

        let err = client
            .submit_and_wait(&provider, &target(), &TestOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, PollError::Submission(_)));
        assert_eq!(provider.poll_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_provider_error_is_not_recoverable() {
        let provider = ScriptedProvider::new(
            "gtm",
            ProviderScript::FailOnPoll("test errored".to_string()),
        );
        let client = PollingClient::new(config());

        let err = client
            .submit_and_wait(&provider, &target(), &TestOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, PollError::Provider(_)));
        assert!(!err.is_recoverable());
        assert_eq!(provider.poll_count(), 1);
    }

    #[test]
    fn test_backoff_grows_to_max_interval() {
        let cfg = config();
        let mut interval = cfg.interval;
        let mut seen = Vec::new();
        for _ in 0..4 {
            interval = cfg.next_interval(interval);
            seen.push(interval.as_secs());
        }
        assert_eq!(seen, vec![10, 20, 20, 20]);
    }
}
