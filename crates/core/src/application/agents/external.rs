// External test provider adapters
//
// Strategy is chosen once at construction: with credentials the provider is
// driven through the polling client; without them an estimate is derived
// from local timing and the provider is never called.

use super::local::web_vitals_score;
use super::with_browser;
use crate::application::browser_pool::BrowserPool;
use crate::application::polling::PollingClient;
use crate::domain::{AdapterId, AgentPayload, AgentResult, MetricBundle, Target};
use crate::port::provider::TestOptions;
use crate::port::{Agent, FallbackPolicy, MeasurementCapability, TestProvider};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Build the adapter for one external provider
///
/// `provider` is `None` when its credentials are not configured.
pub fn external_agent(
    id: &str,
    provider: Option<Arc<dyn TestProvider>>,
    polling: Arc<PollingClient>,
    options: TestOptions,
    measurement: Arc<dyn MeasurementCapability>,
    pool: BrowserPool,
    measure_timeout: Duration,
) -> Arc<dyn Agent> {
    match provider {
        Some(provider) => Arc::new(ExternalTestAgent::new(id, provider, polling, options)),
        None => {
            info!(adapter = id, "Provider credentials absent, estimating from local timing");
            Arc::new(EstimatedTestAgent::new(id, measurement, pool, measure_timeout))
        }
    }
}

/// Submit-then-poll adapter for a configured provider
pub struct ExternalTestAgent {
    id: AdapterId,
    provider: Arc<dyn TestProvider>,
    polling: Arc<PollingClient>,
    options: TestOptions,
}

impl ExternalTestAgent {
    pub fn new(
        id: &str,
        provider: Arc<dyn TestProvider>,
        polling: Arc<PollingClient>,
        options: TestOptions,
    ) -> Self {
        Self {
            id: AdapterId::new(id),
            provider,
            polling,
            options,
        }
    }
}

#[async_trait]
impl Agent for ExternalTestAgent {
    fn id(&self) -> &AdapterId {
        &self.id
    }

    fn fallback_policy(&self) -> FallbackPolicy {
        FallbackPolicy::EmptyOnTimeout
    }

    async fn run(&self, target: &Target) -> AgentResult {
        match self
            .polling
            .submit_and_wait(self.provider.as_ref(), target, &self.options)
            .await
        {
            Ok((test_id, mut payload)) => {
                match &mut payload.details {
                    serde_json::Value::Object(map) => {
                        map.insert("test_id".to_string(), json!(test_id));
                    }
                    other => *other = json!({ "test_id": test_id }),
                }
                AgentResult::success(self.id.clone(), target.clone(), payload)
            }
            Err(e) if e.is_recoverable() => {
                warn!(adapter = %self.id, target = %target, error = %e, "Provider unavailable, falling back");
                AgentResult::fallback(
                    self.id.clone(),
                    target.clone(),
                    AgentPayload::empty(),
                    e.to_string(),
                )
            }
            Err(e) => {
                warn!(adapter = %self.id, target = %target, error = %e, "Provider test failed");
                AgentResult::failed(self.id.clone(), target.clone(), e.to_string())
            }
        }
    }
}

/// Credential-less stand-in that estimates provider metrics locally
pub struct EstimatedTestAgent {
    id: AdapterId,
    measurement: Arc<dyn MeasurementCapability>,
    pool: BrowserPool,
    timeout: Duration,
}

impl EstimatedTestAgent {
    pub fn new(
        id: &str,
        measurement: Arc<dyn MeasurementCapability>,
        pool: BrowserPool,
        timeout: Duration,
    ) -> Self {
        Self {
            id: AdapterId::new(id),
            measurement,
            pool,
            timeout,
        }
    }
}

#[async_trait]
impl Agent for EstimatedTestAgent {
    fn id(&self) -> &AdapterId {
        &self.id
    }

    fn fallback_policy(&self) -> FallbackPolicy {
        FallbackPolicy::EstimateFromLocalTiming
    }

    async fn run(&self, target: &Target) -> AgentResult {
        let timing =
            match with_browser(&self.pool, self.timeout, self.measurement.measure(target)).await {
                Ok(timing) => timing,
                Err(e) => {
                    return AgentResult::failed(
                        self.id.clone(),
                        target.clone(),
                        format!("estimate unavailable: {}", e),
                    )
                }
            };

        let mut metrics = MetricBundle::new();
        metrics.insert("performance_score".to_string(), web_vitals_score(&timing));
        metrics.insert("ttfb_ms".to_string(), timing.ttfb_ms);
        metrics.insert("load_ms".to_string(), timing.load_ms);
        metrics.insert("total_bytes".to_string(), timing.total_bytes as f64);

        let details = json!({
            "estimated": true,
            "message": format!("{} credentials not configured; metrics estimated from local timing", self.id),
        });
        AgentResult::fallback(
            self.id.clone(),
            target.clone(),
            AgentPayload::new(metrics, details),
            "credentials not configured, estimated from local timing",
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::polling::PollConfig;
    use crate::domain::AgentOutcome;
    use crate::port::measurement::mocks::MockMeasurement;
    use crate::port::provider::mocks::{ProviderScript, ScriptedProvider};

    fn polling() -> Arc<PollingClient> {
        Arc::new(PollingClient::new(PollConfig {
            interval: Duration::from_secs(1),
            max_interval: Duration::from_secs(2),
            backoff_factor: 2.0,
            timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(1),
        }))
    }

    fn measurement() -> Arc<MockMeasurement> {
        Arc::new(MockMeasurement::new(MockMeasurement::fast_page()))
    }

    fn agent_for(provider: Option<Arc<dyn TestProvider>>, m: Arc<MockMeasurement>) -> Arc<dyn Agent> {
        external_agent(
            "webpagetest",
            provider,
            polling(),
            TestOptions::default(),
            m,
            BrowserPool::new(1, Duration::from_secs(1)),
            Duration::from_secs(5),
        )
    }

    fn target() -> Target {
        Target::parse("https://a.example").unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_completed_test_is_success() {
        let provider = Arc::new(ScriptedProvider::completing_after("wpt", 2, 88.0));
        let agent = agent_for(Some(provider.clone()), measurement());

        let result = agent.run(&target()).await;
        assert_eq!(result.outcome, AgentOutcome::Success);
        assert_eq!(result.payload.metrics.get("performance_score"), Some(&88.0));
        assert!(result.payload.details.get("test_id").is_some());
        assert_eq!(provider.poll_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_falls_back_with_empty_bundle() {
        let provider = Arc::new(ScriptedProvider::new("wpt", ProviderScript::NeverCompletes));
        let agent = agent_for(Some(provider), measurement());

        let result = agent.run(&target()).await;
        assert_eq!(result.outcome, AgentOutcome::Fallback);
        assert!(result.payload.metrics.is_empty());
        assert_eq!(agent.fallback_policy(), FallbackPolicy::EmptyOnTimeout);
    }

    #[tokio::test(start_paused = true)]
    async fn test_provider_error_is_failed() {
        let provider = Arc::new(ScriptedProvider::new(
            "wpt",
            ProviderScript::FailOnPoll("statusCode 400".to_string()),
        ));
        let agent = agent_for(Some(provider), measurement());

        let result = agent.run(&target()).await;
        assert_eq!(result.outcome, AgentOutcome::Failed);
    }

    #[tokio::test]
    async fn test_missing_credentials_estimate_without_provider() {
        let m = measurement();
        let agent = agent_for(None, m.clone());

        let result = agent.run(&target()).await;
        assert_eq!(result.outcome, AgentOutcome::Fallback);
        assert_eq!(result.payload.metrics.get("performance_score"), Some(&100.0));
        assert_eq!(result.payload.details["estimated"], json!(true));
        assert_eq!(agent.fallback_policy(), FallbackPolicy::EstimateFromLocalTiming);
        assert_eq!(m.call_count(), 1);
    }
}
