// Local measurement adapter

use super::with_browser;
use crate::application::browser_pool::BrowserPool;
use crate::application::constants::LOCAL_ADAPTER;
use crate::domain::{AdapterId, AgentPayload, AgentResult, Target};
use crate::port::{Agent, FallbackPolicy, MeasurementCapability, PageTiming};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Measures each target with the local capability (no fallback)
pub struct LocalAgent {
    id: AdapterId,
    measurement: Arc<dyn MeasurementCapability>,
    pool: BrowserPool,
    timeout: Duration,
}

impl LocalAgent {
    pub fn new(
        measurement: Arc<dyn MeasurementCapability>,
        pool: BrowserPool,
        timeout: Duration,
    ) -> Self {
        Self {
            id: AdapterId::new(LOCAL_ADAPTER),
            measurement,
            pool,
            timeout,
        }
    }
}

#[async_trait]
impl Agent for LocalAgent {
    fn id(&self) -> &AdapterId {
        &self.id
    }

    fn fallback_policy(&self) -> FallbackPolicy {
        FallbackPolicy::None
    }

    async fn run(&self, target: &Target) -> AgentResult {
        let measured = with_browser(&self.pool, self.timeout, self.measurement.measure(target)).await;

        let timing = match measured {
            Ok(timing) => timing,
            Err(e) => {
                warn!(adapter = %self.id, target = %target, error = %e, "Local measurement failed");
                return AgentResult::failed(self.id.clone(), target.clone(), e.to_string());
            }
        };

        if let Some(code) = timing.status_code.filter(|c| *c >= 400) {
            return AgentResult::failed(
                self.id.clone(),
                target.clone(),
                format!("page responded with HTTP {}", code),
            );
        }

        let mut metrics = timing.to_metrics();
        metrics.insert("performance_score".to_string(), web_vitals_score(&timing));
        debug!(adapter = %self.id, target = %target, metrics = metrics.len(), "Local measurement done");

        let details = serde_json::to_value(&timing).unwrap_or(serde_json::Value::Null);
        AgentResult::success(
            self.id.clone(),
            target.clone(),
            AgentPayload::new(metrics, details),
        )
    }
}

/// Piecewise linear score for one metric: 100 below `good`, 50 at `poor`,
/// falling to 0 at twice `poor`
fn band_score(value: f64, good: f64, poor: f64) -> f64 {
    if value < good {
        100.0
    } else if value < poor {
        100.0 - (value - good) / (poor - good) * 50.0
    } else {
        (50.0 - (value - poor) / poor * 50.0).max(0.0)
    }
}

/// 0-100 score from Core Web Vitals style timings
///
/// Paint metrics a probe could not observe fall back to DOMContentLoaded
/// (for FCP) and load (for LCP); an unmeasured CLS is left out and the
/// remaining weights are renormalized.
pub fn web_vitals_score(timing: &PageTiming) -> f64 {
    let fcp = timing.fcp_ms.unwrap_or(timing.dom_content_loaded_ms);
    let lcp = timing.lcp_ms.unwrap_or(timing.load_ms);

    let mut parts = vec![
        (band_score(fcp, 1_800.0, 3_000.0), 0.10),
        (band_score(lcp, 2_500.0, 4_000.0), 0.25),
        (band_score(timing.ttfb_ms, 800.0, 1_800.0), 0.10),
    ];
    if let Some(cls) = timing.cls {
        parts.push((band_score(cls, 0.1, 0.25), 0.15));
    }

    let weight: f64 = parts.iter().map(|(_, w)| w).sum();
    let score = parts.iter().map(|(s, w)| s * w).sum::<f64>() / weight;
    (score * 10.0).round() / 10.0
}
