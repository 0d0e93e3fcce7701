// Recommendation generation
//
// Deterministic rule engine plus the recommendation stage that prefers an
// optional AI backend and falls back to the rules on any backend error.

use crate::application::constants::RECOMMENDATION_ADAPTER;
use crate::domain::recommendation::order_by_priority;
use crate::domain::{
    AdapterId, AgentPayload, AgentResult, AggregatedMetrics, Recommendation,
    RecommendationPriority, Target,
};
use crate::port::{CapabilityError, FallbackPolicy, Recommender};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

const SLOW_FCP_MS: f64 = 3_000.0;
const SLOW_LCP_MS: f64 = 4_000.0;
const SLOW_TTFB_MS: f64 = 1_800.0;
const HIGH_CLS: f64 = 0.25;
const HEAVY_PAGE_BYTES: f64 = 3_000_000.0;
const MANY_REQUESTS: f64 = 100.0;

/// Threshold rules over the main site's averaged metrics
#[derive(Debug, Default, Clone)]
pub struct RuleBasedRecommender;

impl RuleBasedRecommender {
    pub fn new() -> Self {
        Self
    }

    /// Evaluate every rule; always returns at least the caching advice
    pub fn evaluate(&self, metrics: &AggregatedMetrics) -> Vec<Recommendation> {
        let mut out = Vec::new();
        let main = metrics.main();
        let value = |name: &str| main.and_then(|m| m.metric(name)).unwrap_or(0.0);

        if value("fcp_ms") > SLOW_FCP_MS {
            out.push(Recommendation::new(
                RecommendationPriority::High,
                "Performance",
                "Improve First Contentful Paint",
                "Reduce server response time, eliminate render-blocking resources, and optimize the critical rendering path.",
                "Users will see content faster, improving perceived performance",
            ));
        }

        if value("lcp_ms") > SLOW_LCP_MS {
            out.push(Recommendation::new(
                RecommendationPriority::High,
                "Performance",
                "Optimize Largest Contentful Paint",
                "Optimize images, use a CDN, implement lazy loading, and prioritize above-the-fold content.",
                "Faster visual completion and better user experience",
            ));
        }

        if value("ttfb_ms") > SLOW_TTFB_MS {
            out.push(Recommendation::new(
                RecommendationPriority::High,
                "Server",
                "Reduce Time to First Byte",
                "Profile backend response time, add server-side caching, and serve from an edge location close to users.",
                "Every later milestone moves earlier by the same amount",
            ));
        }

        if value("cls") > HIGH_CLS {
            out.push(Recommendation::new(
                RecommendationPriority::Medium,
                "Best Practices",
                "Stabilize layout during load",
                "Set explicit dimensions for images and embeds and avoid inserting content above existing content.",
                "Fewer unexpected layout shifts while the page loads",
            ));
        }

        let bytes = value("total_bytes");
        if bytes > HEAVY_PAGE_BYTES {
            out.push(Recommendation::new(
                RecommendationPriority::Medium,
                "Images",
                "Reduce page weight",
                format!(
                    "Total transfer size is {:.2}MB. Compress text assets, serve modern image formats, and lazy-load below-the-fold media.",
                    bytes / 1_000_000.0
                ),
                "Shorter load times on slow connections",
            ));
        }

        let requests = value("resource_count");
        if requests > MANY_REQUESTS {
            out.push(Recommendation::new(
                RecommendationPriority::Medium,
                "Optimization",
                "Cut the number of HTTP requests",
                format!(
                    "{:.0} resources are referenced. Bundle scripts and styles and drop unused third-party tags.",
                    requests
                ),
                "Less connection overhead and faster first render",
            ));
        }

        if let Some(leader) = metrics.main_underperforms.first() {
            out.push(Recommendation::new(
                RecommendationPriority::High,
                "Performance",
                "Close the gap with faster competitors",
                format!(
                    "{} competitor(s) outperform this site, led by {}. Compare their asset sizes and server timings against yours.",
                    metrics.main_underperforms.len(),
                    leader
                ),
                "Competitive parity on page speed",
            ));
        }

        out.push(Recommendation::new(
            RecommendationPriority::Medium,
            "Caching",
            "Implement Caching Strategy",
            "Use browser caching, CDN caching, and server-side caching to reduce load times.",
            "Faster repeat visits and reduced server load",
        ));

        order_by_priority(&mut out);
        out
    }
}

#[async_trait]
impl Recommender for RuleBasedRecommender {
    fn name(&self) -> &str {
        "rule-based"
    }

    async fn recommend(
        &self,
        _main: &Target,
        metrics: &AggregatedMetrics,
    ) -> Result<Vec<Recommendation>, CapabilityError> {
        Ok(self.evaluate(metrics))
    }
}

/// Job-level recommendation step
///
/// Always yields a non-empty list. Produces one `recommendation` result:
/// `Success` when the preferred backend answered (or none is configured),
/// `Fallback` when the rule engine had to stand in for a failing backend.
pub struct RecommendationStage {
    id: AdapterId,
    backend: Option<Arc<dyn Recommender>>,
    rules: RuleBasedRecommender,
    timeout: Duration,
}

impl RecommendationStage {
    pub fn new(backend: Option<Arc<dyn Recommender>>, timeout: Duration) -> Self {
        Self {
            id: AdapterId::new(RECOMMENDATION_ADAPTER),
            backend,
            rules: RuleBasedRecommender::new(),
            timeout,
        }
    }

    pub fn id(&self) -> &AdapterId {
        &self.id
    }

    pub fn fallback_policy(&self) -> FallbackPolicy {
        FallbackPolicy::RuleBased
    }

    pub async fn run(
        &self,
        main: &Target,
        metrics: &AggregatedMetrics,
    ) -> (Vec<Recommendation>, AgentResult) {
        let backend = match &self.backend {
            Some(backend) => backend,
            None => {
                let recs = self.rules.evaluate(metrics);
                let payload = payload(self.rules.name(), recs.len());
                return (
                    recs,
                    AgentResult::success(self.id.clone(), main.clone(), payload),
                );
            }
        };

        let attempt = tokio::time::timeout(self.timeout, backend.recommend(main, metrics)).await;
        let error = match attempt {
            Ok(Ok(mut recs)) if !recs.is_empty() => {
                order_by_priority(&mut recs);
                info!(backend = backend.name(), count = recs.len(), "Recommendations generated");
                let payload = payload(backend.name(), recs.len());
                return (
                    recs,
                    AgentResult::success(self.id.clone(), main.clone(), payload),
                );
            }
            Ok(Ok(_)) => "backend returned no recommendations".to_string(),
            Ok(Err(e)) => e.to_string(),
            Err(_) => CapabilityError::Timeout(self.timeout.as_millis() as u64).to_string(),
        };

        warn!(
            backend = backend.name(),
            error = %error,
            "Recommendation backend failed, using rule-based fallback"
        );
        let recs = self.rules.evaluate(metrics);
        let payload = payload(self.rules.name(), recs.len());
        (
            recs,
            AgentResult::fallback(
                self.id.clone(),
                main.clone(),
                payload,
                format!("{}: {}", backend.name(), error),
            ),
        )
    }
}

fn payload(backend: &str, count: usize) -> AgentPayload {
    AgentPayload::new(
        Default::default(),
        json!({ "backend": backend, "count": count }),
    )
}
