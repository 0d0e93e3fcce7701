// Recommendation Capability Port

use crate::domain::{AggregatedMetrics, Recommendation, Target};
use crate::port::measurement::CapabilityError;
use async_trait::async_trait;

/// Produces an ordered recommendation list from aggregated metrics
#[async_trait]
pub trait Recommender: Send + Sync {
    /// Backend name used in logs and result payloads
    fn name(&self) -> &str;

    async fn recommend(
        &self,
        main: &Target,
        metrics: &AggregatedMetrics,
    ) -> Result<Vec<Recommendation>, CapabilityError>;
}
