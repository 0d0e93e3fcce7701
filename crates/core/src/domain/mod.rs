// Domain Layer - Pure business logic and entities

pub mod agent_result;
pub mod error;
pub mod job;
pub mod metrics;
pub mod recommendation;
pub mod target;

// Re-exports
pub use agent_result::{AdapterId, AgentOutcome, AgentPayload, AgentResult, ErrorEntry};
pub use error::DomainError;
pub use job::{Job, JobId, JobStatus, ReportHandle};
pub use metrics::{AggregatedMetrics, MetricBundle, RankedTarget, Summary, TargetMetrics};
pub use recommendation::{Recommendation, RecommendationPriority};
pub use target::{Target, TargetSet, MAX_COMPETITORS};
