// Application Layer - Use Cases and Workflow Orchestration

pub mod agents;
pub mod aggregator;
pub mod browser_pool;
pub mod cancel;
pub mod constants;
pub mod orchestrator;
pub mod polling;
pub mod progress;
pub mod recommend;
pub mod recovery;
pub mod scheduler;

// Re-exports
pub use aggregator::Aggregator;
pub use browser_pool::{BrowserLease, BrowserPool};
pub use cancel::{cancel_channel, CancelHandle, CancelToken};
pub use orchestrator::{HealthReport, JobStatusView, Orchestrator};
pub use polling::{PollConfig, PollError, PollingClient};
pub use progress::{ProgressReporter, ProgressTracker};
pub use recommend::{RecommendationStage, RuleBasedRecommender};
pub use recovery::RecoveryService;
pub use scheduler::{ExecutionMode, RunOutcome, Scheduler, Stage, StagePlan};
