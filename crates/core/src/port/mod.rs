// Port Layer - Interfaces for external dependencies

pub mod agent;
pub mod capture;
pub mod id_provider; // For deterministic testing
pub mod job_store;
pub mod measurement;
pub mod provider;
pub mod recommender;
pub mod report;
pub mod time_provider;

// Re-exports
pub use agent::{Agent, FallbackPolicy};
pub use capture::{CapturedImage, Viewport, VisualCapture};
pub use id_provider::IdProvider;
pub use job_store::{JobMutation, JobStore};
pub use measurement::{CapabilityError, MeasurementCapability, PageTiming};
pub use provider::{PollStatus, ProviderError, TestId, TestProvider};
pub use recommender::Recommender;
pub use report::ReportRenderer;
pub use time_provider::TimeProvider;
