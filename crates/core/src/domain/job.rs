// Job Domain Model

use crate::domain::agent_result::{AgentResult, ErrorEntry};
use crate::domain::error::{DomainError, Result};
use crate::domain::metrics::AggregatedMetrics;
use crate::domain::recommendation::Recommendation;
use crate::domain::target::TargetSet;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Job ID (UUID v4)
pub type JobId = String;

/// Highest progress value a non-terminal job may report
pub const MAX_RUNNING_PROGRESS: u8 = 99;

/// Job Status
///
/// Transitions are one-directional: `Queued -> Running -> {Completed, Failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Queued => write!(f, "QUEUED"),
            JobStatus::Running => write!(f, "RUNNING"),
            JobStatus::Completed => write!(f, "COMPLETED"),
            JobStatus::Failed => write!(f, "FAILED"),
        }
    }
}

/// Handle to a rendered report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportHandle {
    pub location: String,
    pub format: String,
    pub size_bytes: u64,
}

/// Job Entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub targets: TargetSet,

    pub status: JobStatus,
    pub progress: u8,
    pub current_step: String,

    pub created_at: i64, // epoch ms
    pub started_at: Option<i64>,
    pub completed_at: Option<i64>,

    /// Every result in arrival order (may repeat a pair across retries)
    pub results: Vec<AgentResult>,
    pub errors: Vec<ErrorEntry>,

    pub aggregated: Option<AggregatedMetrics>,
    pub recommendations: Vec<Recommendation>,
    pub report: Option<ReportHandle>,
    pub failure_reason: Option<String>,
}

impl Job {
    /// Create a new Job
    ///
    /// # Arguments
    ///
    /// * `id` - Unique job ID (injected, not generated)
    /// * `created_at` - Creation timestamp in epoch ms (injected, not system time)
    /// * `targets` - Validated main target and competitors
    pub fn new(id: impl Into<String>, created_at: i64, targets: TargetSet) -> Self {
        Self {
            id: id.into(),
            targets,
            status: JobStatus::Queued,
            progress: 0,
            current_step: "Queued".to_string(),
            created_at,
            started_at: None,
            completed_at: None,
            results: Vec::new(),
            errors: Vec::new(),
            aggregated: None,
            recommendations: Vec::new(),
            report: None,
            failure_reason: None,
        }
    }

    /// Create a test job with deterministic ID and timestamp (test-1, test-2, ...)
    ///
    /// **Note**: Production code injects ID and time via providers.
    pub fn new_test(targets: TargetSet) -> Self {
        use std::sync::atomic::{AtomicU64, Ordering};
        static TEST_COUNTER: AtomicU64 = AtomicU64::new(1);

        let counter = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
        Self::new(format!("test-{}", counter), (counter * 1000) as i64, targets)
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    fn ensure_running(&self) -> Result<()> {
        match self.status {
            JobStatus::Running => Ok(()),
            JobStatus::Completed | JobStatus::Failed => {
                Err(DomainError::JobFinalized(self.id.clone()))
            }
            JobStatus::Queued => Err(DomainError::InvalidStateTransition {
                from: self.status.to_string(),
                to: "RUNNING (write before start)".to_string(),
            }),
        }
    }

    /// Transition to Running state with explicit timestamp
    pub fn start(&mut self, now_millis: i64) -> Result<()> {
        if self.status != JobStatus::Queued {
            return Err(DomainError::InvalidStateTransition {
                from: self.status.to_string(),
                to: "RUNNING".to_string(),
            });
        }
        self.status = JobStatus::Running;
        self.started_at = Some(now_millis);
        self.current_step = "Initializing analysis".to_string();
        Ok(())
    }

    /// Transition to Completed; requires aggregated metrics to be present
    pub fn complete(&mut self, now_millis: i64) -> Result<()> {
        if self.status != JobStatus::Running {
            return Err(DomainError::InvalidStateTransition {
                from: self.status.to_string(),
                to: "COMPLETED".to_string(),
            });
        }
        if self.aggregated.is_none() {
            return Err(DomainError::Internal(format!(
                "job {} cannot complete without aggregated metrics",
                self.id
            )));
        }
        self.status = JobStatus::Completed;
        self.progress = 100;
        self.current_step = "Analysis complete".to_string();
        self.completed_at = Some(now_millis);
        Ok(())
    }

    /// Transition to Failed (orchestrator faults only)
    pub fn fail(&mut self, now_millis: i64, reason: impl Into<String>) -> Result<()> {
        if self.status != JobStatus::Running {
            return Err(DomainError::InvalidStateTransition {
                from: self.status.to_string(),
                to: "FAILED".to_string(),
            });
        }
        let reason = reason.into();
        self.status = JobStatus::Failed;
        self.progress = 100;
        self.current_step = format!("Analysis failed: {}", reason);
        self.failure_reason = Some(reason);
        self.completed_at = Some(now_millis);
        Ok(())
    }

    /// Append a result; non-success outcomes also append an error entry
    pub fn record_result(&mut self, result: AgentResult, now_millis: i64) -> Result<()> {
        self.ensure_running()?;
        if let Some(entry) = ErrorEntry::from_result(&result, now_millis) {
            self.errors.push(entry);
        }
        self.results.push(result);
        Ok(())
    }

    /// Raise progress and set the current step
    ///
    /// Lower values are ignored and running progress is capped at
    /// [`MAX_RUNNING_PROGRESS`]; 100 is reserved for terminal states.
    pub fn advance_progress(&mut self, percent: u8, step: impl Into<String>) -> Result<()> {
        self.ensure_running()?;
        let capped = percent.min(MAX_RUNNING_PROGRESS);
        if capped > self.progress {
            self.progress = capped;
        }
        self.current_step = step.into();
        Ok(())
    }

    pub fn set_analysis(
        &mut self,
        aggregated: AggregatedMetrics,
        recommendations: Vec<Recommendation>,
    ) -> Result<()> {
        self.ensure_running()?;
        self.aggregated = Some(aggregated);
        self.recommendations = recommendations;
        Ok(())
    }

    pub fn set_report(&mut self, report: ReportHandle) -> Result<()> {
        self.ensure_running()?;
        self.report = Some(report);
        Ok(())
    }

    /// Deduplicated results: one per (adapter, target), last write wins
    ///
    /// Order follows the position of each pair's latest result.
    pub fn final_results(&self) -> Vec<AgentResult> {
        let mut latest: HashMap<(&str, &str), usize> = HashMap::new();
        for (idx, result) in self.results.iter().enumerate() {
            latest.insert((result.adapter.as_str(), result.target.as_str()), idx);
        }
        let mut indices: Vec<usize> = latest.into_values().collect();
        indices.sort_unstable();
        indices
            .into_iter()
            .map(|idx| self.results[idx].clone())
            .collect()
    }
}
