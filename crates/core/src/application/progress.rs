//! Progress Reporter
//!
//! Maps completed stage weight to a percentage:
//! `floor(99 * done_weight / total_weight)` while running. 100 is written
//! only by the terminal transition. The job model itself refuses to lower
//! progress, so a late or repeated report can never move it backwards.

use crate::domain::JobId;
use crate::error::Result;
use crate::port::JobStore;
use std::sync::Arc;
use tracing::debug;

/// Stage weight bookkeeping
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressTracker {
    total_weight: u32,
    done_weight: u32,
}

impl ProgressTracker {
    pub fn new(total_weight: u32) -> Self {
        Self {
            total_weight,
            done_weight: 0,
        }
    }

    /// Mark `weight` as done and return the running percentage
    pub fn complete(&mut self, weight: u32) -> u8 {
        self.done_weight = (self.done_weight + weight).min(self.total_weight);
        self.percent()
    }

    pub fn percent(&self) -> u8 {
        if self.total_weight == 0 {
            return 0;
        }
        (99 * self.done_weight as u64 / self.total_weight as u64) as u8
    }

    pub fn total_weight(&self) -> u32 {
        self.total_weight
    }
}

/// Writes stage progress of one job into the store
pub struct ProgressReporter {
    store: Arc<dyn JobStore>,
    job_id: JobId,
    tracker: ProgressTracker,
}

impl ProgressReporter {
    pub fn new(store: Arc<dyn JobStore>, job_id: JobId, total_weight: u32) -> Self {
        Self {
            store,
            job_id,
            tracker: ProgressTracker::new(total_weight),
        }
    }

    /// Announce the stage about to run without changing the percentage
    pub async fn begin(&self, step: impl Into<String>) -> Result<()> {
        let percent = self.tracker.percent();
        let step = step.into();
        self.store
            .update(
                &self.job_id,
                Box::new(move |job| job.advance_progress(percent, step)),
            )
            .await?;
        Ok(())
    }

    /// Record a finished stage
    pub async fn finish(&mut self, weight: u32, step: impl Into<String>) -> Result<u8> {
        let percent = self.tracker.complete(weight);
        let step = step.into();
        debug!(job_id = %self.job_id, progress = percent, step = %step, "Stage finished");

        let job = self
            .store
            .update(
                &self.job_id,
                Box::new(move |job| job.advance_progress(percent, step)),
            )
            .await?;
        Ok(job.progress)
    }

    pub fn tracker(&self) -> &ProgressTracker {
        &self.tracker
    }
}
