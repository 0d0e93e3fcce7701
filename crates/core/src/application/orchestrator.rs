//! Orchestrator
//!
//! Owns the lifecycle of every job: validates targets, creates the job,
//! spawns one task per job that drives the scheduler, and finalizes state.
//! `Running -> Failed` is reserved for orchestrator faults (store errors,
//! violated invariants, a panicking job task); adapter failures never fail
//! a job.

use crate::application::cancel::{cancel_channel, CancelHandle, CancelToken};
use crate::application::scheduler::{RunOutcome, Scheduler, StagePlan};
use crate::domain::{Job, JobId, JobStatus, ReportHandle, TargetSet};
use crate::error::{AppError, Result};
use crate::application::constants::SCREENSHOT_ADAPTER_PREFIX;
use crate::port::{JobStore, ReportRenderer, TimeProvider, VisualCapture};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

/// Lightweight status view for polling clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStatusView {
    pub job_id: JobId,
    pub status: JobStatus,
    pub progress: u8,
    pub current_step: String,
    pub created_at: i64,
    pub completed_at: Option<i64>,
}

impl From<&Job> for JobStatusView {
    fn from(job: &Job) -> Self {
        Self {
            job_id: job.id.clone(),
            status: job.status,
            progress: job.progress,
            current_step: job.current_step.clone(),
            created_at: job.created_at,
            completed_at: job.completed_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: String,
    pub active_jobs: i64,
}

/// Shared state of the job tasks
struct Inner {
    store: Arc<dyn JobStore>,
    time_provider: Arc<dyn TimeProvider>,
    scheduler: Scheduler,
    plan: StagePlan,
    running: Mutex<HashMap<JobId, CancelHandle>>,
}

#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
    renderer: Arc<dyn ReportRenderer>,
    capture: Option<Arc<dyn VisualCapture>>,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn JobStore>,
        time_provider: Arc<dyn TimeProvider>,
        scheduler: Scheduler,
        plan: StagePlan,
        renderer: Arc<dyn ReportRenderer>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                time_provider,
                scheduler,
                plan,
                running: Mutex::new(HashMap::new()),
            }),
            renderer,
            capture: None,
        }
    }

    /// Remove persisted screenshots through `capture` when a job is deleted
    pub fn with_capture_cleanup(mut self, capture: Arc<dyn VisualCapture>) -> Self {
        self.capture = Some(capture);
        self
    }

    /// Validate targets, store a `Queued` job and start it in the background
    pub async fn create_job(&self, main: &str, competitors: &[String]) -> Result<JobId> {
        let targets = TargetSet::parse(main, competitors)
            .map_err(|e| AppError::TargetValidation(e.to_string()))?;

        let job_id = self.inner.store.create(targets.clone()).await?;
        info!(
            job_id = %job_id,
            main = %targets.main,
            competitors = targets.competitors.len(),
            "Job created"
        );

        let (handle, token) = cancel_channel();
        self.inner
            .running
            .lock()
            .await
            .insert(job_id.clone(), handle);

        let inner = self.inner.clone();
        let id = job_id.clone();
        tokio::spawn(async move { supervise(inner, id, targets, token).await });

        Ok(job_id)
    }

    pub async fn get_status(&self, job_id: &JobId) -> Result<JobStatusView> {
        let job = self.load(job_id).await?;
        Ok(JobStatusView::from(&job))
    }

    /// Full final state; `NotReady` until the job is terminal
    pub async fn get_results(&self, job_id: &JobId) -> Result<Job> {
        let job = self.load(job_id).await?;
        if !job.is_terminal() {
            return Err(AppError::NotReady(format!(
                "job {} is {} ({}%)",
                job_id, job.status, job.progress
            )));
        }
        Ok(job)
    }

    /// Rendered report of a terminal job
    ///
    /// `NotReady` while the job runs; `ReportUnavailable` when no report was
    /// rendered (failed job, render error) or the artifact is gone.
    pub async fn get_report(&self, job_id: &JobId) -> Result<(ReportHandle, Vec<u8>)> {
        let job = self.get_results(job_id).await?;
        let handle = job.report.ok_or_else(|| {
            AppError::ReportUnavailable(format!("job {} has no rendered report", job_id))
        })?;

        let body = self.renderer.load(&handle).await.map_err(|e| {
            warn!(job_id = %job_id, error = %e, "Failed to load report");
            AppError::ReportUnavailable(format!("job {}: {}", job_id, e))
        })?;
        Ok((handle, body))
    }

    /// Cancel a running job and remove it together with its report
    pub async fn delete_job(&self, job_id: &JobId) -> Result<()> {
        if let Some(handle) = self.inner.running.lock().await.remove(job_id) {
            handle.cancel();
        }

        // Snapshot after cancelling so a report written just before is seen
        let job = self.load(job_id).await?;
        self.inner.store.delete(job_id).await?;

        if let Some(report) = &job.report {
            if let Err(e) = self.renderer.discard(report).await {
                warn!(job_id = %job_id, error = %e, "Failed to discard report");
            }
        }
        if let Some(capture) = &self.capture {
            for location in screenshot_locations(&job) {
                if let Err(e) = capture.discard(&location).await {
                    warn!(job_id = %job_id, location = %location, error = %e, "Failed to discard screenshot");
                }
            }
        }
        info!(job_id = %job_id, "Job deleted");
        Ok(())
    }

    pub async fn health(&self) -> Result<HealthReport> {
        let queued = self.inner.store.count_by_status(JobStatus::Queued).await?;
        let running = self.inner.store.count_by_status(JobStatus::Running).await?;
        Ok(HealthReport {
            status: "ok".to_string(),
            active_jobs: queued + running,
        })
    }

    /// Cancel every in-flight job (process shutdown)
    pub async fn shutdown(&self) {
        let mut running = self.inner.running.lock().await;
        for (job_id, handle) in running.drain() {
            info!(job_id = %job_id, "Cancelling job on shutdown");
            handle.cancel();
        }
    }

    async fn load(&self, job_id: &JobId) -> Result<Job> {
        self.inner
            .store
            .get(job_id)
            .await?
            .ok_or_else(|| AppError::NotFound(job_id.clone()))
    }
}

/// Files written by screenshot adapters, as recorded in their result details
fn screenshot_locations(job: &Job) -> Vec<String> {
    job.results
        .iter()
        .filter(|r| r.adapter.as_str().starts_with(SCREENSHOT_ADAPTER_PREFIX))
        .filter_map(|r| r.payload.details.get("location")?.as_str())
        .map(str::to_string)
        .collect()
}

/// Run a job on its own task and turn a panic into an orchestrator fault
async fn supervise(inner: Arc<Inner>, job_id: JobId, targets: TargetSet, token: CancelToken) {
    let task = tokio::spawn(run_job(
        inner.clone(),
        job_id.clone(),
        targets,
        token.clone(),
    ));

    if let Err(e) = task.await {
        if e.is_panic() && !token.is_cancelled() {
            error!(job_id = %job_id, "Job task panicked");
            fail(&inner, &job_id, "job task panicked").await;
        }
    }
    inner.running.lock().await.remove(&job_id);
}

async fn run_job(inner: Arc<Inner>, job_id: JobId, targets: TargetSet, token: CancelToken) {
    let now = inner.time_provider.now_millis();
    match inner
        .store
        .update(&job_id, Box::new(move |job| job.start(now)))
        .await
    {
        Ok(_) => info!(job_id = %job_id, "Job started"),
        Err(e) if e.is_not_found() => return,
        Err(e) => {
            error!(job_id = %job_id, error = %e, "Could not start job");
            return;
        }
    }

    let outcome = inner
        .scheduler
        .execute(&job_id, &targets, &inner.plan, &token)
        .await;

    match outcome {
        Ok(RunOutcome::Finished) => {
            let now = inner.time_provider.now_millis();
            match inner
                .store
                .update(&job_id, Box::new(move |job| job.complete(now)))
                .await
            {
                Ok(job) => info!(
                    job_id = %job_id,
                    results = job.results.len(),
                    errors = job.errors.len(),
                    "Job completed"
                ),
                Err(e) if e.is_not_found() => {}
                Err(e) => {
                    error!(job_id = %job_id, error = %e, "Job could not complete");
                    fail(&inner, &job_id, &e.to_string()).await;
                }
            }
        }
        Ok(RunOutcome::Cancelled) => info!(job_id = %job_id, "Job cancelled"),
        Err(e) => {
            error!(job_id = %job_id, error = %e, "Orchestrator fault");
            fail(&inner, &job_id, &e.to_string()).await;
        }
    }
}

/// Best-effort `Running -> Failed`
async fn fail(inner: &Inner, job_id: &JobId, reason: &str) {
    let now = inner.time_provider.now_millis();
    let reason = reason.to_string();
    if let Err(e) = inner
        .store
        .update(job_id, Box::new(move |job| job.fail(now, reason)))
        .await
    {
        if !e.is_not_found() {
            error!(job_id = %job_id, error = %e, "Could not mark job failed");
        }
    }
}
