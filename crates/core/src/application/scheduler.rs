//! Stage Scheduler
//!
//! Interprets a declarative [`StagePlan`] for one job:
//! - `Task`: one adapter over every target, one target at a time
//! - `Group`: several adapters over all targets concurrently, joined without
//!   short-circuit
//! - `Analyze`: aggregate final results and generate recommendations
//! - `Report`: render the final job state
//!
//! Every adapter invocation runs on its own spawned task, so a panicking
//! adapter yields a `Failed` result instead of tearing the job down. Each
//! stage's writes land in the store before the next stage starts, and the
//! progress reporter runs after every stage.

use crate::application::aggregator::Aggregator;
use crate::application::cancel::CancelToken;
use crate::application::constants::{LOCAL_ADAPTER, REPORT_ADAPTER, SCREENSHOT_ADAPTER_PREFIX};
use crate::application::progress::ProgressReporter;
use crate::application::recommend::RecommendationStage;
use crate::domain::{AdapterId, AgentPayload, AgentResult, Job, JobId, Target, TargetSet};
use crate::error::{AppError, Result};
use crate::port::{Agent, JobMutation, JobStore, ReportRenderer, TimeProvider};
use futures::future::join_all;
use serde_json::json;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinError;
use tracing::{debug, error, info, warn};

/// Progress weight of the analyze and report stages
pub const ANALYZE_WEIGHT: u32 = 1;
pub const REPORT_WEIGHT: u32 = 1;

/// Progress weight of one adapter: local 3, screenshot 2, external provider 4
pub fn adapter_weight(id: &AdapterId) -> u32 {
    let id = id.as_str();
    if id == LOCAL_ADAPTER {
        3
    } else if id.starts_with(SCREENSHOT_ADAPTER_PREFIX) {
        2
    } else {
        4
    }
}

/// How measurement adapters are arranged into stages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    Sequential,
    Parallel,
}

impl FromStr for ExecutionMode {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sequential" => Ok(ExecutionMode::Sequential),
            "parallel" => Ok(ExecutionMode::Parallel),
            other => Err(AppError::Config(format!(
                "unknown execution mode '{}' (expected sequential or parallel)",
                other
            ))),
        }
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionMode::Sequential => write!(f, "sequential"),
            ExecutionMode::Parallel => write!(f, "parallel"),
        }
    }
}

/// One step of a plan
#[derive(Clone)]
pub enum Stage {
    Task(Arc<dyn Agent>),
    Group {
        label: String,
        agents: Vec<Arc<dyn Agent>>,
    },
    Analyze,
    Report,
}

impl Stage {
    pub fn weight(&self) -> u32 {
        match self {
            Stage::Task(agent) => adapter_weight(agent.id()),
            Stage::Group { agents, .. } => agents.iter().map(|a| adapter_weight(a.id())).sum(),
            Stage::Analyze => ANALYZE_WEIGHT,
            Stage::Report => REPORT_WEIGHT,
        }
    }

    pub fn label(&self) -> String {
        match self {
            Stage::Task(agent) => format!("Running {} analysis", agent.id()),
            Stage::Group { label, .. } => label.clone(),
            Stage::Analyze => "Analyzing results and generating recommendations".to_string(),
            Stage::Report => "Generating report".to_string(),
        }
    }
}

impl fmt::Debug for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Task(agent) => write!(f, "Task({})", agent.id()),
            Stage::Group { agents, .. } => {
                let ids: Vec<&str> = agents.iter().map(|a| a.id().as_str()).collect();
                write!(f, "Group({})", ids.join(", "))
            }
            Stage::Analyze => write!(f, "Analyze"),
            Stage::Report => write!(f, "Report"),
        }
    }
}

/// Ordered stages executed for every job
#[derive(Debug, Clone)]
pub struct StagePlan {
    stages: Vec<Stage>,
}

impl StagePlan {
    /// Build the plan for a mode
    ///
    /// Sequential: every adapter is its own task. Parallel: measurement
    /// adapters form one group, capture adapters another. Both end with
    /// Analyze then Report.
    pub fn build(
        mode: ExecutionMode,
        measurement: Vec<Arc<dyn Agent>>,
        capture: Vec<Arc<dyn Agent>>,
    ) -> Self {
        let mut stages = Vec::new();
        match mode {
            ExecutionMode::Sequential => {
                stages.extend(measurement.into_iter().map(Stage::Task));
                stages.extend(capture.into_iter().map(Stage::Task));
            }
            ExecutionMode::Parallel => {
                if !measurement.is_empty() {
                    stages.push(Stage::Group {
                        label: "Running performance measurements".to_string(),
                        agents: measurement,
                    });
                }
                if !capture.is_empty() {
                    stages.push(Stage::Group {
                        label: "Capturing screenshots".to_string(),
                        agents: capture,
                    });
                }
            }
        }
        stages.push(Stage::Analyze);
        stages.push(Stage::Report);
        Self { stages }
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn total_weight(&self) -> u32 {
        self.stages.iter().map(Stage::weight).sum()
    }
}

/// How a plan execution ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every stage ran; the job is ready to complete
    Finished,
    /// The job was deleted or cancelled; nothing more may be written
    Cancelled,
}

/// Stage interpreter shared by all jobs
pub struct Scheduler {
    store: Arc<dyn JobStore>,
    time_provider: Arc<dyn TimeProvider>,
    aggregator: Aggregator,
    recommendation: RecommendationStage,
    renderer: Arc<dyn ReportRenderer>,
    report_timeout: Duration,
}

impl Scheduler {
    pub fn new(
        store: Arc<dyn JobStore>,
        time_provider: Arc<dyn TimeProvider>,
        aggregator: Aggregator,
        recommendation: RecommendationStage,
        renderer: Arc<dyn ReportRenderer>,
        report_timeout: Duration,
    ) -> Self {
        Self {
            store,
            time_provider,
            aggregator,
            recommendation,
            renderer,
            report_timeout,
        }
    }

    /// Execute `plan` for a running job
    ///
    /// Store `NotFound` means the job was deleted and is reported as
    /// `Cancelled`; any other store error is returned to the caller.
    pub async fn execute(
        &self,
        job_id: &JobId,
        targets: &TargetSet,
        plan: &StagePlan,
        cancel: &CancelToken,
    ) -> Result<RunOutcome> {
        let mut progress =
            ProgressReporter::new(self.store.clone(), job_id.clone(), plan.total_weight());

        for stage in plan.stages() {
            if cancel.is_cancelled() {
                return Ok(RunOutcome::Cancelled);
            }

            let label = stage.label();
            info!(job_id = %job_id, stage = ?stage, "Stage started");
            if missing(progress.begin(label.clone()).await)?.is_none() {
                return Ok(RunOutcome::Cancelled);
            }

            let outcome = match stage {
                Stage::Task(agent) => self.run_task(job_id, agent, targets, cancel).await?,
                Stage::Group { agents, .. } => {
                    self.run_group(job_id, agents, targets, cancel).await?
                }
                Stage::Analyze => self.run_analyze(job_id, targets).await?,
                Stage::Report => self.run_report(job_id, cancel).await?,
            };
            if outcome == RunOutcome::Cancelled || cancel.is_cancelled() {
                return Ok(RunOutcome::Cancelled);
            }

            let step = format!("{} (done)", label);
            match missing(progress.finish(stage.weight(), step).await)? {
                Some(percent) => {
                    debug!(job_id = %job_id, stage = ?stage, progress = percent, "Stage finished")
                }
                None => return Ok(RunOutcome::Cancelled),
            }
        }

        Ok(RunOutcome::Finished)
    }

    async fn run_task(
        &self,
        job_id: &JobId,
        agent: &Arc<dyn Agent>,
        targets: &TargetSet,
        cancel: &CancelToken,
    ) -> Result<RunOutcome> {
        for target in targets.all() {
            let results = match run_batch(vec![(agent.clone(), target)], cancel).await {
                Some(results) => results,
                None => return Ok(RunOutcome::Cancelled),
            };
            if self.record(job_id, results, cancel).await? == RunOutcome::Cancelled {
                return Ok(RunOutcome::Cancelled);
            }
        }
        Ok(RunOutcome::Finished)
    }

    async fn run_group(
        &self,
        job_id: &JobId,
        agents: &[Arc<dyn Agent>],
        targets: &TargetSet,
        cancel: &CancelToken,
    ) -> Result<RunOutcome> {
        let all = targets.all();
        let pairs: Vec<(Arc<dyn Agent>, Target)> = agents
            .iter()
            .flat_map(|agent| all.iter().map(move |t| (agent.clone(), t.clone())))
            .collect();

        match run_batch(pairs, cancel).await {
            Some(results) => self.record(job_id, results, cancel).await,
            None => Ok(RunOutcome::Cancelled),
        }
    }

    async fn run_analyze(&self, job_id: &JobId, targets: &TargetSet) -> Result<RunOutcome> {
        let job = match self.store.get(job_id).await? {
            Some(job) => job,
            None => return Ok(RunOutcome::Cancelled),
        };

        let aggregated = self.aggregator.aggregate(targets, &job.final_results());
        info!(
            job_id = %job_id,
            ranked = aggregated.ranking.len(),
            outperforms = aggregated.main_outperforms.len(),
            underperforms = aggregated.main_underperforms.len(),
            "Metrics aggregated"
        );

        let (recommendations, result) = self.recommendation.run(&targets.main, &aggregated).await;
        let now = self.time_provider.now_millis();
        let mutation: JobMutation = Box::new(move |job| {
            job.record_result(result, now)?;
            job.set_analysis(aggregated, recommendations)
        });
        self.write(job_id, mutation).await
    }

    /// Render and attach the report
    ///
    /// A report rendered for a job that is cancelled or deleted meanwhile is
    /// discarded here, since the deleting side may not have seen its handle.
    async fn run_report(&self, job_id: &JobId, cancel: &CancelToken) -> Result<RunOutcome> {
        let job = match self.store.get(job_id).await? {
            Some(job) => job,
            None => return Ok(RunOutcome::Cancelled),
        };

        let adapter = AdapterId::new(REPORT_ADAPTER);
        let main = job.targets.main.clone();
        let now = self.time_provider.now_millis();

        // Render the state the job will have once completed
        let mut preview: Job = job.clone();
        let rendered = match preview.complete(now) {
            Ok(()) => {
                match tokio::time::timeout(self.report_timeout, self.renderer.render(&preview)).await
                {
                    Ok(result) => result.map_err(|e| e.to_string()),
                    Err(_) => Err(format!(
                        "report rendering timed out after {}ms",
                        self.report_timeout.as_millis()
                    )),
                }
            }
            Err(e) => Err(e.to_string()),
        };

        let mut orphan = None;
        let mutation: JobMutation = match rendered {
            Ok(handle) => {
                info!(job_id = %job_id, location = %handle.location, "Report rendered");
                orphan = Some(handle.clone());
                let details = json!({
                    "location": handle.location,
                    "format": handle.format,
                    "size_bytes": handle.size_bytes,
                });
                let result = AgentResult::success(
                    adapter,
                    main,
                    AgentPayload::new(Default::default(), details),
                );
                Box::new(move |job| {
                    job.record_result(result, now)?;
                    job.set_report(handle)
                })
            }
            Err(e) => {
                warn!(job_id = %job_id, error = %e, "Report rendering failed");
                let result = AgentResult::failed(adapter, main, e);
                Box::new(move |job| job.record_result(result, now))
            }
        };

        let outcome = self.write(job_id, mutation).await?;
        if outcome == RunOutcome::Cancelled || cancel.is_cancelled() {
            if let Some(handle) = orphan {
                debug!(job_id = %job_id, location = %handle.location, "Discarding report of cancelled job");
                if let Err(e) = self.renderer.discard(&handle).await {
                    warn!(job_id = %job_id, error = %e, "Failed to discard report");
                }
            }
            return Ok(RunOutcome::Cancelled);
        }
        Ok(outcome)
    }

    /// Write adapter results in plan order unless the job was cancelled
    async fn record(
        &self,
        job_id: &JobId,
        results: Vec<AgentResult>,
        cancel: &CancelToken,
    ) -> Result<RunOutcome> {
        if cancel.is_cancelled() {
            debug!(job_id = %job_id, discarded = results.len(), "Discarding results of cancelled job");
            return Ok(RunOutcome::Cancelled);
        }

        let now = self.time_provider.now_millis();
        let mutation: JobMutation = Box::new(move |job| {
            for result in results {
                job.record_result(result, now)?;
            }
            Ok(())
        });
        self.write(job_id, mutation).await
    }

    async fn write(&self, job_id: &JobId, mutation: JobMutation) -> Result<RunOutcome> {
        match missing(self.store.update(job_id, mutation).await)? {
            Some(_) => Ok(RunOutcome::Finished),
            None => Ok(RunOutcome::Cancelled),
        }
    }
}

/// Map a store `NotFound` to `None`
fn missing<T>(result: Result<T>) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}

/// Run every (adapter, target) pair on its own task and join them all
///
/// Returns results in input order, or `None` if cancellation arrived first
/// (in-flight tasks are aborted and their results dropped).
async fn run_batch(
    pairs: Vec<(Arc<dyn Agent>, Target)>,
    cancel: &CancelToken,
) -> Option<Vec<AgentResult>> {
    let mut handles: Vec<_> = pairs
        .iter()
        .map(|(agent, target)| {
            let agent = agent.clone();
            let target = target.clone();
            tokio::spawn(async move { agent.run(&target).await })
        })
        .collect();
    let aborts: Vec<_> = handles.iter().map(|h| h.abort_handle()).collect();

    let mut cancelled = cancel.clone();
    let joined = tokio::select! {
        joined = join_all(handles.iter_mut()) => joined,
        _ = cancelled.cancelled() => {
            for abort in &aborts {
                abort.abort();
            }
            return None;
        }
    };

    Some(
        joined
            .into_iter()
            .zip(pairs)
            .map(|(joined, (agent, target))| resolve(joined, agent.id(), target))
            .collect(),
    )
}

/// Turn a joined adapter task into a result; a panic becomes `Failed`
fn resolve(
    joined: std::result::Result<AgentResult, JoinError>,
    adapter: &AdapterId,
    target: Target,
) -> AgentResult {
    match joined {
        Ok(result) => result,
        Err(e) if e.is_panic() => {
            error!(adapter = %adapter, target = %target, "Adapter panicked");
            AgentResult::failed(adapter.clone(), target, "adapter panicked")
        }
        Err(e) => AgentResult::failed(adapter.clone(), target, format!("adapter task aborted: {}", e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::cancel::cancel_channel;
    use crate::domain::{AgentOutcome, MetricBundle, ReportHandle};
    use crate::port::id_provider::SequentialIdProvider;
    use crate::port::job_store::memory::InMemoryJobStore;
    use crate::port::time_provider::FixedTimeProvider;
    use crate::port::{CapabilityError, FallbackPolicy};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Scores by target, records every invocation
    struct FakeAgent {
        id: AdapterId,
        score: f64,
        panic_on: Option<String>,
        calls: Mutex<Vec<String>>,
    }

    impl FakeAgent {
        fn new(id: &str, score: f64) -> Arc<Self> {
            Arc::new(Self {
                id: AdapterId::new(id),
                score,
                panic_on: None,
                calls: Mutex::new(Vec::new()),
            })
        }

        fn panicking_on(id: &str, target: &str) -> Arc<Self> {
            Arc::new(Self {
                id: AdapterId::new(id),
                score: 0.0,
                panic_on: Some(target.to_string()),
                calls: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl Agent for FakeAgent {
        fn id(&self) -> &AdapterId {
            &self.id
        }

        fn fallback_policy(&self) -> FallbackPolicy {
            FallbackPolicy::None
        }

        async fn run(&self, target: &Target) -> AgentResult {
            self.calls.lock().unwrap().push(target.to_string());
            if self.panic_on.as_deref() == Some(target.as_str()) {
                panic!("fake adapter panic");
            }
            let mut metrics = MetricBundle::new();
            metrics.insert("performance_score".to_string(), self.score);
            AgentResult::success(
                self.id.clone(),
                target.clone(),
                AgentPayload::new(metrics, serde_json::Value::Null),
            )
        }
    }

    struct NullRenderer;

    #[async_trait]
    impl ReportRenderer for NullRenderer {
        async fn render(&self, job: &Job) -> std::result::Result<ReportHandle, CapabilityError> {
            Ok(ReportHandle {
                location: format!("mem://{}", job.id),
                format: "json".to_string(),
                size_bytes: 0,
            })
        }

        async fn load(&self, _handle: &ReportHandle) -> std::result::Result<Vec<u8>, CapabilityError> {
            Ok(b"{}".to_vec())
        }

        async fn discard(&self, _handle: &ReportHandle) -> std::result::Result<(), CapabilityError> {
            Ok(())
        }
    }

    fn scheduler(store: Arc<dyn JobStore>) -> Scheduler {
        Scheduler::new(
            store,
            Arc::new(FixedTimeProvider(5)),
            Aggregator::new("performance_score"),
            RecommendationStage::new(None, Duration::from_secs(1)),
            Arc::new(NullRenderer),
            Duration::from_secs(1),
        )
    }

    async fn running_job(store: &Arc<dyn JobStore>, targets: &TargetSet) -> JobId {
        let id = store.create(targets.clone()).await.unwrap();
        store
            .update(&id, Box::new(|job| job.start(1)))
            .await
            .unwrap();
        id
    }

    fn store() -> Arc<dyn JobStore> {
        Arc::new(InMemoryJobStore::new(
            Arc::new(SequentialIdProvider::default()),
            Arc::new(FixedTimeProvider(0)),
        ))
    }

    fn two_targets() -> TargetSet {
        TargetSet::parse("https://main.example", &["https://c1.example".to_string()]).unwrap()
    }

    #[test]
    fn test_plan_shapes() {
        let measure: Vec<Arc<dyn Agent>> = vec![
            FakeAgent::new("local", 1.0),
            FakeAgent::new("webpagetest", 1.0),
            FakeAgent::new("gtmetrix", 1.0),
        ];
        let capture: Vec<Arc<dyn Agent>> = vec![
            FakeAgent::new("screenshot:desktop", 0.0),
            FakeAgent::new("screenshot:mobile", 0.0),
        ];

        let seq = StagePlan::build(ExecutionMode::Sequential, measure.clone(), capture.clone());
        assert_eq!(seq.stages().len(), 7);
        let par = StagePlan::build(ExecutionMode::Parallel, measure, capture);
        assert_eq!(par.stages().len(), 4);

        // 3 + 4 + 4 + 2 + 2 + 1 + 1 in both modes
        assert_eq!(seq.total_weight(), 17);
        assert_eq!(par.total_weight(), 17);
    }

    #[test]
    fn test_parse_mode() {
        assert_eq!(
            "Parallel".parse::<ExecutionMode>().unwrap(),
            ExecutionMode::Parallel
        );
        assert!("fast".parse::<ExecutionMode>().is_err());
    }

    #[tokio::test]
    async fn test_sequential_runs_targets_in_order() {
        let store = store();
        let targets = two_targets();
        let id = running_job(&store, &targets).await;
        let local = FakeAgent::new("local", 70.0);
        let plan = StagePlan::build(ExecutionMode::Sequential, vec![local.clone()], vec![]);
        let (_handle, token) = cancel_channel();

        let outcome = scheduler(store.clone())
            .execute(&id, &targets, &plan, &token)
            .await
            .unwrap();
        assert_eq!(outcome, RunOutcome::Finished);
        assert_eq!(
            *local.calls.lock().unwrap(),
            vec!["https://main.example", "https://c1.example"]
        );

        let job = store.get(&id).await.unwrap().unwrap();
        assert_eq!(job.progress, 99);
        assert!(job.aggregated.is_some());
        assert!(!job.recommendations.is_empty());
        assert_eq!(job.report.as_ref().unwrap().location, format!("mem://{}", id));
        // local x2, recommendation, report
        assert_eq!(job.results.len(), 4);
        assert!(job.errors.is_empty());
    }

    #[tokio::test]
    async fn test_group_panic_becomes_failed_result() {
        let store = store();
        let targets = two_targets();
        let id = running_job(&store, &targets).await;
        let plan = StagePlan::build(
            ExecutionMode::Parallel,
            vec![
                FakeAgent::new("local", 50.0),
                FakeAgent::panicking_on("webpagetest", "https://c1.example"),
            ],
            vec![],
        );
        let (_handle, token) = cancel_channel();

        let outcome = scheduler(store.clone())
            .execute(&id, &targets, &plan, &token)
            .await
            .unwrap();
        assert_eq!(outcome, RunOutcome::Finished);

        let job = store.get(&id).await.unwrap().unwrap();
        let failed: Vec<&AgentResult> = job
            .results
            .iter()
            .filter(|r| r.outcome == AgentOutcome::Failed)
            .collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].adapter.as_str(), "webpagetest");
        assert_eq!(job.errors.len(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_before_start_writes_nothing() {
        let store = store();
        let targets = two_targets();
        let id = running_job(&store, &targets).await;
        let local = FakeAgent::new("local", 70.0);
        let plan = StagePlan::build(ExecutionMode::Sequential, vec![local.clone()], vec![]);
        let (handle, token) = cancel_channel();
        handle.cancel();

        let outcome = scheduler(store.clone())
            .execute(&id, &targets, &plan, &token)
            .await
            .unwrap();
        assert_eq!(outcome, RunOutcome::Cancelled);
        assert!(local.calls.lock().unwrap().is_empty());
        assert!(store.get(&id).await.unwrap().unwrap().results.is_empty());
    }

    #[tokio::test]
    async fn test_deleted_job_is_cancelled_not_error() {
        let store = store();
        let targets = two_targets();
        let id = running_job(&store, &targets).await;
        store.delete(&id).await.unwrap();
        let plan = StagePlan::build(
            ExecutionMode::Sequential,
            vec![FakeAgent::new("local", 1.0)],
            vec![],
        );
        let (_handle, token) = cancel_channel();

        let outcome = scheduler(store)
            .execute(&id, &targets, &plan, &token)
            .await
            .unwrap();
        assert_eq!(outcome, RunOutcome::Cancelled);
    }
}
