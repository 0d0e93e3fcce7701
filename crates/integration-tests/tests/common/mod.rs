//! Shared fakes and harness for the end-to-end scenarios

#![allow(dead_code)]

use async_trait::async_trait;
use perfscope_core::application::{
    Aggregator, ExecutionMode, Orchestrator, PollConfig, PollingClient, RecommendationStage,
    Scheduler, StagePlan,
};
use perfscope_core::domain::{
    AdapterId, AgentPayload, AgentResult, Job, JobId, JobStatus, MetricBundle, ReportHandle,
    Target, TargetSet,
};
use perfscope_core::error::{AppError, Result};
use perfscope_core::port::id_provider::SequentialIdProvider;
use perfscope_core::port::job_store::memory::InMemoryJobStore;
use perfscope_core::port::time_provider::SystemTimeProvider;
use perfscope_core::port::{
    Agent, CapabilityError, CapturedImage, FallbackPolicy, JobMutation, JobStore, ReportRenderer,
    TimeProvider, Viewport, VisualCapture,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const MAIN: &str = "https://main.example";
pub const COMP1: &str = "https://comp1.example";
pub const COMP2: &str = "https://comp2.example";

pub fn target(raw: &str) -> Target {
    Target::parse(raw).unwrap()
}

pub fn memory_store() -> Arc<dyn JobStore> {
    Arc::new(InMemoryJobStore::new(
        Arc::new(SequentialIdProvider::default()),
        Arc::new(SystemTimeProvider),
    ))
}

/// Polling tuned for tests: 10ms interval, 60ms budget
pub fn fast_polling() -> Arc<PollingClient> {
    Arc::new(PollingClient::new(PollConfig {
        interval: Duration::from_millis(10),
        max_interval: Duration::from_millis(20),
        backoff_factor: 1.5,
        timeout: Duration::from_millis(60),
        request_timeout: Duration::from_millis(50),
    }))
}

pub fn orchestrator(
    store: Arc<dyn JobStore>,
    renderer: Arc<dyn ReportRenderer>,
    mode: ExecutionMode,
    measurement: Vec<Arc<dyn Agent>>,
    capture: Vec<Arc<dyn Agent>>,
) -> Orchestrator {
    let time: Arc<dyn TimeProvider> = Arc::new(SystemTimeProvider);
    let scheduler = Scheduler::new(
        store.clone(),
        time.clone(),
        Aggregator::new("performance_score"),
        RecommendationStage::new(None, Duration::from_secs(1)),
        renderer.clone(),
        Duration::from_secs(1),
    );
    let plan = StagePlan::build(mode, measurement, capture);
    Orchestrator::new(store, time, scheduler, plan, renderer)
}

/// Poll until the job is terminal, then return its final state
pub async fn wait_terminal(orchestrator: &Orchestrator, job_id: &JobId) -> Job {
    for _ in 0..400 {
        let status = orchestrator.get_status(job_id).await.unwrap();
        if status.status.is_terminal() {
            return orchestrator.get_results(job_id).await.unwrap();
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("job {} never reached a terminal state", job_id);
}

/// Poll until the job is running
pub async fn wait_running(orchestrator: &Orchestrator, job_id: &JobId) {
    for _ in 0..400 {
        let status = orchestrator.get_status(job_id).await.unwrap();
        if status.status == JobStatus::Running {
            return;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    panic!("job {} never started", job_id);
}

// ============================================================================
// Agents
// ============================================================================

/// Reports a fixed performance score per target, fails for unknown targets
pub struct ScoreAgent {
    id: AdapterId,
    scores: HashMap<String, f64>,
}

impl ScoreAgent {
    pub fn new(id: &str, scores: &[(&str, f64)]) -> Arc<dyn Agent> {
        Arc::new(Self {
            id: AdapterId::new(id),
            scores: scores.iter().map(|(t, s)| (t.to_string(), *s)).collect(),
        })
    }
}

#[async_trait]
impl Agent for ScoreAgent {
    fn id(&self) -> &AdapterId {
        &self.id
    }

    fn fallback_policy(&self) -> FallbackPolicy {
        FallbackPolicy::None
    }

    async fn run(&self, target: &Target) -> AgentResult {
        match self.scores.get(target.as_str()) {
            Some(score) => {
                let mut metrics = MetricBundle::new();
                metrics.insert("performance_score".to_string(), *score);
                AgentResult::success(
                    self.id.clone(),
                    target.clone(),
                    AgentPayload::new(metrics, serde_json::Value::Null),
                )
            }
            None => AgentResult::failed(self.id.clone(), target.clone(), "no score configured"),
        }
    }
}

/// Sleeps before answering; counts started and finished runs
pub struct SlowAgent {
    id: AdapterId,
    delay: Duration,
    pub started: AtomicUsize,
    pub finished: AtomicUsize,
}

impl SlowAgent {
    pub fn new(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            id: AdapterId::new("slow"),
            delay,
            started: AtomicUsize::new(0),
            finished: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl Agent for SlowAgent {
    fn id(&self) -> &AdapterId {
        &self.id
    }

    fn fallback_policy(&self) -> FallbackPolicy {
        FallbackPolicy::None
    }

    async fn run(&self, target: &Target) -> AgentResult {
        self.started.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.finished.fetch_add(1, Ordering::SeqCst);
        AgentResult::success(self.id.clone(), target.clone(), AgentPayload::empty())
    }
}

pub struct PanicAgent {
    id: AdapterId,
}

impl PanicAgent {
    pub fn new() -> Arc<dyn Agent> {
        Arc::new(Self {
            id: AdapterId::new("panicky"),
        })
    }
}

#[async_trait]
impl Agent for PanicAgent {
    fn id(&self) -> &AdapterId {
        &self.id
    }

    fn fallback_policy(&self) -> FallbackPolicy {
        FallbackPolicy::None
    }

    async fn run(&self, _target: &Target) -> AgentResult {
        panic!("adapter bug");
    }
}

// ============================================================================
// Capabilities
// ============================================================================

pub struct FakeCapture;

#[async_trait]
impl VisualCapture for FakeCapture {
    async fn capture(
        &self,
        _target: &Target,
        viewport: &Viewport,
    ) -> std::result::Result<CapturedImage, CapabilityError> {
        Ok(CapturedImage {
            bytes: vec![0u8; (viewport.width / 100) as usize],
            location: None,
        })
    }

    async fn discard(&self, _location: &str) -> std::result::Result<(), CapabilityError> {
        Ok(())
    }
}

/// Keeps rendered documents in memory, keyed by location
#[derive(Default)]
pub struct MemoryRenderer {
    pub rendered: AtomicUsize,
    pub discarded: AtomicUsize,
    documents: Mutex<HashMap<String, Vec<u8>>>,
}

#[async_trait]
impl ReportRenderer for MemoryRenderer {
    async fn render(&self, job: &Job) -> std::result::Result<ReportHandle, CapabilityError> {
        self.rendered.fetch_add(1, Ordering::SeqCst);
        let body = serde_json::to_vec(job).map_err(|e| CapabilityError::Malformed(e.to_string()))?;
        let location = format!("mem://{}", job.id);
        let size_bytes = body.len() as u64;
        self.documents.lock().unwrap().insert(location.clone(), body);
        Ok(ReportHandle {
            location,
            format: "json".to_string(),
            size_bytes,
        })
    }

    async fn load(&self, handle: &ReportHandle) -> std::result::Result<Vec<u8>, CapabilityError> {
        self.documents
            .lock()
            .unwrap()
            .get(&handle.location)
            .cloned()
            .ok_or_else(|| CapabilityError::Unavailable(handle.location.clone()))
    }

    async fn discard(&self, handle: &ReportHandle) -> std::result::Result<(), CapabilityError> {
        self.discarded.fetch_add(1, Ordering::SeqCst);
        self.documents.lock().unwrap().remove(&handle.location);
        Ok(())
    }
}

// ============================================================================
// Store wrappers
// ============================================================================

/// Fails exactly one `update` call (the n-th, 1-based) with a store error
pub struct FaultyStore {
    inner: Arc<dyn JobStore>,
    fail_on: usize,
    updates: AtomicUsize,
}

impl FaultyStore {
    pub fn new(inner: Arc<dyn JobStore>, fail_on: usize) -> Self {
        Self {
            inner,
            fail_on,
            updates: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl JobStore for FaultyStore {
    async fn create(&self, targets: TargetSet) -> Result<JobId> {
        self.inner.create(targets).await
    }

    async fn get(&self, id: &JobId) -> Result<Option<Job>> {
        self.inner.get(id).await
    }

    async fn update(&self, id: &JobId, mutation: JobMutation) -> Result<Job> {
        let n = self.updates.fetch_add(1, Ordering::SeqCst) + 1;
        if n == self.fail_on {
            return Err(AppError::Store("disk I/O error".to_string()));
        }
        self.inner.update(id, mutation).await
    }

    async fn delete(&self, id: &JobId) -> Result<()> {
        self.inner.delete(id).await
    }

    async fn count_by_status(&self, status: JobStatus) -> Result<i64> {
        self.inner.count_by_status(status).await
    }

    async fn find_by_status(&self, status: JobStatus) -> Result<Vec<JobId>> {
        self.inner.find_by_status(status).await
    }
}

/// Records (status, progress) after every successful update
pub struct RecordingStore {
    inner: Arc<dyn JobStore>,
    pub history: Mutex<Vec<(JobStatus, u8)>>,
}

impl RecordingStore {
    pub fn new(inner: Arc<dyn JobStore>) -> Self {
        Self {
            inner,
            history: Mutex::new(Vec::new()),
        }
    }

    pub fn history(&self) -> Vec<(JobStatus, u8)> {
        self.history.lock().unwrap().clone()
    }
}

#[async_trait]
impl JobStore for RecordingStore {
    async fn create(&self, targets: TargetSet) -> Result<JobId> {
        self.inner.create(targets).await
    }

    async fn get(&self, id: &JobId) -> Result<Option<Job>> {
        self.inner.get(id).await
    }

    async fn update(&self, id: &JobId, mutation: JobMutation) -> Result<Job> {
        let job = self.inner.update(id, mutation).await?;
        self.history.lock().unwrap().push((job.status, job.progress));
        Ok(job)
    }

    async fn delete(&self, id: &JobId) -> Result<()> {
        self.inner.delete(id).await
    }

    async fn count_by_status(&self, status: JobStatus) -> Result<i64> {
        self.inner.count_by_status(status).await
    }

    async fn find_by_status(&self, status: JobStatus) -> Result<Vec<JobId>> {
        self.inner.find_by_status(status).await
    }
}
