//! RPC Method Handlers
//!
//! Thin adapters from JSON-RPC parameters to orchestrator operations.

use crate::error::to_rpc_error;
use crate::types::{
    CreateRequest, CreateResponse, DeleteResponse, HealthResponse, JobIdRequest, ReportResponse,
    ResultsResponse, StatusResponse,
};
use jsonrpsee::types::ErrorObjectOwned;
use perfscope_core::application::Orchestrator;
use perfscope_core::domain::JobStatus;
use perfscope_core::error::AppError;
use tracing::debug;

/// RPC Handler with injected dependencies
pub struct RpcHandler {
    orchestrator: Orchestrator,
}

impl RpcHandler {
    pub fn new(orchestrator: Orchestrator) -> Self {
        Self { orchestrator }
    }

    /// analysis.create.v1
    pub async fn create(&self, params: CreateRequest) -> Result<CreateResponse, ErrorObjectOwned> {
        debug!(
            main = %params.main_url,
            competitors = params.competitor_urls.len(),
            "analysis.create.v1"
        );
        let job_id = self
            .orchestrator
            .create_job(&params.main_url, &params.competitor_urls)
            .await
            .map_err(to_rpc_error)?;

        Ok(CreateResponse {
            job_id,
            status: JobStatus::Queued,
        })
    }

    /// analysis.status.v1
    pub async fn status(&self, params: JobIdRequest) -> Result<StatusResponse, ErrorObjectOwned> {
        let view = self
            .orchestrator
            .get_status(&params.job_id)
            .await
            .map_err(to_rpc_error)?;

        Ok(StatusResponse {
            job_id: view.job_id,
            status: view.status,
            progress: view.progress,
            current_step: view.current_step,
            created_at: view.created_at,
            completed_at: view.completed_at,
        })
    }

    /// analysis.results.v1
    pub async fn results(&self, params: JobIdRequest) -> Result<ResultsResponse, ErrorObjectOwned> {
        let job = self
            .orchestrator
            .get_results(&params.job_id)
            .await
            .map_err(to_rpc_error)?;
        Ok(ResultsResponse::from(job))
    }

    /// analysis.report.v1
    pub async fn report(&self, params: JobIdRequest) -> Result<ReportResponse, ErrorObjectOwned> {
        let (handle, body) = self
            .orchestrator
            .get_report(&params.job_id)
            .await
            .map_err(to_rpc_error)?;

        let document = if handle.format == "json" {
            serde_json::from_slice(&body)
                .map_err(|e| to_rpc_error(AppError::Serialization(e)))?
        } else {
            serde_json::Value::String(String::from_utf8_lossy(&body).into_owned())
        };

        Ok(ReportResponse {
            job_id: params.job_id,
            format: handle.format,
            size_bytes: body.len() as u64,
            document,
        })
    }

    /// analysis.delete.v1
    pub async fn delete(&self, params: JobIdRequest) -> Result<DeleteResponse, ErrorObjectOwned> {
        self.orchestrator
            .delete_job(&params.job_id)
            .await
            .map_err(to_rpc_error)?;

        Ok(DeleteResponse {
            job_id: params.job_id,
            deleted: true,
        })
    }

    /// admin.health.v1
    pub async fn health(&self) -> Result<HealthResponse, ErrorObjectOwned> {
        let report = self.orchestrator.health().await.map_err(to_rpc_error)?;
        Ok(HealthResponse {
            status: report.status,
            active_jobs: report.active_jobs,
            version: perfscope_core::VERSION.to_string(),
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::code;
    use async_trait::async_trait;
    use perfscope_core::application::{
        Aggregator, ExecutionMode, RecommendationStage, Scheduler, StagePlan,
    };
    use perfscope_core::domain::{Job, ReportHandle};
    use perfscope_core::port::id_provider::SequentialIdProvider;
    use perfscope_core::port::job_store::memory::InMemoryJobStore;
    use perfscope_core::port::time_provider::FixedTimeProvider;
    use perfscope_core::port::{CapabilityError, JobStore, ReportRenderer, TimeProvider};
    use std::sync::Arc;
    use std::time::Duration;

    struct NullRenderer;

    #[async_trait]
    impl ReportRenderer for NullRenderer {
        async fn render(&self, job: &Job) -> Result<ReportHandle, CapabilityError> {
            Ok(ReportHandle {
                location: format!("mem://{}", job.id),
                format: "json".to_string(),
                size_bytes: 0,
            })
        }

        async fn load(&self, handle: &ReportHandle) -> Result<Vec<u8>, CapabilityError> {
            Ok(format!(r#"{{"location":"{}"}}"#, handle.location).into_bytes())
        }

        async fn discard(&self, _handle: &ReportHandle) -> Result<(), CapabilityError> {
            Ok(())
        }
    }

    /// Orchestrator without adapters: jobs run analysis and report only
    pub(crate) fn orchestrator() -> Orchestrator {
        let store: Arc<dyn JobStore> = Arc::new(InMemoryJobStore::new(
            Arc::new(SequentialIdProvider::default()),
            Arc::new(FixedTimeProvider(1_000)),
        ));
        let time: Arc<dyn TimeProvider> = Arc::new(FixedTimeProvider(2_000));
        let renderer: Arc<dyn ReportRenderer> = Arc::new(NullRenderer);
        let scheduler = Scheduler::new(
            store.clone(),
            time.clone(),
            Aggregator::new("performance_score"),
            RecommendationStage::new(None, Duration::from_secs(1)),
            renderer.clone(),
            Duration::from_secs(1),
        );
        let plan = StagePlan::build(ExecutionMode::Sequential, vec![], vec![]);
        Orchestrator::new(store, time, scheduler, plan, renderer)
    }

    async fn wait_terminal(handler: &RpcHandler, job_id: &str) -> StatusResponse {
        for _ in 0..200 {
            let status = handler
                .status(JobIdRequest {
                    job_id: job_id.to_string(),
                })
                .await
                .unwrap();
            if status.status.is_terminal() {
                return status;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("job {} did not finish", job_id);
    }

    #[tokio::test]
    async fn test_create_status_results_delete() {
        let handler = RpcHandler::new(orchestrator());

        let created = handler
            .create(CreateRequest {
                main_url: "https://a.example".to_string(),
                competitor_urls: vec!["https://b.example".to_string()],
            })
            .await
            .unwrap();
        assert_eq!(created.status, JobStatus::Queued);

        let status = wait_terminal(&handler, &created.job_id).await;
        assert_eq!(status.status, JobStatus::Completed);
        assert_eq!(status.progress, 100);

        let request = JobIdRequest {
            job_id: created.job_id.clone(),
        };
        let results = handler.results(request.clone()).await.unwrap();
        assert_eq!(results.competitor_urls.len(), 1);
        assert!(results.aggregated.is_some());

        let report = handler.report(request.clone()).await.unwrap();
        assert_eq!(report.format, "json");
        assert_eq!(
            report.document["location"],
            format!("mem://{}", created.job_id)
        );

        assert!(handler.delete(request.clone()).await.unwrap().deleted);
        let err = handler.status(request).await.unwrap_err();
        assert_eq!(err.code(), code::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_invalid_url_is_validation_error() {
        let handler = RpcHandler::new(orchestrator());
        let err = handler
            .create(CreateRequest {
                main_url: "not a url".to_string(),
                competitor_urls: vec![],
            })
            .await
            .unwrap_err();
        assert_eq!(err.code(), code::VALIDATION_ERROR);
    }

    #[tokio::test]
    async fn test_delete_unknown_is_not_found() {
        let handler = RpcHandler::new(orchestrator());
        let err = handler
            .delete(JobIdRequest {
                job_id: "nope".to_string(),
            })
            .await
            .unwrap_err();
        assert_eq!(err.code(), code::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_report_of_unknown_job_is_not_found() {
        let handler = RpcHandler::new(orchestrator());
        let err = handler
            .report(JobIdRequest {
                job_id: "nope".to_string(),
            })
            .await
            .unwrap_err();
        assert_eq!(err.code(), code::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_health_reports_version() {
        let handler = RpcHandler::new(orchestrator());
        let health = tokio_test::assert_ok!(handler.health().await);
        assert_eq!(health.status, "ok");
        assert_eq!(health.active_jobs, 0);
        assert_eq!(health.version, perfscope_core::VERSION);
    }
}
