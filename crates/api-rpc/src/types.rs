//! RPC Request/Response Types
//!
//! JSON-RPC method parameters and results.

use perfscope_core::domain::{
    AggregatedMetrics, AgentResult, ErrorEntry, Job, JobStatus, Recommendation, ReportHandle,
    Target,
};
use serde::{Deserialize, Serialize};

/// analysis.create.v1 - Start an analysis job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRequest {
    pub main_url: String,
    #[serde(default)]
    pub competitor_urls: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateResponse {
    pub job_id: String,
    pub status: JobStatus,
}

/// analysis.status.v1 / analysis.results.v1 / analysis.delete.v1
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobIdRequest {
    pub job_id: String,
}

/// analysis.report.v1 - The rendered report document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportResponse {
    pub job_id: String,
    pub format: String,
    pub size_bytes: u64,
    /// Parsed JSON for `json` reports, the raw text otherwise
    pub document: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub job_id: String,
    pub status: JobStatus,
    pub progress: u8,
    pub current_step: String,
    pub created_at: i64,
    pub completed_at: Option<i64>,
}

/// Final state of a terminal job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultsResponse {
    pub job_id: String,
    pub status: JobStatus,
    pub main_url: Target,
    pub competitor_urls: Vec<Target>,
    pub results: Vec<AgentResult>,
    pub errors: Vec<ErrorEntry>,
    pub aggregated: Option<AggregatedMetrics>,
    pub recommendations: Vec<Recommendation>,
    pub report: Option<ReportHandle>,
    pub failure_reason: Option<String>,
    pub created_at: i64,
    pub completed_at: Option<i64>,
}

impl From<Job> for ResultsResponse {
    fn from(job: Job) -> Self {
        Self {
            job_id: job.id,
            status: job.status,
            main_url: job.targets.main,
            competitor_urls: job.targets.competitors,
            results: job.results,
            errors: job.errors,
            aggregated: job.aggregated,
            recommendations: job.recommendations,
            report: job.report,
            failure_reason: job.failure_reason,
            created_at: job.created_at,
            completed_at: job.completed_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteResponse {
    pub job_id: String,
    pub deleted: bool,
}

/// admin.health.v1
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub active_jobs: i64,
    pub version: String,
}
