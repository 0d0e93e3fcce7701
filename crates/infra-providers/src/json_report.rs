// JSON report renderer
// One pretty-printed file per job under the reports directory.

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use perfscope_core::domain::{Job, ReportHandle};
use perfscope_core::port::{CapabilityError, ReportRenderer};
use serde::Serialize;
use std::io::ErrorKind;
use std::path::PathBuf;
use tracing::{debug, info};

#[derive(Serialize)]
struct ReportDocument<'a> {
    generated_at: String,
    generator: &'static str,
    job: &'a Job,
}

pub struct JsonReportRenderer {
    dir: PathBuf,
}

impl JsonReportRenderer {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, job: &Job) -> PathBuf {
        let safe: String = job
            .id
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("perfscope-report-{}.json", safe))
    }
}

/// Job timestamps are epoch ms; reports carry RFC 3339
fn rfc3339(millis: i64) -> String {
    Utc.timestamp_millis_opt(millis)
        .single()
        .map(|t| t.to_rfc3339())
        .unwrap_or_default()
}

#[async_trait]
impl ReportRenderer for JsonReportRenderer {
    async fn render(&self, job: &Job) -> Result<ReportHandle, CapabilityError> {
        let document = ReportDocument {
            generated_at: rfc3339(job.completed_at.unwrap_or(job.created_at)),
            generator: concat!("perfscope ", env!("CARGO_PKG_VERSION")),
            job,
        };
        let body = serde_json::to_vec_pretty(&document)
            .map_err(|e| CapabilityError::Malformed(e.to_string()))?;

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| CapabilityError::Io(e.to_string()))?;
        let path = self.path_for(job);
        tokio::fs::write(&path, &body)
            .await
            .map_err(|e| CapabilityError::Io(format!("{}: {}", path.display(), e)))?;

        info!(job_id = %job.id, path = %path.display(), size = body.len(), "Report written");
        Ok(ReportHandle {
            location: path.display().to_string(),
            format: "json".to_string(),
            size_bytes: body.len() as u64,
        })
    }

    async fn load(&self, handle: &ReportHandle) -> Result<Vec<u8>, CapabilityError> {
        tokio::fs::read(&handle.location).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => {
                CapabilityError::Unavailable(format!("report {} is missing", handle.location))
            }
            _ => CapabilityError::Io(format!("{}: {}", handle.location, e)),
        })
    }

    async fn discard(&self, handle: &ReportHandle) -> Result<(), CapabilityError> {
        match tokio::fs::remove_file(&handle.location).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(location = %handle.location, "Report already gone");
                Ok(())
            }
            Err(e) => Err(CapabilityError::Io(e.to_string())),
        }
    }
}
