// Report Rendering Port

use crate::domain::{Job, ReportHandle};
use crate::port::measurement::CapabilityError;
use async_trait::async_trait;

/// Renders the final job state into a report artifact
#[async_trait]
pub trait ReportRenderer: Send + Sync {
    async fn render(&self, job: &Job) -> Result<ReportHandle, CapabilityError>;

    /// Read back the rendered document
    async fn load(&self, handle: &ReportHandle) -> Result<Vec<u8>, CapabilityError>;

    /// Remove a previously rendered report (job deletion)
    async fn discard(&self, handle: &ReportHandle) -> Result<(), CapabilityError>;
}
