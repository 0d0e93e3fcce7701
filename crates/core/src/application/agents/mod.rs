// Agent Adapters
//
// Each adapter wraps one capability behind the uniform `Agent` contract and
// converts every capability error into a Failed or Fallback result.

mod external;
mod local;
mod screenshot;

pub use external::{external_agent, EstimatedTestAgent, ExternalTestAgent};
pub use local::{web_vitals_score, LocalAgent};
pub use screenshot::{screenshot_agents, ScreenshotAgent};

use crate::application::browser_pool::BrowserPool;
use crate::port::CapabilityError;
use std::future::Future;
use std::time::Duration;

/// Run a browser-backed capability call under a pool lease and a timeout
///
/// The lease is held for the whole call and dropped on every exit path.
pub(crate) async fn with_browser<T, F>(
    pool: &BrowserPool,
    timeout: Duration,
    call: F,
) -> Result<T, CapabilityError>
where
    F: Future<Output = Result<T, CapabilityError>>,
{
    let _lease = pool.checkout().await?;
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(CapabilityError::Timeout(timeout.as_millis() as u64)),
    }
}
