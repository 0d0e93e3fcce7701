// Screenshot adapter, one per viewport

use super::with_browser;
use crate::application::browser_pool::BrowserPool;
use crate::application::constants::SCREENSHOT_ADAPTER_PREFIX;
use crate::domain::{AdapterId, AgentPayload, AgentResult, MetricBundle, Target};
use crate::port::{Agent, FallbackPolicy, Viewport, VisualCapture};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

pub struct ScreenshotAgent {
    id: AdapterId,
    capture: Arc<dyn VisualCapture>,
    viewport: Viewport,
    pool: BrowserPool,
    timeout: Duration,
}

impl ScreenshotAgent {
    pub fn new(
        capture: Arc<dyn VisualCapture>,
        viewport: Viewport,
        pool: BrowserPool,
        timeout: Duration,
    ) -> Self {
        Self {
            id: AdapterId::new(format!("{}:{}", SCREENSHOT_ADAPTER_PREFIX, viewport.name)),
            capture,
            viewport,
            pool,
            timeout,
        }
    }
}

/// One adapter per viewport, sharing the capture capability and pool
pub fn screenshot_agents(
    capture: Arc<dyn VisualCapture>,
    viewports: &[Viewport],
    pool: &BrowserPool,
    timeout: Duration,
) -> Vec<Arc<dyn Agent>> {
    viewports
        .iter()
        .map(|vp| {
            Arc::new(ScreenshotAgent::new(
                capture.clone(),
                vp.clone(),
                pool.clone(),
                timeout,
            )) as Arc<dyn Agent>
        })
        .collect()
}

#[async_trait]
impl Agent for ScreenshotAgent {
    fn id(&self) -> &AdapterId {
        &self.id
    }

    fn fallback_policy(&self) -> FallbackPolicy {
        FallbackPolicy::None
    }

    async fn run(&self, target: &Target) -> AgentResult {
        match with_browser(
            &self.pool,
            self.timeout,
            self.capture.capture(target, &self.viewport),
        )
        .await
        {
            Ok(image) => {
                let details = json!({
                    "viewport": self.viewport.name,
                    "width": self.viewport.width,
                    "height": self.viewport.height,
                    "size_bytes": image.bytes.len(),
                    "location": image.location,
                });
                AgentResult::success(
                    self.id.clone(),
                    target.clone(),
                    AgentPayload::new(MetricBundle::new(), details),
                )
            }
            Err(e) => {
                warn!(adapter = %self.id, target = %target, error = %e, "Screenshot capture failed");
                AgentResult::failed(self.id.clone(), target.clone(), e.to_string())
            }
        }
    }
}
