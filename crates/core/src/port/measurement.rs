// Measurement Capability Port
// Local page measurement (browser automation or HTTP timing probe)

use crate::domain::{MetricBundle, Target};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by capabilities wrapped by adapters
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CapabilityError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Timeout after {0}ms")]
    Timeout(u64),

    #[error("Malformed response: {0}")]
    Malformed(String),

    #[error("Missing credentials: {0}")]
    MissingCredentials(String),

    #[error("Resource unavailable: {0}")]
    Unavailable(String),

    #[error("IO error: {0}")]
    Io(String),
}

/// Timing metrics and resource counts of one page load
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageTiming {
    pub ttfb_ms: f64,
    pub fcp_ms: Option<f64>,
    pub lcp_ms: Option<f64>,
    pub cls: Option<f64>,
    pub dom_content_loaded_ms: f64,
    pub load_ms: f64,
    pub resource_count: u32,
    pub total_bytes: u64,
    pub image_count: u32,
    pub script_count: u32,
    pub stylesheet_count: u32,
    pub status_code: Option<u16>,
}

impl PageTiming {
    /// Flatten into named metrics (optional paint metrics only when measured)
    pub fn to_metrics(&self) -> MetricBundle {
        let mut metrics = MetricBundle::new();
        metrics.insert("ttfb_ms".to_string(), self.ttfb_ms);
        metrics.insert(
            "dom_content_loaded_ms".to_string(),
            self.dom_content_loaded_ms,
        );
        metrics.insert("load_ms".to_string(), self.load_ms);
        metrics.insert("resource_count".to_string(), self.resource_count as f64);
        metrics.insert("total_bytes".to_string(), self.total_bytes as f64);
        if let Some(fcp) = self.fcp_ms {
            metrics.insert("fcp_ms".to_string(), fcp);
        }
        if let Some(lcp) = self.lcp_ms {
            metrics.insert("lcp_ms".to_string(), lcp);
        }
        if let Some(cls) = self.cls {
            metrics.insert("cls".to_string(), cls);
        }
        metrics
    }
}

/// Local measurement capability
#[async_trait]
pub trait MeasurementCapability: Send + Sync {
    async fn measure(&self, target: &Target) -> Result<PageTiming, CapabilityError>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Returns a configured timing per target, or a default timing
    pub struct MockMeasurement {
        default: Result<PageTiming, CapabilityError>,
        per_target: HashMap<String, Result<PageTiming, CapabilityError>>,
        calls: AtomicUsize,
    }

    impl MockMeasurement {
        pub fn new(default: PageTiming) -> Self {
            Self {
                default: Ok(default),
                per_target: HashMap::new(),
                calls: AtomicUsize::new(0),
            }
        }

        pub fn failing(error: CapabilityError) -> Self {
            Self {
                default: Err(error),
                per_target: HashMap::new(),
                calls: AtomicUsize::new(0),
            }
        }

        pub fn with_target(
            mut self,
            target: &str,
            timing: Result<PageTiming, CapabilityError>,
        ) -> Self {
            self.per_target.insert(target.to_string(), timing);
            self
        }

        pub fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        /// A fast page: good paint metrics, small payload
        pub fn fast_page() -> PageTiming {
            PageTiming {
                ttfb_ms: 120.0,
                fcp_ms: Some(900.0),
                lcp_ms: Some(1_400.0),
                cls: Some(0.02),
                dom_content_loaded_ms: 800.0,
                load_ms: 1_500.0,
                resource_count: 30,
                total_bytes: 600_000,
                image_count: 10,
                script_count: 6,
                stylesheet_count: 2,
                status_code: Some(200),
            }
        }
    }

    #[async_trait]
    impl MeasurementCapability for MockMeasurement {
        async fn measure(&self, target: &Target) -> Result<PageTiming, CapabilityError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.per_target
                .get(target.as_str())
                .cloned()
                .unwrap_or_else(|| self.default.clone())
        }
    }
}
