// HTTP timing probe
// Measures time to first byte and full download of the HTML document and
// counts the sub-resources it references. Paint metrics need a browser and
// are reported as unmeasured.

use crate::http::{build_client, capability_error};
use async_trait::async_trait;
use perfscope_core::domain::Target;
use perfscope_core::port::{CapabilityError, MeasurementCapability, PageTiming};
use regex::Regex;
use std::time::{Duration, Instant};
use tracing::debug;

/// Sub-resource counts found in an HTML document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResourceCounts {
    pub images: u32,
    pub scripts: u32,
    pub stylesheets: u32,
}

impl ResourceCounts {
    pub fn total(&self) -> u32 {
        self.images + self.scripts + self.stylesheets
    }
}

struct ResourceScanner {
    image: Regex,
    script: Regex,
    stylesheet: Regex,
}

impl ResourceScanner {
    fn new() -> Result<Self, CapabilityError> {
        let compile = |pattern: &str| {
            Regex::new(pattern).map_err(|e| CapabilityError::Unavailable(e.to_string()))
        };
        Ok(Self {
            image: compile(r#"(?i)<img\b[^>]*\bsrc\s*="#)?,
            script: compile(r#"(?i)<script\b[^>]*\bsrc\s*="#)?,
            stylesheet: compile(r#"(?i)<link\b[^>]*\brel\s*=\s*["']?stylesheet"#)?,
        })
    }

    fn scan(&self, html: &str) -> ResourceCounts {
        ResourceCounts {
            images: self.image.find_iter(html).count() as u32,
            scripts: self.script.find_iter(html).count() as u32,
            stylesheets: self.stylesheet.find_iter(html).count() as u32,
        }
    }
}

/// Largest document body read per measurement
pub const DEFAULT_MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

pub struct HttpTimingProbe {
    client: reqwest::Client,
    scanner: ResourceScanner,
    timeout: Duration,
    max_body_bytes: usize,
}

impl HttpTimingProbe {
    pub fn new(timeout: Duration) -> Result<Self, CapabilityError> {
        Ok(Self {
            client: build_client(timeout)?,
            scanner: ResourceScanner::new()?,
            timeout,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        })
    }

    /// Bytes past this limit are not downloaded; load time and size cover the
    /// prefix that was read
    pub fn with_max_body_bytes(mut self, max_body_bytes: usize) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }

    async fn read_body(
        &self,
        mut response: reqwest::Response,
    ) -> Result<(Vec<u8>, bool), CapabilityError> {
        let mut body = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| capability_error(e, self.timeout))?
        {
            let room = self.max_body_bytes - body.len();
            if chunk.len() > room {
                body.extend_from_slice(&chunk[..room]);
                return Ok((body, true));
            }
            body.extend_from_slice(&chunk);
        }
        Ok((body, false))
    }
}

#[async_trait]
impl MeasurementCapability for HttpTimingProbe {
    async fn measure(&self, target: &Target) -> Result<PageTiming, CapabilityError> {
        let started = Instant::now();
        let response = self
            .client
            .get(target.as_str())
            .send()
            .await
            .map_err(|e| capability_error(e, self.timeout))?;
        let ttfb_ms = started.elapsed().as_secs_f64() * 1_000.0;
        let status = response.status().as_u16();

        let (body, truncated) = self.read_body(response).await?;
        let load_ms = started.elapsed().as_secs_f64() * 1_000.0;

        let counts = self.scanner.scan(&String::from_utf8_lossy(&body));
        debug!(
            target = %target,
            status,
            ttfb_ms,
            load_ms,
            bytes = body.len(),
            truncated,
            resources = counts.total(),
            "Probe finished"
        );

        Ok(PageTiming {
            ttfb_ms,
            fcp_ms: None,
            lcp_ms: None,
            cls: None,
            dom_content_loaded_ms: load_ms,
            load_ms,
            resource_count: counts.total(),
            total_bytes: body.len() as u64,
            image_count: counts.images,
            script_count: counts.scripts,
            stylesheet_count: counts.stylesheets,
            status_code: Some(status),
        })
    }
}
