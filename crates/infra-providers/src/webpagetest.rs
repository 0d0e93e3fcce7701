// WebPageTest provider
// Submit via runtest.php, poll jsonResult.php until statusCode 200.

use crate::http::{build_client, put_number, status_error, transport_error};
use async_trait::async_trait;
use perfscope_core::domain::{AgentPayload, MetricBundle, Target};
use perfscope_core::port::provider::TestOptions;
use perfscope_core::port::{CapabilityError, PollStatus, ProviderError, TestId, TestProvider};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_BASE_URL: &str = "https://www.webpagetest.org";
pub const DEFAULT_LOCATION: &str = "Dulles:Chrome";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Envelope {
    status_code: i64,
    #[serde(default)]
    status_text: Option<String>,
    #[serde(default)]
    data: Value,
}

pub struct WebPageTestProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl WebPageTestProvider {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        request_timeout: Duration,
    ) -> Result<Self, CapabilityError> {
        Ok(Self {
            client: build_client(request_timeout)?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    async fn envelope(&self, request: reqwest::RequestBuilder) -> Result<Envelope, ProviderError> {
        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, &body));
        }
        response
            .json::<Envelope>()
            .await
            .map_err(|e| ProviderError::Malformed(e.to_string()))
    }
}

#[async_trait]
impl TestProvider for WebPageTestProvider {
    fn name(&self) -> &str {
        "webpagetest"
    }

    async fn submit(&self, target: &Target, options: &TestOptions) -> Result<TestId, ProviderError> {
        let location = options.location.as_deref().unwrap_or(DEFAULT_LOCATION);
        let runs = options.runs.max(1).to_string();
        let request = self
            .client
            .post(format!("{}/runtest.php", self.base_url))
            .query(&[
                ("url", target.as_str()),
                ("k", self.api_key.as_str()),
                ("f", "json"),
                ("location", location),
                ("runs", runs.as_str()),
                ("fvonly", "1"),
                ("lighthouse", "1"),
            ]);

        let envelope = self
            .envelope(request)
            .await
            .map_err(|e| match e {
                ProviderError::Provider(msg) => ProviderError::Submission(msg),
                other => other,
            })?;
        if envelope.status_code != 200 {
            return Err(ProviderError::Submission(
                envelope
                    .status_text
                    .unwrap_or_else(|| format!("statusCode {}", envelope.status_code)),
            ));
        }

        let test_id = envelope
            .data
            .get("testId")
            .and_then(Value::as_str)
            .ok_or_else(|| ProviderError::Malformed("missing data.testId".to_string()))?;
        debug!(target = %target, test_id, "WebPageTest test submitted");
        Ok(test_id.to_string())
    }

    async fn fetch(&self, test_id: &TestId) -> Result<PollStatus, ProviderError> {
        let request = self
            .client
            .get(format!("{}/jsonResult.php", self.base_url))
            .query(&[("test", test_id.as_str()), ("k", self.api_key.as_str())]);
        let envelope = self.envelope(request).await?;

        match envelope.status_code {
            200 => Ok(PollStatus::Complete(parse_result(&envelope.data)?)),
            code if code < 200 => Ok(PollStatus::Pending),
            code => Err(ProviderError::Provider(
                envelope
                    .status_text
                    .unwrap_or_else(|| format!("statusCode {}", code)),
            )),
        }
    }
}

/// Extract first-view metrics of run 1
pub fn parse_result(data: &Value) -> Result<AgentPayload, ProviderError> {
    let first_view = data
        .pointer("/runs/1/firstView")
        .ok_or_else(|| ProviderError::Malformed("missing runs.1.firstView".to_string()))?;

    let mut metrics = MetricBundle::new();
    put_number(&mut metrics, "load_ms", first_view.get("loadTime"));
    put_number(&mut metrics, "ttfb_ms", first_view.get("TTFB"));
    put_number(&mut metrics, "start_render_ms", first_view.get("render"));
    put_number(&mut metrics, "fully_loaded_ms", first_view.get("fullyLoaded"));
    put_number(&mut metrics, "speed_index", first_view.get("SpeedIndex"));
    put_number(&mut metrics, "fcp_ms", first_view.get("firstContentfulPaint"));
    put_number(
        &mut metrics,
        "lcp_ms",
        first_view.pointer("/chromeUserTiming.LargestContentfulPaint"),
    );
    put_number(
        &mut metrics,
        "cls",
        first_view.pointer("/chromeUserTiming.CumulativeLayoutShift"),
    );
    put_number(&mut metrics, "tbt_ms", first_view.get("TotalBlockingTime"));
    put_number(&mut metrics, "total_bytes", first_view.get("bytesIn"));
    put_number(&mut metrics, "resource_count", first_view.get("requests"));

    // Lighthouse reports 0..1
    if let Some(score) = first_view
        .pointer("/lighthouse.Performance")
        .and_then(Value::as_f64)
        .filter(|s| s.is_finite())
    {
        metrics.insert("performance_score".to_string(), (score * 100.0).round());
    }

    let details = json!({
        "summary_url": data.get("summary"),
        "location": data.get("location"),
    });
    Ok(AgentPayload::new(metrics, details))
}
