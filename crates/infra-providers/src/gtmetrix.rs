// GTmetrix provider (API 2.0, JSON:API documents, HTTP basic auth)

use crate::http::{build_client, put_number, status_error, transport_error};
use async_trait::async_trait;
use perfscope_core::domain::{AgentPayload, MetricBundle, Target};
use perfscope_core::port::provider::TestOptions;
use perfscope_core::port::{CapabilityError, PollStatus, ProviderError, TestId, TestProvider};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_BASE_URL: &str = "https://gtmetrix.com/api/2.0";

#[derive(Debug, Serialize)]
struct TestRequest<'a> {
    data: TestRequestData<'a>,
}

#[derive(Debug, Serialize)]
struct TestRequestData<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    attributes: TestRequestAttributes<'a>,
}

#[derive(Debug, Serialize)]
struct TestRequestAttributes<'a> {
    url: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    location: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct Document {
    data: Resource,
}

#[derive(Debug, Deserialize)]
struct Resource {
    id: String,
    #[serde(default)]
    attributes: Value,
    #[serde(default)]
    links: Value,
}

pub struct GtMetrixProvider {
    client: reqwest::Client,
    base_url: String,
    username: String,
    api_key: String,
}

impl GtMetrixProvider {
    /// `username` defaults to the API key, which GTmetrix accepts as the basic-auth user
    pub fn new(
        base_url: impl Into<String>,
        username: Option<String>,
        api_key: impl Into<String>,
        request_timeout: Duration,
    ) -> Result<Self, CapabilityError> {
        let api_key = api_key.into();
        Ok(Self {
            client: build_client(request_timeout)?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            username: username.unwrap_or_else(|| api_key.clone()),
            api_key,
        })
    }

    async fn document(&self, request: reqwest::RequestBuilder) -> Result<Document, ProviderError> {
        let response = request
            .basic_auth(&self.username, Some(&self.api_key))
            .send()
            .await
            .map_err(transport_error)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, &body));
        }
        response
            .json::<Document>()
            .await
            .map_err(|e| ProviderError::Malformed(e.to_string()))
    }
}

#[async_trait]
impl TestProvider for GtMetrixProvider {
    fn name(&self) -> &str {
        "gtmetrix"
    }

    async fn submit(&self, target: &Target, options: &TestOptions) -> Result<TestId, ProviderError> {
        let body = TestRequest {
            data: TestRequestData {
                kind: "test",
                attributes: TestRequestAttributes {
                    url: target.as_str(),
                    location: options.location.as_deref(),
                },
            },
        };
        let request = self
            .client
            .post(format!("{}/tests", self.base_url))
            .json(&body);

        let document = self.document(request).await.map_err(|e| match e {
            ProviderError::Provider(msg) => ProviderError::Submission(msg),
            other => other,
        })?;
        debug!(target = %target, test_id = %document.data.id, "GTmetrix test submitted");
        Ok(document.data.id)
    }

    async fn fetch(&self, test_id: &TestId) -> Result<PollStatus, ProviderError> {
        let request = self
            .client
            .get(format!("{}/tests/{}", self.base_url, test_id));
        let document = self.document(request).await?;
        interpret(&document.data)
    }
}

fn interpret(resource: &Resource) -> Result<PollStatus, ProviderError> {
    let attributes = &resource.attributes;
    match attributes.get("state").and_then(Value::as_str) {
        Some("completed") => Ok(PollStatus::Complete(parse_attributes(
            attributes,
            &resource.links,
        ))),
        Some("error") => Err(ProviderError::Provider(
            attributes
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("test failed")
                .to_string(),
        )),
        _ => Ok(PollStatus::Pending),
    }
}

/// Map report attributes to metric names shared with the other adapters
pub fn parse_attributes(attributes: &Value, links: &Value) -> AgentPayload {
    let mut metrics = MetricBundle::new();
    put_number(&mut metrics, "performance_score", attributes.get("performance_score"));
    put_number(&mut metrics, "structure_score", attributes.get("structure_score"));
    put_number(&mut metrics, "fully_loaded_ms", attributes.get("fully_loaded_time"));
    put_number(&mut metrics, "total_bytes", attributes.get("page_bytes"));
    put_number(&mut metrics, "resource_count", attributes.get("page_elements"));
    put_number(&mut metrics, "ttfb_ms", attributes.get("time_to_first_byte"));
    put_number(&mut metrics, "fcp_ms", attributes.get("first_contentful_paint"));
    put_number(&mut metrics, "lcp_ms", attributes.get("largest_contentful_paint"));
    put_number(&mut metrics, "tti_ms", attributes.get("time_to_interactive"));
    put_number(&mut metrics, "tbt_ms", attributes.get("total_blocking_time"));
    put_number(&mut metrics, "cls", attributes.get("cumulative_layout_shift"));
    put_number(&mut metrics, "speed_index", attributes.get("speed_index"));

    let details = json!({
        "gtmetrix_grade": attributes.get("gtmetrix_grade"),
        "report_url": links.get("report_url"),
    });
    AgentPayload::new(metrics, details)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resource(attributes: Value) -> Resource {
        Resource {
            id: "t-1".to_string(),
            attributes,
            links: json!({"report_url": "https://gtmetrix.com/reports/x/"}),
        }
    }

    #[test]
    fn test_request_body_is_json_api() {
        let body = TestRequest {
            data: TestRequestData {
                kind: "test",
                attributes: TestRequestAttributes {
                    url: "https://a.example/",
                    location: None,
                },
            },
        };
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            json!({"data": {"type": "test", "attributes": {"url": "https://a.example/"}}})
        );
    }

    #[test]
    fn test_completed_state_yields_metrics() {
        let status = interpret(&resource(json!({
            "state": "completed",
            "gtmetrix_grade": "B",
            "performance_score": 82,
            "structure_score": 90,
            "time_to_first_byte": 210,
            "largest_contentful_paint": 2400,
            "cumulative_layout_shift": 0.12,
            "page_bytes": 2_048_000
        })))
        .unwrap();

        let PollStatus::Complete(payload) = status else {
            panic!("expected completion");
        };
        assert_eq!(payload.metrics.get("performance_score"), Some(&82.0));
        assert_eq!(payload.metrics.get("lcp_ms"), Some(&2400.0));
        assert_eq!(payload.metrics.get("total_bytes"), Some(&2_048_000.0));
        assert_eq!(payload.details["gtmetrix_grade"], json!("B"));
    }

    #[test]
    fn test_queued_and_started_are_pending() {
        for state in ["queued", "started"] {
            let status = interpret(&resource(json!({ "state": state }))).unwrap();
            assert_eq!(status, PollStatus::Pending);
        }
    }

    #[test]
    fn test_error_state_is_provider_error() {
        let err = interpret(&resource(json!({"state": "error", "error": "Page timed out"})))
            .unwrap_err();
        assert_eq!(err, ProviderError::Provider("Page timed out".to_string()));
    }

    #[test]
    fn test_document_parses_submission_response() {
        let document: Document = serde_json::from_value(json!({
            "data": {"type": "test", "id": "abc123", "attributes": {"state": "queued"}}
        }))
        .unwrap();
        assert_eq!(document.data.id, "abc123");
    }
}
