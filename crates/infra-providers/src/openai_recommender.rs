// OpenAI-compatible chat completion recommender
// The model answers free text; the first JSON array in it is the result.

use crate::http::{build_client, capability_error};
use async_trait::async_trait;
use perfscope_core::domain::recommendation::order_by_priority;
use perfscope_core::domain::{AggregatedMetrics, Recommendation, RecommendationPriority, Target};
use perfscope_core::port::{CapabilityError, Recommender};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4-turbo";

const SYSTEM_PROMPT: &str = "You are a senior web performance consultant. Give specific, \
technical, actionable recommendations focused on Core Web Vitals (FCP, LCP, CLS, TTFB). \
Quantify expected improvements where possible.";

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

/// Loosely typed item as the model writes it
#[derive(Debug, Deserialize)]
struct RawRecommendation {
    #[serde(default)]
    priority: String,
    #[serde(default)]
    category: String,
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    impact: String,
}

pub struct OpenAiRecommender {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    timeout: Duration,
    array: Regex,
}

impl OpenAiRecommender {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, CapabilityError> {
        Ok(Self {
            client: build_client(timeout)?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
            timeout,
            array: Regex::new(r"(?s)\[.*\]")
                .map_err(|e| CapabilityError::Unavailable(e.to_string()))?,
        })
    }

    fn prompt(main: &Target, metrics: &AggregatedMetrics) -> String {
        let context = json!({
            "url": main,
            "main_site": metrics.main(),
            "ranking": metrics.ranking,
            "outperforms": metrics.main_outperforms,
            "underperforms": metrics.main_underperforms,
            "summary": metrics.summary,
        });
        let context = serde_json::to_string_pretty(&context).unwrap_or_default();
        format!(
            "Analyze these performance metrics and provide 8-12 prioritized recommendations:\n\n\
             {}\n\n\
             Answer with a JSON array of objects with the fields \
             \"priority\" (high|medium|low), \"category\", \"title\", \"description\" and \"impact\".",
            context
        )
    }

    /// Pull the recommendation array out of the model's answer
    fn extract(&self, content: &str) -> Result<Vec<Recommendation>, CapabilityError> {
        let array = self
            .array
            .find(content)
            .ok_or_else(|| CapabilityError::Malformed("no JSON array in answer".to_string()))?;
        let raw: Vec<RawRecommendation> = serde_json::from_str(array.as_str())
            .map_err(|e| CapabilityError::Malformed(e.to_string()))?;

        let mut recommendations: Vec<Recommendation> = raw
            .into_iter()
            .filter(|r| !r.title.trim().is_empty())
            .map(|r| {
                Recommendation::new(
                    RecommendationPriority::parse(&r.priority)
                        .unwrap_or(RecommendationPriority::Medium),
                    if r.category.is_empty() {
                        "Performance".to_string()
                    } else {
                        r.category
                    },
                    r.title,
                    r.description,
                    r.impact,
                )
            })
            .collect();
        order_by_priority(&mut recommendations);
        Ok(recommendations)
    }
}

#[async_trait]
impl Recommender for OpenAiRecommender {
    fn name(&self) -> &str {
        "openai"
    }

    async fn recommend(
        &self,
        main: &Target,
        metrics: &AggregatedMetrics,
    ) -> Result<Vec<Recommendation>, CapabilityError> {
        let request = ChatRequest {
            model: &self.model,
            temperature: 0.3,
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: Self::prompt(main, metrics),
                },
            ],
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| capability_error(e, self.timeout))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CapabilityError::Network(format!(
                "chat API error {}: {}",
                status,
                body.chars().take(200).collect::<String>()
            )));
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| CapabilityError::Malformed(e.to_string()))?;
        let content = chat
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| CapabilityError::Malformed("empty choices".to_string()))?;

        let recommendations = self.extract(&content)?;
        debug!(main = %main, count = recommendations.len(), "Model recommendations parsed");
        Ok(recommendations)
    }
}
