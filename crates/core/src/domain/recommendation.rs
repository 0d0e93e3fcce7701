// Recommendation Domain Model

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecommendationPriority {
    High,
    Medium,
    Low,
}

impl RecommendationPriority {
    /// Lenient parse for model-generated text
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "high" | "critical" => Some(Self::High),
            "medium" | "moderate" => Some(Self::Medium),
            "low" => Some(Self::Low),
            _ => None,
        }
    }
}

impl fmt::Display for RecommendationPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::High => write!(f, "high"),
            Self::Medium => write!(f, "medium"),
            Self::Low => write!(f, "low"),
        }
    }
}

/// One actionable recommendation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recommendation {
    pub priority: RecommendationPriority,
    pub category: String,
    pub title: String,
    pub description: String,
    pub impact: String,
}

impl Recommendation {
    pub fn new(
        priority: RecommendationPriority,
        category: impl Into<String>,
        title: impl Into<String>,
        description: impl Into<String>,
        impact: impl Into<String>,
    ) -> Self {
        Self {
            priority,
            category: category.into(),
            title: title.into(),
            description: description.into(),
            impact: impact.into(),
        }
    }
}

/// Stable sort by priority, high first
pub fn order_by_priority(recommendations: &mut [Recommendation]) {
    recommendations.sort_by_key(|r| r.priority);
}
