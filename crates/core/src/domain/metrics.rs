// Aggregated Metrics Domain Model

use crate::domain::target::Target;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Named numeric metrics (`fcp_ms`, `performance_score`, ...)
pub type MetricBundle = BTreeMap<String, f64>;

/// Averaged metrics for one target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetMetrics {
    pub target: Target,
    pub is_main: bool,
    /// Mean of every metric name across usable results (empty on a gap)
    pub averages: MetricBundle,
    /// Primary score, 0.0 when no usable result reported it
    pub primary_score: f64,
    /// Number of usable results that fed the averages
    pub sample_count: usize,
}

impl TargetMetrics {
    pub fn has_data(&self) -> bool {
        self.sample_count > 0
    }

    pub fn metric(&self, name: &str) -> Option<f64> {
        self.averages.get(name).copied()
    }
}

/// One entry of the rank ordering (rank is 1-based)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedTarget {
    pub rank: usize,
    pub target: Target,
    pub score: f64,
}

/// Human-readable summary of the main site
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub overall: String,
    pub ranking: String,
    pub key_metrics: String,
}

/// Result of aggregation, computed once per job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedMetrics {
    pub primary_metric: String,
    /// Per-target averages in input order (main first)
    pub targets: Vec<TargetMetrics>,
    /// Every target best primary score first; empty when no target has data
    pub ranking: Vec<RankedTarget>,
    /// Competitors the main site strictly beats
    pub main_outperforms: Vec<Target>,
    /// Competitors that strictly beat the main site
    pub main_underperforms: Vec<Target>,
    pub summary: Summary,
}

impl AggregatedMetrics {
    /// Well-defined result with no targets and an empty ranking
    pub fn empty(primary_metric: impl Into<String>) -> Self {
        Self {
            primary_metric: primary_metric.into(),
            targets: Vec::new(),
            ranking: Vec::new(),
            main_outperforms: Vec::new(),
            main_underperforms: Vec::new(),
            summary: Summary::default(),
        }
    }

    pub fn main(&self) -> Option<&TargetMetrics> {
        self.targets.iter().find(|t| t.is_main)
    }

    pub fn for_target(&self, target: &Target) -> Option<&TargetMetrics> {
        self.targets.iter().find(|t| &t.target == target)
    }

    pub fn rank_of(&self, target: &Target) -> Option<usize> {
        self.ranking
            .iter()
            .find(|r| &r.target == target)
            .map(|r| r.rank)
    }
}
