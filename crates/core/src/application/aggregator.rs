//! Aggregator
//!
//! Merges the deduplicated per-(adapter, target) results of a job into
//! per-target averages, a rank ordering by the primary score, and the
//! main-vs-competitor comparison sets. Pure and synchronous: it never fails,
//! an input with no usable data yields an empty ranking.

use crate::domain::{
    AgentResult, AggregatedMetrics, MetricBundle, RankedTarget, Summary, Target, TargetMetrics,
    TargetSet,
};
use std::collections::BTreeMap;
use tracing::debug;

pub struct Aggregator {
    primary_metric: String,
}

impl Aggregator {
    pub fn new(primary_metric: impl Into<String>) -> Self {
        Self {
            primary_metric: primary_metric.into(),
        }
    }

    pub fn primary_metric(&self) -> &str {
        &self.primary_metric
    }

    /// Aggregate `results` (at most one per adapter and target) for `targets`
    pub fn aggregate(&self, targets: &TargetSet, results: &[AgentResult]) -> AggregatedMetrics {
        let per_target: Vec<TargetMetrics> = targets
            .all()
            .into_iter()
            .map(|target| {
                let is_main = targets.is_main(&target);
                self.average_target(target, is_main, results)
            })
            .collect();

        let ranking = rank(&per_target);
        let (main_outperforms, main_underperforms) = compare(&per_target);
        let summary = summarize(&per_target, &ranking, &targets.main, &self.primary_metric);

        AggregatedMetrics {
            primary_metric: self.primary_metric.clone(),
            targets: per_target,
            ranking,
            main_outperforms,
            main_underperforms,
            summary,
        }
    }

    fn average_target(
        &self,
        target: Target,
        is_main: bool,
        results: &[AgentResult],
    ) -> TargetMetrics {
        let mut sums: BTreeMap<&str, (f64, usize)> = BTreeMap::new();
        let mut sample_count = 0;

        for result in results
            .iter()
            .filter(|r| r.target == target && r.outcome.is_usable())
        {
            let mut contributed = false;
            for (name, value) in &result.payload.metrics {
                if !value.is_finite() {
                    continue;
                }
                let entry = sums.entry(name.as_str()).or_insert((0.0, 0));
                entry.0 += value;
                entry.1 += 1;
                contributed = true;
            }
            if contributed {
                sample_count += 1;
            }
        }

        let averages: MetricBundle = sums
            .into_iter()
            .map(|(name, (sum, n))| (name.to_string(), sum / n as f64))
            .collect();

        if sample_count == 0 {
            debug!(target = %target, "Aggregation gap: no usable metrics");
        }

        let primary_score = averages.get(&self.primary_metric).copied().unwrap_or(0.0);

        TargetMetrics {
            target,
            is_main,
            averages,
            primary_score,
            sample_count,
        }
    }
}

/// Every target, best score first; ties keep input order
///
/// A target without usable results competes with its zero score. When no
/// target has any data there is nothing to rank.
fn rank(targets: &[TargetMetrics]) -> Vec<RankedTarget> {
    if !targets.iter().any(TargetMetrics::has_data) {
        return Vec::new();
    }

    let mut ordered: Vec<&TargetMetrics> = targets.iter().collect();
    // sort_by is stable
    ordered.sort_by(|a, b| b.primary_score.total_cmp(&a.primary_score));

    ordered
        .into_iter()
        .enumerate()
        .map(|(idx, t)| RankedTarget {
            rank: idx + 1,
            target: t.target.clone(),
            score: t.primary_score,
        })
        .collect()
}

/// Competitors strictly beaten by the main site, and those strictly beating it
fn compare(targets: &[TargetMetrics]) -> (Vec<Target>, Vec<Target>) {
    let mut outperforms = Vec::new();
    let mut underperforms = Vec::new();

    if !targets.iter().any(TargetMetrics::has_data) {
        return (outperforms, underperforms);
    }
    let main = match targets.iter().find(|t| t.is_main) {
        Some(main) => main,
        None => return (outperforms, underperforms),
    };

    for competitor in targets.iter().filter(|t| !t.is_main) {
        if main.primary_score > competitor.primary_score {
            outperforms.push(competitor.target.clone());
        } else if main.primary_score < competitor.primary_score {
            underperforms.push(competitor.target.clone());
        }
    }
    (outperforms, underperforms)
}

fn summarize(
    targets: &[TargetMetrics],
    ranking: &[RankedTarget],
    main: &Target,
    primary_metric: &str,
) -> Summary {
    let main_metrics = targets.iter().find(|t| t.is_main);

    let overall = match main_metrics {
        Some(m) if m.metric(primary_metric).is_some() => rating(m.primary_score).to_string(),
        _ => "Unknown - Not enough data to rate this site.".to_string(),
    };

    let ranking_text = match ranking.iter().find(|r| &r.target == main) {
        Some(r) => format!("Ranked {} out of {} sites", r.rank, ranking.len()),
        None => "Unranked (no site reported data)".to_string(),
    };

    let key_metrics = main_metrics
        .map(key_metrics)
        .unwrap_or_else(|| "Metrics unavailable".to_string());

    Summary {
        overall,
        ranking: ranking_text,
        key_metrics,
    }
}

fn rating(score: f64) -> &'static str {
    if score >= 90.0 {
        "Excellent - Your site has outstanding performance!"
    } else if score >= 75.0 {
        "Good - Your site performs well with room for optimization."
    } else if score >= 50.0 {
        "Fair - Your site needs performance improvements."
    } else {
        "Poor - Your site has significant performance issues."
    }
}

fn key_metrics(site: &TargetMetrics) -> String {
    let mut parts = Vec::new();

    if let Some(fcp) = site.metric("fcp_ms").filter(|v| *v > 0.0) {
        let label = if fcp < 1_800.0 {
            "good"
        } else if fcp < 3_000.0 {
            "needs improvement"
        } else {
            "poor"
        };
        parts.push(format!("FCP: {:.0}ms ({})", fcp, label));
    }

    if let Some(lcp) = site.metric("lcp_ms").filter(|v| *v > 0.0) {
        let label = if lcp < 2_500.0 {
            "good"
        } else if lcp < 4_000.0 {
            "needs improvement"
        } else {
            "poor"
        };
        parts.push(format!("LCP: {:.0}ms ({})", lcp, label));
    }

    if parts.is_empty() {
        "Metrics unavailable".to_string()
    } else {
        parts.join(", ")
    }
}
