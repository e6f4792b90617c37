//! Score distribution diagnostics

use super::threshold::count_below;
use crate::utils::stats;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

/// Percentile levels reported for every evaluated split
pub const PERCENTILES: [u8; 9] = [1, 5, 10, 25, 50, 75, 90, 95, 99];

/// Summary of a decision-score distribution against the fitted offset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreDiagnostics {
    pub n_samples: usize,
    pub n_anomalies: usize,
    pub anomaly_ratio: f64,
    pub expected_contamination: f64,
    /// |anomaly_ratio - expected_contamination|
    pub contamination_error: f64,
    pub offset: f64,
    pub scores_below_offset: usize,
    pub score_mean: f64,
    pub score_std: f64,
    pub score_min: f64,
    pub score_max: f64,
    /// Keyed "p1", "p5", ... "p99"
    pub percentiles: BTreeMap<String, f64>,
    pub health: HealthFlags,
}

/// Coarse sanity checks on the score distribution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthFlags {
    /// Score std > 0.01
    pub good_variance: bool,
    /// Anomaly ratio within 0.05 of the expected contamination
    pub reasonable_contamination: bool,
    /// Some scores below -0.01
    pub negative_scores_present: bool,
}

impl HealthFlags {
    pub fn is_healthy(&self) -> bool {
        self.good_variance && self.reasonable_contamination && self.negative_scores_present
    }
}

impl ScoreDiagnostics {
    /// Evaluate decision scores against `offset`
    pub fn evaluate(scores: &[f64], offset: f64, expected_contamination: f64) -> Self {
        let summary = stats::StatsSummary::from_values(scores);
        let sorted = stats::sorted(scores);
        let n_anomalies = count_below(scores, offset);
        let anomaly_ratio = if scores.is_empty() {
            0.0
        } else {
            n_anomalies as f64 / scores.len() as f64
        };
        let contamination_error = (anomaly_ratio - expected_contamination).abs();

        let percentiles = PERCENTILES
            .iter()
            .map(|&p| (format!("p{}", p), stats::quantile_sorted(&sorted, p as f64 / 100.0)))
            .collect();

        let health = HealthFlags {
            good_variance: summary.std > 0.01,
            reasonable_contamination: contamination_error < 0.05,
            negative_scores_present: summary.min < -0.01,
        };

        Self {
            n_samples: scores.len(),
            n_anomalies,
            anomaly_ratio,
            expected_contamination,
            contamination_error,
            offset,
            scores_below_offset: n_anomalies,
            score_mean: summary.mean,
            score_std: summary.std,
            score_min: summary.min,
            score_max: summary.max,
            percentiles,
            health,
        }
    }

    /// Percentile value by level, e.g. `percentile(95)`
    pub fn percentile(&self, level: u8) -> Option<f64> {
        self.percentiles.get(&format!("p{}", level)).copied()
    }

    /// Emit a warning for every failed health check. Never fails the run.
    pub fn warn_if_unhealthy(&self, split: &str) {
        if !self.health.good_variance {
            warn!(split, std = self.score_std, "Low score variance, model may not discriminate");
        }
        if !self.health.reasonable_contamination {
            warn!(
                split,
                anomaly_ratio = self.anomaly_ratio,
                expected = self.expected_contamination,
                "Anomaly ratio far from expected contamination"
            );
        }
        if !self.health.negative_scores_present {
            warn!(split, min = self.score_min, "No clearly anomalous scores");
        }
    }
}
