//! Decision threshold calibration and score evaluation
//!
//! The offset is derived from the requested contamination rate; every
//! evaluated split gets a [`ScoreDiagnostics`] with advisory health flags.

mod metrics;
mod threshold;

pub use metrics::{HealthFlags, ScoreDiagnostics, PERCENTILES};
pub use threshold::{contamination_offset, count_below};

use crate::anomaly::AnomalyDetector;
use crate::config::sanitize_contamination;
use crate::error::Result;
use ndarray::Array2;
use tracing::info;

/// Contamination-driven calibrator
#[derive(Debug, Clone, Copy)]
pub struct Calibrator {
    contamination: f64,
}

impl Calibrator {
    /// Out-of-range contamination falls back to the default with a warning
    pub fn new(contamination: f64) -> Self {
        Self {
            contamination: sanitize_contamination(contamination),
        }
    }

    pub fn contamination(&self) -> f64 {
        self.contamination
    }

    /// Decision offset for a set of calibration scores
    pub fn calibrate(&self, decision_scores: &[f64]) -> Result<f64> {
        let offset = contamination_offset(decision_scores, self.contamination)?;
        info!(
            offset,
            contamination = self.contamination,
            n_samples = decision_scores.len(),
            "Calibrated decision offset"
        );
        Ok(offset)
    }

    /// Diagnostics for scores against an offset
    pub fn evaluate(&self, decision_scores: &[f64], offset: f64) -> ScoreDiagnostics {
        ScoreDiagnostics::evaluate(decision_scores, offset, self.contamination)
    }

    /// Score `x` with a calibrated detector, log the results and surface
    /// health warnings
    pub fn evaluate_detector<D: AnomalyDetector>(
        &self,
        detector: &D,
        x: &Array2<f64>,
        split: &str,
    ) -> Result<ScoreDiagnostics> {
        let result = detector.detect(x)?;
        let scores = result.scores.to_vec();
        let diagnostics = self.evaluate(&scores, result.offset);

        info!(
            split,
            n_samples = diagnostics.n_samples,
            n_anomalies = diagnostics.n_anomalies,
            anomaly_ratio = diagnostics.anomaly_ratio,
            score_mean = diagnostics.score_mean,
            score_std = diagnostics.score_std,
            "Evaluation results"
        );
        diagnostics.warn_if_unhealthy(split);
        Ok(diagnostics)
    }
}
