//! Anomaly detection module
//!
//! Isolation forest scoring with a contamination-calibrated decision offset.
//! Scores follow the decision convention: lower is more anomalous, and a
//! sample is an anomaly when its decision score is below the offset.

mod isolation_forest;

pub use isolation_forest::{average_path_length, IsolationForest, IsolationTree, TreeStats};

use crate::error::{ForestError, Result};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

/// Anomaly detection result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalyResult {
    /// Decision scores (lower = more anomalous)
    pub scores: Array1<f64>,
    /// Binary labels (-1 = anomaly, 1 = normal)
    pub labels: Array1<i32>,
    /// Offset used for classification
    pub offset: f64,
    /// Number of anomalies detected
    pub n_anomalies: usize,
}

/// Trait for anomaly detectors
pub trait AnomalyDetector: Send + Sync {
    /// Fit the detector on training data
    fn fit(&mut self, x: &Array2<f64>) -> Result<()>;

    /// Raw anomaly scores in [0, 1], higher = more anomalous
    fn score_samples(&self, x: &Array2<f64>) -> Result<Array1<f64>>;

    /// Decision scores, lower = more anomalous
    fn decision_function(&self, x: &Array2<f64>) -> Result<Array1<f64>>;

    /// Calibrated decision offset, `None` before calibration
    fn offset(&self) -> Option<f64>;

    /// Predict labels (-1 = anomaly, 1 = normal)
    fn predict(&self, x: &Array2<f64>) -> Result<Array1<i32>> {
        let offset = self.offset().ok_or(ForestError::ModelNotFitted)?;
        let scores = self.decision_function(x)?;
        Ok(scores.mapv(|s| if s < offset { -1 } else { 1 }))
    }

    /// Get detection results with scores and labels
    fn detect(&self, x: &Array2<f64>) -> Result<AnomalyResult> {
        let offset = self.offset().ok_or(ForestError::ModelNotFitted)?;
        let scores = self.decision_function(x)?;
        let labels = scores.mapv(|s| if s < offset { -1 } else { 1 });
        let n_anomalies = labels.iter().filter(|&&l| l == -1).count();

        Ok(AnomalyResult {
            scores,
            labels,
            offset,
            n_anomalies,
        })
    }
}
