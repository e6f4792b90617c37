//! Bundle scoring
//!
//! Scores raw telemetry rows using only the exported documents:
//! scaler parameters, flattened trees and the decision offset.

use crate::error::{ForestError, Result};
use crate::export::{feature_order_hash, load_bundle, ModelBundle};
use crate::preprocessing::ScalerParams;
use ndarray::Array2;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::info;

/// Result of scoring one row
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// Lower = more anomalous
    pub decision_score: f64,
    pub is_anomaly: bool,
    /// -1 = anomaly, 1 = normal
    pub label: i32,
    /// Distance from the decision offset
    pub confidence: f64,
}

/// Scores rows against a loaded, verified bundle
#[derive(Debug, Clone)]
pub struct BundleScorer {
    bundle: ModelBundle,
    scaler: ScalerParams,
}

impl BundleScorer {
    /// Accept the bundle only if it was trained on `expected_features`,
    /// in that order
    pub fn new(bundle: ModelBundle, expected_features: &[String]) -> Result<Self> {
        bundle.validate()?;

        let expected = feature_order_hash(expected_features);
        if bundle.metadata.feature_order_hash != expected {
            return Err(ForestError::FeatureOrderMismatch {
                expected,
                actual: bundle.metadata.feature_order_hash.clone(),
            });
        }

        let scaler = bundle.scaler.to_params();
        Ok(Self { bundle, scaler })
    }

    /// Load a bundle directory and verify its feature ordering
    pub fn load(dir: impl AsRef<Path>, expected_features: &[String]) -> Result<Self> {
        let scorer = Self::new(load_bundle(dir.as_ref())?, expected_features)?;
        info!(
            dir = %dir.as_ref().display(),
            features = scorer.feature_names().len(),
            trees = scorer.bundle.forest.trees.len(),
            "Loaded model bundle"
        );
        Ok(scorer)
    }

    /// Load a bundle and trust the feature order it declares
    pub fn load_unchecked(dir: impl AsRef<Path>) -> Result<Self> {
        let bundle = load_bundle(dir)?;
        let features = bundle.metadata.feature_names.clone();
        Self::new(bundle, &features)
    }

    pub fn bundle(&self) -> &ModelBundle {
        &self.bundle
    }

    pub fn feature_names(&self) -> &[String] {
        &self.bundle.metadata.feature_names
    }

    pub fn decision_offset(&self) -> f64 {
        self.bundle.metadata.decision_offset
    }

    /// Decision score of a raw (unscaled) row
    pub fn score_row(&self, raw: &[f64]) -> Result<f64> {
        let scaled = self.scaler.transform_row(raw)?;
        self.bundle.forest.decision_score(&scaled)
    }

    pub fn predict_row(&self, raw: &[f64]) -> Result<Prediction> {
        let decision_score = self.score_row(raw)?;
        let offset = self.decision_offset();
        let is_anomaly = decision_score < offset;
        Ok(Prediction {
            decision_score,
            is_anomaly,
            label: if is_anomaly { -1 } else { 1 },
            confidence: (decision_score - offset).abs(),
        })
    }

    /// Fill missing (or NaN) raw values with the training medians
    pub fn impute_row(&self, raw: &[Option<f64>]) -> Result<Vec<f64>> {
        let medians = &self.bundle.metadata.imputation_medians;
        if raw.len() != medians.len() {
            return Err(ForestError::ShapeError {
                expected: format!("{} features", medians.len()),
                actual: format!("{} features", raw.len()),
            });
        }
        Ok(raw
            .iter()
            .zip(medians)
            .map(|(value, median)| match value {
                Some(x) if !x.is_nan() => *x,
                _ => *median,
            })
            .collect())
    }

    /// Score a row given as feature name -> value
    pub fn predict_named(&self, values: &HashMap<String, f64>) -> Result<Prediction> {
        let missing: Vec<String> = self
            .feature_names()
            .iter()
            .filter(|name| !values.contains_key(*name))
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(ForestError::MissingColumns(missing));
        }
        let row: Vec<f64> = self.feature_names().iter().map(|name| values[name]).collect();
        self.predict_row(&row)
    }

    /// Score every row of a raw matrix in parallel
    pub fn predict_batch(&self, x: &Array2<f64>) -> Result<Vec<Prediction>> {
        (0..x.nrows())
            .into_par_iter()
            .map(|i| self.predict_row(&x.row(i).to_vec()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anomaly::{AnomalyDetector, IsolationForest};
    use crate::export::{
        BundleMetadata, ForestDocument, ScalerDocument, MODEL_VERSION, SCORE_CONVENTION,
    };
    use crate::preprocessing::{FeatureMatrix, Scaler, ScalerKind};
    use crate::utils::stats;
    use rand::prelude::*;
    use rand_chacha::ChaCha8Rng;
    use std::collections::BTreeMap;

    fn names() -> Vec<String> {
        vec!["cpu_usage".to_string(), "net_in".to_string(), "load_one".to_string()]
    }

    /// Bundle trained on uniform data around (50, 1000, 1)
    fn sample_bundle() -> (ModelBundle, Array2<f64>) {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let raw = Array2::from_shape_fn((300, 3), |(_, j)| {
            let center = [50.0, 1000.0, 1.0][j];
            center * rng.gen_range(0.8..1.2)
        });
        let matrix = FeatureMatrix::new(names(), raw.clone()).unwrap();
        let scaler = Scaler::new(ScalerKind::Robust).fit(&matrix).unwrap();
        let scaled = scaler.transform(&matrix).unwrap();

        let mut forest = IsolationForest::new().with_n_estimators(50).with_seed(9);
        forest.fit(scaled.values()).unwrap();
        let offset = crate::calibration::contamination_offset(
            forest.decision_function(scaled.values()).unwrap().as_slice().unwrap(),
            0.1,
        )
        .unwrap();
        let forest_doc = ForestDocument::from_forest(&forest).unwrap();

        let metadata = BundleMetadata {
            feature_names: names(),
            feature_order_hash: feature_order_hash(&names()),
            scaler_kind: ScalerKind::Robust,
            contamination: 0.1,
            n_estimators: 50,
            max_samples: forest_doc.max_samples,
            decision_offset: offset,
            score_convention: SCORE_CONVENTION.to_string(),
            imputation_medians: (0..3).map(|j| stats::median(&raw.column(j).to_vec())).collect(),
            training_timestamp: "2026-01-01T00:00:00+00:00".to_string(),
            model_version: MODEL_VERSION.to_string(),
            evaluation_metrics: BTreeMap::new(),
            config: None,
        };
        let bundle = ModelBundle {
            metadata,
            scaler: ScalerDocument::from_params(&scaler),
            forest: forest_doc,
        };
        (bundle, raw)
    }

    #[test]
    fn test_rejects_reordered_features() {
        let (bundle, _) = sample_bundle();
        let mut reordered = names();
        reordered.reverse();

        let err = BundleScorer::new(bundle.clone(), &reordered).unwrap_err();
        assert!(matches!(err, ForestError::FeatureOrderMismatch { .. }));
        assert!(BundleScorer::new(bundle, &names()).is_ok());
    }

    #[test]
    fn test_predictions_follow_offset() {
        let (bundle, raw) = sample_bundle();
        let scorer = BundleScorer::new(bundle, &names()).unwrap();

        let outlier = scorer.predict_row(&[99.0, 5000.0, 9.0]).unwrap();
        assert!(outlier.is_anomaly);
        assert_eq!(outlier.label, -1);
        assert!(outlier.decision_score < scorer.decision_offset());
        assert!((outlier.confidence - (scorer.decision_offset() - outlier.decision_score)).abs() < 1e-15);

        let batch = scorer.predict_batch(&raw).unwrap();
        assert_eq!(batch.len(), 300);
        for (i, p) in batch.iter().enumerate().take(20) {
            assert_eq!(*p, scorer.predict_row(&raw.row(i).to_vec()).unwrap());
            assert_eq!(p.is_anomaly, p.decision_score < scorer.decision_offset());
        }
        let flagged = batch.iter().filter(|p| p.is_anomaly).count();
        assert!((25..=35).contains(&flagged), "flagged {}", flagged);
    }

    #[test]
    fn test_named_values_and_width() {
        let (bundle, _) = sample_bundle();
        let scorer = BundleScorer::new(bundle, &names()).unwrap();

        let values: HashMap<String, f64> = names().into_iter().zip([50.0, 1000.0, 1.0]).collect();
        let named = scorer.predict_named(&values).unwrap();
        assert_eq!(named, scorer.predict_row(&[50.0, 1000.0, 1.0]).unwrap());
        assert!(!named.is_anomaly);

        let mut partial = values.clone();
        partial.remove("load_one");
        assert!(matches!(
            scorer.predict_named(&partial),
            Err(ForestError::MissingColumns(ref m)) if m == &vec!["load_one".to_string()]
        ));
        assert!(scorer.score_row(&[1.0, 2.0]).is_err());
    }

    #[test]
    fn test_impute_row_uses_training_medians() {
        let (bundle, _) = sample_bundle();
        let medians = bundle.metadata.imputation_medians.clone();
        let scorer = BundleScorer::new(bundle, &names()).unwrap();

        let filled = scorer.impute_row(&[Some(60.0), None, Some(f64::NAN)]).unwrap();
        assert_eq!(filled, vec![60.0, medians[1], medians[2]]);

        let prediction = scorer.predict_row(&filled).unwrap();
        assert!(prediction.confidence >= 0.0);
        assert!(scorer.impute_row(&[None]).is_err());
    }
}
