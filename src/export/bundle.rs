//! Model bundle documents
//!
//! The bundle is three required JSON documents: metadata, scaler parameters
//! and the flattened forest. Everything a consumer needs to reproduce a
//! decision score is in these documents.

use crate::anomaly::{average_path_length, IsolationForest, IsolationTree};
use crate::calibration::ScoreDiagnostics;
use crate::config::TrainingConfig;
use crate::error::{ForestError, Result};
use crate::preprocessing::{ScalerKind, ScalerParams};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Version of the bundle layout
pub const MODEL_VERSION: &str = "1.0.0";

/// Scoring rule stored in the metadata
pub const SCORE_CONVENTION: &str =
    "decision = 0.5 - 2^(-mean_path/c(max_samples)); anomaly iff decision < decision_offset";

/// Marker for "not applicable" in the node arrays
pub const NONE: i64 = -1;

/// Lowercase hex SHA-256 of the JSON array of feature names
pub fn feature_order_hash(names: &[String]) -> String {
    let encoded = serde_json::json!(names).to_string();
    let mut hasher = Sha256::new();
    hasher.update(encoded.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// `metadata.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleMetadata {
    pub feature_names: Vec<String>,
    pub feature_order_hash: String,
    pub scaler_kind: ScalerKind,
    pub contamination: f64,
    pub n_estimators: usize,
    /// Resolved subsample size S
    pub max_samples: usize,
    pub decision_offset: f64,
    pub score_convention: String,
    /// Training median per feature, in raw units, used to fill missing inputs
    pub imputation_medians: Vec<f64>,
    /// RFC 3339
    pub training_timestamp: String,
    pub model_version: String,
    /// Keyed by split name ("validation", "training")
    #[serde(default)]
    pub evaluation_metrics: BTreeMap<String, ScoreDiagnostics>,
    #[serde(default)]
    pub config: Option<TrainingConfig>,
}

/// `scaler.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalerDocument {
    pub scaler_kind: ScalerKind,
    pub center: Vec<f64>,
    pub scale: Vec<f64>,
    pub feature_names: Vec<String>,
    pub n_features: usize,
    pub feature_order_hash: String,
}

impl ScalerDocument {
    pub fn from_params(params: &ScalerParams) -> Self {
        Self {
            scaler_kind: params.kind,
            center: params.center.clone(),
            scale: params.scale.clone(),
            feature_names: params.feature_names.clone(),
            n_features: params.n_features(),
            feature_order_hash: feature_order_hash(&params.feature_names),
        }
    }

    pub fn to_params(&self) -> ScalerParams {
        ScalerParams {
            kind: self.scaler_kind,
            feature_names: self.feature_names.clone(),
            center: self.center.clone(),
            scale: self.scale.clone(),
        }
    }
}

/// One tree as parallel node arrays, node 0 is the root
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TreeArrays {
    /// Split feature index, -1 at leaves
    pub split_feature: Vec<i64>,
    /// Split value, go left iff x < value; -1 at leaves
    pub split_value: Vec<f64>,
    pub left_child: Vec<i64>,
    pub right_child: Vec<i64>,
    /// Leaf depth, -1 at internal nodes
    pub leaf_depth: Vec<i64>,
    /// Leaf sample count, -1 at internal nodes
    pub leaf_size: Vec<i64>,
}

impl TreeArrays {
    /// Flatten a tree in pre-order
    pub fn from_tree(tree: &IsolationTree) -> Self {
        let mut arrays = Self::default();
        arrays.push(tree);
        arrays
    }

    fn push(&mut self, node: &IsolationTree) -> i64 {
        let id = self.split_feature.len();
        match node {
            IsolationTree::External { depth, size } => {
                self.split_feature.push(NONE);
                self.split_value.push(NONE as f64);
                self.left_child.push(NONE);
                self.right_child.push(NONE);
                self.leaf_depth.push(*depth as i64);
                self.leaf_size.push(*size as i64);
            }
            IsolationTree::Internal {
                feature,
                threshold,
                left,
                right,
            } => {
                self.split_feature.push(*feature as i64);
                self.split_value.push(*threshold);
                self.left_child.push(NONE);
                self.right_child.push(NONE);
                self.leaf_depth.push(NONE);
                self.leaf_size.push(NONE);
                let l = self.push(left);
                let r = self.push(right);
                self.left_child[id] = l;
                self.right_child[id] = r;
            }
        }
        id as i64
    }

    pub fn n_nodes(&self) -> usize {
        self.split_feature.len()
    }

    pub fn n_leaves(&self) -> usize {
        self.split_feature.iter().filter(|&&f| f == NONE).count()
    }

    /// Check array lengths and node references
    pub fn validate(&self, n_features: usize) -> Result<()> {
        let n = self.n_nodes();
        let lengths = [
            self.split_value.len(),
            self.left_child.len(),
            self.right_child.len(),
            self.leaf_depth.len(),
            self.leaf_size.len(),
        ];
        if n == 0 || lengths.iter().any(|&len| len != n) {
            return Err(ForestError::ShapeError {
                expected: format!("{} entries per node array", n),
                actual: format!("{:?}", lengths),
            });
        }

        let in_range = |idx: i64| idx > 0 && (idx as usize) < n;
        for i in 0..n {
            let feature = self.split_feature[i];
            let valid = if feature == NONE {
                self.leaf_depth[i] >= 0 && self.leaf_size[i] >= 0
            } else {
                feature >= 0
                    && (feature as usize) < n_features
                    && in_range(self.left_child[i])
                    && in_range(self.right_child[i])
            };
            if !valid {
                return Err(ForestError::Serialization(format!(
                    "invalid tree node {}",
                    i
                )));
            }
        }
        Ok(())
    }

    /// Leaf depth plus c(leaf size) for a scaled sample
    pub fn path_length(&self, sample: &[f64]) -> f64 {
        let mut node = 0usize;
        // Bounded by node count in case of a cyclic document
        for _ in 0..self.n_nodes() {
            let feature = self.split_feature[node];
            if feature == NONE {
                break;
            }
            node = if sample[feature as usize] < self.split_value[node] {
                self.left_child[node] as usize
            } else {
                self.right_child[node] as usize
            };
        }
        self.leaf_depth[node].max(0) as f64 + average_path_length(self.leaf_size[node].max(0) as usize)
    }
}

/// `forest.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForestDocument {
    /// Resolved subsample size S
    pub max_samples: usize,
    /// c(S)
    pub average_path_length_max_samples: f64,
    pub n_features: usize,
    pub trees: Vec<TreeArrays>,
}

impl ForestDocument {
    pub fn from_forest(forest: &IsolationForest) -> Result<Self> {
        let trees = forest.trees().ok_or(ForestError::ModelNotFitted)?;
        let max_samples = forest.subsample_size().ok_or(ForestError::ModelNotFitted)?;
        let n_features = forest.n_features().ok_or(ForestError::ModelNotFitted)?;
        Ok(Self {
            max_samples,
            average_path_length_max_samples: average_path_length(max_samples),
            n_features,
            trees: trees.iter().map(TreeArrays::from_tree).collect(),
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.trees.is_empty() {
            return Err(ForestError::Serialization("forest has no trees".to_string()));
        }
        self.trees.iter().try_for_each(|t| t.validate(self.n_features))
    }

    /// Decision score of an already scaled row
    pub fn decision_score(&self, scaled: &[f64]) -> Result<f64> {
        if scaled.len() != self.n_features {
            return Err(ForestError::ShapeError {
                expected: format!("{} features", self.n_features),
                actual: format!("{} features", scaled.len()),
            });
        }
        let c = average_path_length(self.max_samples);
        let c = if c > 0.0 { c } else { 1.0 };
        let mean_path =
            self.trees.iter().map(|t| t.path_length(scaled)).sum::<f64>() / self.trees.len() as f64;
        Ok(0.5 - 2.0_f64.powf(-mean_path / c))
    }
}

/// The three required documents together
#[derive(Debug, Clone)]
pub struct ModelBundle {
    pub metadata: BundleMetadata,
    pub scaler: ScalerDocument,
    pub forest: ForestDocument,
}

impl ModelBundle {
    /// Check that the documents agree with each other
    pub fn validate(&self) -> Result<()> {
        let hash = feature_order_hash(&self.metadata.feature_names);
        for declared in [&self.metadata.feature_order_hash, &self.scaler.feature_order_hash] {
            if *declared != hash {
                return Err(ForestError::FeatureOrderMismatch {
                    expected: hash,
                    actual: declared.clone(),
                });
            }
        }
        if self.scaler.feature_names != self.metadata.feature_names {
            return Err(ForestError::FeatureOrderMismatch {
                expected: self.metadata.feature_names.join(","),
                actual: self.scaler.feature_names.join(","),
            });
        }

        let n = self.metadata.feature_names.len();
        if self.scaler.center.len() != n
            || self.scaler.scale.len() != n
            || self.scaler.n_features != n
            || self.forest.n_features != n
        {
            return Err(ForestError::ShapeError {
                expected: format!("{} features", n),
                actual: format!(
                    "center {}, scale {}, forest {}",
                    self.scaler.center.len(),
                    self.scaler.scale.len(),
                    self.forest.n_features
                ),
            });
        }
        if self.metadata.imputation_medians.len() != n {
            return Err(ForestError::ShapeError {
                expected: format!("{} imputation medians", n),
                actual: format!("{} imputation medians", self.metadata.imputation_medians.len()),
            });
        }
        if self.metadata.imputation_medians.iter().any(|m| !m.is_finite()) {
            return Err(ForestError::Serialization("imputation median is not finite".to_string()));
        }
        if self.scaler.scale.iter().any(|s| !(s.is_finite() && *s > 0.0)) {
            return Err(ForestError::Serialization("scaler has a degenerate scale".to_string()));
        }
        if self.forest.trees.len() != self.metadata.n_estimators {
            return Err(ForestError::ShapeError {
                expected: format!("{} trees", self.metadata.n_estimators),
                actual: format!("{} trees", self.forest.trees.len()),
            });
        }
        self.forest.validate()
    }
}
