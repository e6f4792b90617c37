//! Model export and serialization module
//!
//! Writes a trained model as a directory of JSON documents:
//! - Required: `metadata.json`, `scaler.json`, `forest.json`
//! - Optional: `model.onnx.json` (ONNX-ML graph), `integration_guide.json`
//!
//! A failure on a required document fails the export; optional documents
//! only produce warnings.

mod bundle;
mod onnx;
mod serializer;

pub use bundle::{
    feature_order_hash, BundleMetadata, ForestDocument, ModelBundle, ScalerDocument, TreeArrays,
    MODEL_VERSION, SCORE_CONVENTION,
};
pub use onnx::{forest_to_onnx, ONNXConfig, ONNXExportable, ONNXExporter, ONNXGraph};
pub use serializer::{
    load_bundle, read_json, save_bundle, write_json, DEBUG_DATA_FILE, FOREST_FILE, GUIDE_FILE,
    METADATA_FILE, ONNX_FILE, SCALER_FILE,
};

use crate::error::{ForestError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Consumer-facing description of how to use the bundle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrationGuide {
    pub model_version: String,
    pub feature_names: Vec<String>,
    pub feature_order_hash: String,
    pub preprocessing: Vec<String>,
    pub scoring: Vec<String>,
    pub decision_offset: f64,
    /// Documents present in the bundle directory
    pub files: Vec<String>,
    /// `None` when the ONNX graph was not written
    pub onnx_model: Option<String>,
}

impl IntegrationGuide {
    /// Describe the bundle as far as `summary` says it was written
    pub fn from_export(bundle: &ModelBundle, summary: &ExportSummary) -> Self {
        let meta = &bundle.metadata;
        let files: Vec<String> = summary
            .required
            .iter()
            .chain(&summary.optional)
            .filter_map(|path| path.file_name())
            .map(|name| name.to_string_lossy().into_owned())
            .collect();
        let onnx_model = files.iter().find(|f| f.as_str() == ONNX_FILE).cloned();

        Self {
            model_version: meta.model_version.clone(),
            feature_names: meta.feature_names.clone(),
            feature_order_hash: meta.feature_order_hash.clone(),
            preprocessing: vec![
                format!("Collect features in exactly this order: {}", meta.feature_names.join(", ")),
                "memory_usage = 100 * memory_used_kb / memory_total_kb, clamped to [0, 100]".to_string(),
                format!(
                    "Replace missing values with imputation_medians[i] from {}",
                    METADATA_FILE
                ),
                format!(
                    "Scale each feature: (x - center[i]) / scale[i] ({} scaler, see {})",
                    meta.scaler_kind, SCALER_FILE
                ),
            ],
            scoring: vec![
                format!(
                    "For each tree in {}, walk from node 0: go to left_child when x[split_feature] < split_value, else right_child",
                    FOREST_FILE
                ),
                "At the leaf, path = leaf_depth + c(leaf_size), c(n) = 2(ln(n-1) + 0.5772156649) - 2(n-1)/n, c(n<=1) = 0".to_string(),
                meta.score_convention.clone(),
                "confidence = |decision - decision_offset|".to_string(),
            ],
            decision_offset: meta.decision_offset,
            files,
            onnx_model,
        }
    }
}

/// Files produced by an export
#[derive(Debug, Clone, Default)]
pub struct ExportSummary {
    pub output_dir: PathBuf,
    pub required: Vec<PathBuf>,
    pub optional: Vec<PathBuf>,
    /// Optional documents that failed, with the reason
    pub skipped: Vec<(String, String)>,
}

/// Writes a bundle directory
#[derive(Debug, Clone)]
pub struct Exporter {
    output_dir: PathBuf,
    onnx: ONNXConfig,
}

impl Exporter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            onnx: ONNXConfig::default(),
        }
    }

    pub fn with_opsets(mut self, opset: i64, ml_opset: i64) -> Self {
        self.onnx.opset_version = opset;
        self.onnx.ml_opset_version = ml_opset;
        self
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Write required then optional documents
    pub fn export(&self, bundle: &ModelBundle) -> Result<ExportSummary> {
        bundle.validate()?;

        let required = save_bundle(bundle, &self.output_dir).map_err(|e| match e {
            ForestError::Export(_) => e,
            other => ForestError::Export(other.to_string()),
        })?;
        info!(dir = %self.output_dir.display(), files = required.len(), "Exported model bundle");

        let mut summary = ExportSummary {
            output_dir: self.output_dir.clone(),
            required,
            ..Default::default()
        };

        let onnx_path = self.output_dir.join(ONNX_FILE);
        match ONNXExporter::with_config(self.onnx.clone()).export_json(bundle, &onnx_path) {
            Ok(()) => summary.optional.push(onnx_path),
            Err(e) => {
                warn!(error = %e, "ONNX export failed, continuing without it");
                summary.skipped.push((ONNX_FILE.to_string(), e.to_string()));
            }
        }

        let guide_path = self.output_dir.join(GUIDE_FILE);
        let guide = IntegrationGuide::from_export(bundle, &summary);
        match write_json(&guide, &guide_path) {
            Ok(()) => summary.optional.push(guide_path),
            Err(e) => {
                warn!(error = %e, "Integration guide export failed");
                summary.skipped.push((GUIDE_FILE.to_string(), e.to_string()));
            }
        }

        Ok(summary)
    }
}
