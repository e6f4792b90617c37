//! telemetry-forest - Isolation forest anomaly detection for system telemetry
//!
//! Trains an unsupervised isolation forest over host metrics and exports a
//! self-describing bundle that any runtime can score from:
//! - Telemetry validation, composite features, imputation and scaling
//! - Deterministic, parallel isolation forest training
//! - Contamination-calibrated decision offset with score diagnostics
//! - JSON bundle export (metadata, scaler, forest) plus an ONNX-ML graph
//! - Bundle-only inference with feature-order verification
//!
//! # Modules
//!
//! - [`preprocessing`] - Loading, validation, feature selection, scaling
//! - [`anomaly`] - Isolation forest
//! - [`calibration`] - Decision offset and score diagnostics
//! - [`export`] - Bundle documents and ONNX graph
//! - [`inference`] - Scoring from an exported bundle
//! - [`training`] - Stage-tagged training pipeline
//! - [`cli`] - Command-line interface

// Core error handling and configuration
pub mod error;
pub mod config;

// Core ML modules
pub mod preprocessing;
pub mod anomaly;
pub mod calibration;
pub mod training;
pub mod inference;

// Utilities
pub mod export;
pub mod utils;

// Services
pub mod cli;

pub use error::{ForestError, Result, Stage};

/// Re-export commonly used types
pub mod prelude {
    // Error handling
    pub use crate::error::{ForestError, Result, Stage, StageContext};

    // Configuration
    pub use crate::config::{MaxSamples, TrainingConfig};

    // Preprocessing
    pub use crate::preprocessing::{
        FeatureMatrix, LoadedData, Scaler, ScalerKind, ScalerParams, TelemetryLoader,
    };

    // Anomaly detection
    pub use crate::anomaly::{AnomalyDetector, IsolationForest};

    // Calibration
    pub use crate::calibration::{Calibrator, ScoreDiagnostics};

    // Training
    pub use crate::training::{TrainedModel, TrainingPipeline, TrainingReport};

    // Export and inference
    pub use crate::export::{Exporter, ModelBundle};
    pub use crate::inference::{BundleScorer, Prediction};
}
