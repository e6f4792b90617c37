//! Training pipeline
//!
//! Load/validate -> scale -> train -> evaluate -> export. Every fatal error
//! is tagged with the stage that raised it.

use super::split::TrainValidationSplit;
use crate::anomaly::{AnomalyDetector, IsolationForest};
use crate::calibration::{Calibrator, ScoreDiagnostics};
use crate::config::TrainingConfig;
use crate::error::{Result, Stage, StageContext};
use crate::export::{
    feature_order_hash, BundleMetadata, ExportSummary, Exporter, ForestDocument, ModelBundle,
    ScalerDocument, DEBUG_DATA_FILE, MODEL_VERSION, SCORE_CONVENTION,
};
use crate::preprocessing::{FeatureMatrix, LoadReport, Scaler, ScalerParams, TelemetryLoader};
use crate::utils::{log_memory_usage, DataLoader, DataSaver, Timer};
use chrono::Utc;
use polars::prelude::DataFrame;
use std::collections::BTreeMap;
use tracing::{info, warn};

/// Everything produced by stages 1-4
#[derive(Debug, Clone)]
pub struct TrainedModel {
    /// Retained features, unscaled, after imputation
    pub features: FeatureMatrix,
    pub load_report: LoadReport,
    pub scaler: ScalerParams,
    /// Calibrated forest
    pub forest: IsolationForest,
    pub decision_offset: f64,
    /// Keyed by split name ("validation", "training")
    pub evaluation: BTreeMap<String, ScoreDiagnostics>,
    pub n_train: usize,
    pub n_validation: usize,
}

impl TrainedModel {
    pub fn feature_names(&self) -> &[String] {
        self.features.names()
    }

    /// Assemble the exportable documents
    pub fn to_bundle(&self, config: &TrainingConfig) -> Result<ModelBundle> {
        let forest = ForestDocument::from_forest(&self.forest)?;
        let names = self.feature_names().to_vec();

        let metadata = BundleMetadata {
            feature_order_hash: feature_order_hash(&names),
            feature_names: names,
            scaler_kind: self.scaler.kind,
            contamination: self.forest.contamination(),
            n_estimators: self.forest.n_estimators(),
            max_samples: forest.max_samples,
            decision_offset: self.decision_offset,
            score_convention: SCORE_CONVENTION.to_string(),
            imputation_medians: self.load_report.medians.clone(),
            training_timestamp: Utc::now().to_rfc3339(),
            model_version: MODEL_VERSION.to_string(),
            evaluation_metrics: self.evaluation.clone(),
            config: Some(config.clone()),
        };

        Ok(ModelBundle {
            metadata,
            scaler: ScalerDocument::from_params(&self.scaler),
            forest,
        })
    }
}

/// Result of a full run
#[derive(Debug, Clone)]
pub struct TrainingReport {
    pub model: TrainedModel,
    pub bundle: ModelBundle,
    pub export: ExportSummary,
    pub elapsed_ms: u64,
}

/// Runs the five pipeline stages
#[derive(Debug, Clone)]
pub struct TrainingPipeline {
    config: TrainingConfig,
}

impl TrainingPipeline {
    /// Create a pipeline; out-of-range settings are corrected with warnings
    pub fn new(mut config: TrainingConfig) -> Self {
        config.sanitize();
        Self { config }
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Read the configured input file
    pub fn load_input(&self) -> Result<DataFrame> {
        DataLoader::new()
            .load_auto(&self.config.input_csv)
            .stage(Stage::Load)
    }

    /// Stages 1-4 on an in-memory table
    pub fn fit(&self, df: &DataFrame) -> Result<TrainedModel> {
        let config = &self.config;

        // Load/validate
        let loaded = TelemetryLoader::from_config(config).load(df).stage(Stage::Load)?;
        log_memory_usage("load");

        // Scale
        let scaler = Scaler::new(config.scaler)
            .fit(&loaded.matrix)
            .stage(Stage::Scale)?;
        let scaled = scaler.transform(&loaded.matrix).stage(Stage::Scale)?;
        info!(kind = %scaler.kind, features = scaler.n_features(), "Fitted scaler");

        // Train
        let split = TrainValidationSplit::new(
            scaled.n_samples(),
            config.validation_split,
            config.random_state,
        );
        let train_x = scaled.select_rows(&split.train);
        let validation_x = scaled.select_rows(&split.validation);

        let mut forest = IsolationForest::new()
            .with_n_estimators(config.n_estimators)
            .with_max_samples(config.max_samples)
            .with_bootstrap(config.bootstrap)
            .with_max_depth(config.max_depth)
            .with_contamination(config.contamination)
            .with_seed(config.random_state)
            .with_n_jobs(config.n_jobs);

        let timer = Timer::start();
        forest.fit(train_x.values()).stage(Stage::Train)?;
        info!(
            n_estimators = config.n_estimators,
            n_train = split.train.len(),
            subsample_size = forest.subsample_size(),
            elapsed_ms = timer.elapsed_ms(),
            "Trained isolation forest"
        );
        log_memory_usage("train");

        // Evaluate
        let calibrator = Calibrator::new(config.contamination);
        let calibration_x = if split.has_validation() { &validation_x } else { &train_x };
        let scores = forest
            .decision_function(calibration_x.values())
            .stage(Stage::Evaluate)?
            .to_vec();
        let decision_offset = calibrator.calibrate(&scores).stage(Stage::Evaluate)?;
        let forest = forest.with_offset(decision_offset);

        let mut evaluation = BTreeMap::new();
        if split.has_validation() {
            let diag = calibrator
                .evaluate_detector(&forest, validation_x.values(), "validation")
                .stage(Stage::Evaluate)?;
            evaluation.insert("validation".to_string(), diag);
        }
        let diag = calibrator
            .evaluate_detector(&forest, scaled.values(), "training")
            .stage(Stage::Evaluate)?;
        evaluation.insert("training".to_string(), diag);
        log_memory_usage("evaluate");

        Ok(TrainedModel {
            features: loaded.matrix,
            load_report: loaded.report,
            scaler,
            forest,
            decision_offset,
            evaluation,
            n_train: split.train.len(),
            n_validation: split.validation.len(),
        })
    }

    /// Fit on a table and export the bundle
    pub fn run_on_frame(&self, df: &DataFrame) -> Result<TrainingReport> {
        let timer = Timer::start();
        let model = self.fit(df)?;

        // Export
        let bundle = model.to_bundle(&self.config).stage(Stage::Export)?;
        let export = Exporter::new(&self.config.output_dir)
            .with_opsets(self.config.onnx_opset, self.config.ai_onnx_ml_opset)
            .export(&bundle)
            .stage(Stage::Export)?;
        self.write_debug_copy(&model.features);
        log_memory_usage("export");

        let elapsed_ms = timer.elapsed_ms();
        info!(elapsed_ms, dir = %self.config.output_dir.display(), "Training pipeline finished");
        Ok(TrainingReport {
            model,
            bundle,
            export,
            elapsed_ms,
        })
    }

    /// Read the configured input, fit and export
    pub fn run(&self) -> Result<TrainingReport> {
        let df = self.load_input()?;
        self.run_on_frame(&df)
    }

    fn write_debug_copy(&self, features: &FeatureMatrix) {
        let path = self.config.output_dir.join(DEBUG_DATA_FILE);
        let result = features
            .to_dataframe()
            .and_then(|mut df| DataSaver::save_csv(&mut df, &path));
        match result {
            Ok(()) => info!(path = %path.display(), "Saved preprocessed data"),
            Err(e) => warn!(error = %e, "Could not save preprocessed data"),
        }
    }
}
