//! End-to-end tests: train on synthetic telemetry, export, reload and score

mod common;

use common::{normal_reading, scenarios, telemetry_frame, test_config, FEATURES, NORMAL};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::collections::HashMap;
use telemetry_forest::export::{
    load_bundle, read_json, write_json, ForestDocument, ScalerDocument, FOREST_FILE, GUIDE_FILE,
    METADATA_FILE, ONNX_FILE, SCALER_FILE,
};
use telemetry_forest::prelude::*;
use tempfile::tempdir;

fn feature_names() -> Vec<String> {
    FEATURES.iter().map(|s| s.to_string()).collect()
}

#[test]
fn test_pipeline_writes_complete_bundle() {
    let dir = tempdir().unwrap();
    let df = telemetry_frame(2000, 7);

    let report = TrainingPipeline::new(test_config(dir.path()))
        .run_on_frame(&df)
        .expect("pipeline should succeed");

    for file in [METADATA_FILE, SCALER_FILE, FOREST_FILE, ONNX_FILE, GUIDE_FILE] {
        assert!(dir.path().join(file).exists(), "{} should be written", file);
    }
    assert!(report.export.skipped.is_empty());

    let bundle = load_bundle(dir.path()).expect("bundle should reload");
    assert_eq!(bundle.metadata.feature_names, feature_names());
    assert_eq!(bundle.metadata.n_estimators, 100);
    assert_eq!(bundle.forest.trees.len(), 100);
    assert_eq!(bundle.forest.max_samples, 256);
    assert_eq!(bundle.metadata.decision_offset, report.model.decision_offset);
    assert!(bundle.metadata.evaluation_metrics.contains_key("validation"));
    assert!(bundle.metadata.evaluation_metrics.contains_key("training"));

    // Drop-list columns never reach the model
    assert!(report
        .model
        .load_report
        .dropped_columns
        .iter()
        .any(|c| c == "system_id"));
    assert_eq!(report.model.n_train + report.model.n_validation, 2000);
    assert_eq!(report.model.n_validation, 400);
}

#[test]
fn test_onnx_graph_structure() {
    let dir = tempdir().unwrap();
    TrainingPipeline::new(test_config(dir.path()))
        .run_on_frame(&telemetry_frame(600, 3))
        .unwrap();

    let model: serde_json::Value = read_json(dir.path().join(ONNX_FILE)).unwrap();
    let ops: Vec<&str> = model["graph"]["nodes"]
        .as_array()
        .unwrap()
        .iter()
        .map(|n| n["op_type"].as_str().unwrap())
        .collect();
    assert_eq!(ops, vec!["Scaler", "TreeEnsembleRegressor", "Mul", "Pow", "Sub"]);

    let opsets = model["opset_import"].as_array().unwrap();
    assert_eq!(opsets[0]["version"], 15);
    assert_eq!(opsets[1]["domain"], "ai.onnx.ml");
    assert_eq!(opsets[1]["version"], 3);
}

#[test]
fn test_bundle_scores_match_forest() {
    let dir = tempdir().unwrap();
    let report = TrainingPipeline::new(test_config(dir.path()))
        .run_on_frame(&telemetry_frame(1500, 11))
        .unwrap();
    let model = &report.model;

    let scaled = model.scaler.transform(&model.features).unwrap();
    let expected = model.forest.decision_function(scaled.values()).unwrap();

    let scorer = BundleScorer::load(dir.path(), &feature_names()).unwrap();
    for i in 0..200 {
        let raw = model.features.row(i);
        let score = scorer.score_row(&raw).unwrap();
        assert!(
            (score - expected[i]).abs() < 1e-9,
            "row {}: bundle {} vs forest {}",
            i,
            score,
            expected[i]
        );
    }
}

#[test]
fn test_scenarios_are_ranked() {
    let dir = tempdir().unwrap();
    TrainingPipeline::new(test_config(dir.path()))
        .run_on_frame(&telemetry_frame(3000, 21))
        .unwrap();
    let scorer = BundleScorer::load(dir.path(), &feature_names()).unwrap();

    let predictions: HashMap<&str, Prediction> = scenarios()
        .into_iter()
        .map(|(name, reading)| (name, scorer.predict_named(&reading.features()).unwrap()))
        .collect();

    let normal = &predictions["normal"];
    assert!(!normal.is_anomaly, "normal reading flagged: {:?}", normal);
    assert_eq!(normal.label, 1);
    assert!(normal.decision_score > 0.0);

    for name in ["high_cpu", "memory_leak", "network_storm"] {
        let p = &predictions[name];
        assert!(p.is_anomaly, "{} not flagged: {:?}", name, p);
        assert_eq!(p.label, -1);
        assert!(
            p.decision_score < normal.decision_score,
            "{} should score below normal",
            name
        );
        assert!(p.decision_score < 0.0);
    }

    // Named and positional scoring agree on the literal vectors
    for (name, reading) in scenarios() {
        let positional = scorer.predict_row(&reading.values()).unwrap();
        assert_eq!(positional, predictions[name]);
    }
}

#[test]
fn test_exported_medians_fill_missing_inputs() {
    let dir = tempdir().unwrap();
    TrainingPipeline::new(test_config(dir.path()))
        .run_on_frame(&telemetry_frame(3000, 31))
        .unwrap();
    let scorer = BundleScorer::load(dir.path(), &feature_names()).unwrap();

    let medians = scorer.bundle().metadata.imputation_medians.clone();
    let tolerances = [1.5, 0.5, 0.15, 0.15, 0.04];
    for ((median, center), tol) in medians.iter().zip(NORMAL.values()).zip(tolerances) {
        assert!((median - center).abs() < tol, "median {} vs center {}", median, center);
    }

    let filled = scorer.impute_row(&[Some(NORMAL.cpu_usage), None, None, None, None]).unwrap();
    assert_eq!(filled[0], NORMAL.cpu_usage);
    assert_eq!(&filled[1..], &medians[1..]);
    assert!(!scorer.predict_row(&filled).unwrap().is_anomaly);
}

#[test]
fn test_calibration_holds_on_fresh_data() {
    let dir = tempdir().unwrap();
    let report = TrainingPipeline::new(test_config(dir.path()))
        .run_on_frame(&telemetry_frame(3000, 5))
        .unwrap();

    let validation = &report.model.evaluation["validation"];
    assert!(validation.contamination_error <= 0.05);
    assert!(validation.health.reasonable_contamination);

    let scorer = BundleScorer::load(dir.path(), &feature_names()).unwrap();
    let mut rng = ChaCha8Rng::seed_from_u64(999);
    let n = 1000;
    let flagged = (0..n)
        .filter(|_| {
            let reading = normal_reading(&mut rng);
            scorer.predict_named(&reading.features()).unwrap().is_anomaly
        })
        .count();
    let ratio = flagged as f64 / n as f64;
    assert!(
        (ratio - 0.10).abs() <= 0.05,
        "fresh anomaly ratio {} too far from 0.10",
        ratio
    );
}

#[test]
fn test_reordered_features_rejected() {
    let dir = tempdir().unwrap();
    TrainingPipeline::new(test_config(dir.path()))
        .run_on_frame(&telemetry_frame(600, 9))
        .unwrap();

    let mut reordered = feature_names();
    reordered.swap(0, 1);
    let err = BundleScorer::load(dir.path(), &reordered).unwrap_err();
    assert!(matches!(err, ForestError::FeatureOrderMismatch { .. }));

    // A missing named value is reported, not defaulted
    let scorer = BundleScorer::load(dir.path(), &feature_names()).unwrap();
    let mut values = scenarios()[0].1.features();
    values.remove("net_out");
    let err = scorer.predict_named(&values).unwrap_err();
    assert!(matches!(err, ForestError::MissingColumns(ref c) if c == &vec!["net_out".to_string()]));
}

#[test]
fn test_tampered_bundle_rejected() {
    let dir = tempdir().unwrap();
    TrainingPipeline::new(test_config(dir.path()))
        .run_on_frame(&telemetry_frame(600, 13))
        .unwrap();

    let mut scaler: ScalerDocument = read_json(dir.path().join(SCALER_FILE)).unwrap();
    let original = scaler.clone();
    scaler.feature_order_hash = "0".repeat(64);
    write_json(&scaler, dir.path().join(SCALER_FILE)).unwrap();
    assert!(load_bundle(dir.path()).is_err());

    write_json(&original, dir.path().join(SCALER_FILE)).unwrap();
    let mut forest: ForestDocument = read_json(dir.path().join(FOREST_FILE)).unwrap();
    forest.trees[0].left_child[0] = 1_000_000;
    write_json(&forest, dir.path().join(FOREST_FILE)).unwrap();
    assert!(load_bundle(dir.path()).is_err());
}

#[test]
fn test_small_input_fails_in_load_stage() {
    let dir = tempdir().unwrap();
    let err = TrainingPipeline::new(test_config(dir.path()))
        .run_on_frame(&telemetry_frame(50, 1))
        .unwrap_err();

    assert_eq!(err.stage(), Some(Stage::Load));
    assert!(matches!(
        err.root_cause(),
        ForestError::InsufficientSamples {
            found: 50,
            required: 100
        }
    ));
    assert!(!dir.path().join(METADATA_FILE).exists());
}
