//! Integration test: loading, validation and scaling failures through the pipeline

mod common;

use common::{telemetry_frame, test_config};
use polars::prelude::*;
use telemetry_forest::preprocessing::FeatureRejection;
use telemetry_forest::prelude::*;
use telemetry_forest::utils::DataSaver;
use tempfile::tempdir;

fn replace_column(df: &DataFrame, name: &str, values: Vec<f64>) -> DataFrame {
    let mut df = df.clone();
    df.with_column(Series::new(name.into(), values)).unwrap();
    df
}

#[test]
fn test_empty_input_fails_in_load_stage() {
    let dir = tempdir().unwrap();
    let df = telemetry_frame(10, 1).head(Some(0));
    let err = TrainingPipeline::new(test_config(dir.path()))
        .fit(&df)
        .unwrap_err();

    assert_eq!(err.stage(), Some(Stage::Load));
    assert!(matches!(err.root_cause(), ForestError::EmptyInput));
}

#[test]
fn test_missing_memory_counters() {
    let dir = tempdir().unwrap();
    let df = telemetry_frame(300, 2).drop("memory_total_kb").unwrap();
    let err = TrainingPipeline::new(test_config(dir.path()))
        .fit(&df)
        .unwrap_err();

    assert_eq!(err.stage(), Some(Stage::Load));
    match err.root_cause() {
        ForestError::MissingColumns(cols) => assert_eq!(cols, &vec!["memory_total_kb".to_string()]),
        other => panic!("unexpected error: {}", other),
    }
}

#[test]
fn test_constant_and_absent_features_are_rejected() {
    let dir = tempdir().unwrap();
    let df = telemetry_frame(400, 3).drop("net_out").unwrap();
    let df = replace_column(&df, "load_one", vec![1.0; 400]);

    let model = TrainingPipeline::new(test_config(dir.path()))
        .fit(&df)
        .expect("three usable features remain");

    assert_eq!(
        model.feature_names(),
        &["cpu_usage".to_string(), "memory_usage".to_string(), "net_in".to_string()]
    );
    let rejected = &model.load_report.selection.rejected;
    assert!(rejected.contains(&("net_out".to_string(), FeatureRejection::Missing)));
    assert!(rejected.contains(&("load_one".to_string(), FeatureRejection::NoVariance)));
}

#[test]
fn test_too_few_features() {
    let dir = tempdir().unwrap();
    let config = test_config(dir.path())
        .with_features(vec!["cpu_usage".to_string(), "load_one".to_string()]);
    let df = replace_column(&telemetry_frame(200, 4), "load_one", vec![0.5; 200]);

    let err = TrainingPipeline::new(config).fit(&df).unwrap_err();
    assert_eq!(err.stage(), Some(Stage::Load));
    assert!(matches!(
        err.root_cause(),
        ForestError::TooFewFeatures { usable } if usable == &vec!["cpu_usage".to_string()]
    ));
}

#[test]
fn test_robust_scaler_rejects_zero_iqr() {
    let dir = tempdir().unwrap();
    // Mostly constant with rare spikes: non-zero variance, zero IQR
    let spiky: Vec<f64> = (0..400).map(|i| if i % 25 == 0 { 50_000.0 } else { 8_000.0 }).collect();
    let df = replace_column(&telemetry_frame(400, 5), "net_out", spiky);

    let err = TrainingPipeline::new(test_config(dir.path()))
        .fit(&df)
        .unwrap_err();
    assert_eq!(err.stage(), Some(Stage::Scale));
    assert!(matches!(
        err.root_cause(),
        ForestError::DegenerateScale { feature, .. } if feature == "net_out"
    ));

    // The standard scaler only needs a non-zero standard deviation
    let model = TrainingPipeline::new(test_config(dir.path()).with_scaler(ScalerKind::Standard))
        .fit(&df)
        .expect("standard scaling should succeed");
    assert_eq!(model.scaler.kind, ScalerKind::Standard);
}

#[test]
fn test_missing_values_are_imputed_with_median() {
    let dir = tempdir().unwrap();
    let model = TrainingPipeline::new(test_config(dir.path()))
        .fit(&telemetry_frame(970, 6))
        .unwrap();

    let imputed: Vec<&(String, usize)> = model
        .load_report
        .imputed
        .iter()
        .filter(|(_, n)| *n > 0)
        .collect();
    assert_eq!(imputed, vec![&("net_in".to_string(), 10)]);
    assert!(model.features.first_non_finite().is_none());
}

#[test]
fn test_run_reads_csv_input() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("system_metrics.csv");
    let mut df = telemetry_frame(500, 8);
    DataSaver::save_csv(&mut df, &input).unwrap();

    let output = dir.path().join("assets");
    let report = TrainingPipeline::new(test_config(&output).with_input(&input))
        .run()
        .expect("pipeline should read the CSV");
    assert_eq!(report.model.load_report.n_rows, 500);
    assert!(output.join("preprocessed_data.csv").exists());

    let missing = TrainingPipeline::new(test_config(&output).with_input(dir.path().join("nope.csv")))
        .run()
        .unwrap_err();
    assert_eq!(missing.stage(), Some(Stage::Load));
}
