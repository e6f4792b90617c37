//! Telemetry table validation and feature extraction

use super::composite::UsageRatio;
use super::feature_selection::{FeatureRejection, FeatureSelection};
use super::imputer::{clamp_non_finite, MedianImputer};
use super::FeatureMatrix;
use crate::config::TrainingConfig;
use crate::error::{ForestError, Result};
use crate::utils::{column_values, has_column};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Columns with a higher null fraction than this are reported
const HIGH_MISSING_THRESHOLD: f64 = 0.5;

/// What the loader did to the input, for logging and metadata
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoadReport {
    pub n_rows: usize,
    pub dropped_columns: Vec<String>,
    pub high_missing_columns: Vec<String>,
    /// Rows whose composite ratio was forced to 0
    pub invalid_composite_rows: usize,
    pub selection: FeatureSelection,
    /// Imputed value count per retained feature
    pub imputed: Vec<(String, usize)>,
    /// Fill value per retained feature, in feature order
    pub medians: Vec<f64>,
    /// Non-finite values replaced by the clip bound
    pub clamped: usize,
}

/// Validated feature matrix plus the loader report
#[derive(Debug, Clone)]
pub struct LoadedData {
    pub matrix: FeatureMatrix,
    pub report: LoadReport,
}

/// Validates a raw telemetry table and extracts the model features
#[derive(Debug, Clone)]
pub struct TelemetryLoader {
    features: Vec<String>,
    drop_columns: Vec<String>,
    min_samples: usize,
    composite: Option<UsageRatio>,
    clip_bound: f64,
}

impl TelemetryLoader {
    pub fn new(features: Vec<String>) -> Self {
        Self {
            features,
            drop_columns: Vec::new(),
            min_samples: 100,
            composite: Some(UsageRatio::memory()),
            clip_bound: 1e10,
        }
    }

    pub fn from_config(config: &TrainingConfig) -> Self {
        Self {
            features: config.features.clone(),
            drop_columns: config.drop_columns.clone(),
            min_samples: config.min_samples,
            composite: config.memory_usage_ratio.then(UsageRatio::memory),
            clip_bound: config.clip_bound,
        }
    }

    pub fn with_drop_columns(mut self, columns: Vec<String>) -> Self {
        self.drop_columns = columns;
        self
    }

    pub fn with_min_samples(mut self, n: usize) -> Self {
        self.min_samples = n;
        self
    }

    /// Derive a composite ratio feature, `None` to use raw columns only
    pub fn with_composite(mut self, composite: Option<UsageRatio>) -> Self {
        self.composite = composite;
        self
    }

    pub fn with_clip_bound(mut self, bound: f64) -> Self {
        self.clip_bound = bound;
        self
    }

    /// Run validation, composite derivation, feature selection, imputation
    /// and clamping. The returned matrix contains only finite values.
    pub fn load(&self, df: &DataFrame) -> Result<LoadedData> {
        let mut report = LoadReport {
            n_rows: df.height(),
            ..Default::default()
        };

        self.validate(df, &mut report)?;

        let mut available: HashMap<String, Vec<Option<f64>>> = HashMap::new();
        let mut consumed: Vec<&str> = Vec::new();

        if let Some(rule) = &self.composite {
            let used = column_values(df, &rule.used)?;
            let total = column_values(df, &rule.total)?;
            let (ratio, invalid) = rule.derive(&used, &total);
            if invalid > 0 {
                warn!(
                    feature = %rule.output,
                    rows = invalid,
                    "Invalid counter rows, composite set to 0"
                );
            }
            report.invalid_composite_rows = invalid;
            available.insert(rule.output.clone(), ratio.into_iter().map(Some).collect());
            consumed.extend(rule.required_columns());
        }

        report.dropped_columns = self
            .drop_columns
            .iter()
            .filter(|c| has_column(df, c))
            .cloned()
            .collect();
        if !report.dropped_columns.is_empty() {
            info!(columns = ?report.dropped_columns, "Dropped columns");
        }

        for name in &self.features {
            if available.contains_key(name)
                || report.dropped_columns.contains(name)
                || consumed.contains(&name.as_str())
                || !has_column(df, name)
            {
                continue;
            }
            available.insert(name.clone(), column_values(df, name)?);
        }

        let selection =
            FeatureSelection::select(&self.features, |name| available.get(name).map(|v| v.as_slice()));
        for (name, reason) in &selection.rejected {
            match reason {
                FeatureRejection::Missing => warn!(feature = %name, "Feature not found"),
                FeatureRejection::NoVariance => warn!(feature = %name, "Feature has no variance"),
            }
        }
        if selection.accepted.len() < 2 {
            return Err(ForestError::TooFewFeatures {
                usable: selection.accepted,
            });
        }
        info!(features = ?selection.accepted, "Valid features");

        let raw: Vec<Vec<Option<f64>>> = selection
            .accepted
            .iter()
            .filter_map(|name| available.remove(name))
            .collect();

        let mut imputer = MedianImputer::new();
        let (mut columns, counts) = imputer.fit_transform(&raw);
        for (name, count) in selection.accepted.iter().zip(&counts) {
            if *count > 0 {
                warn!(feature = %name, count, "Imputed missing values with median");
            }
            report.imputed.push((name.clone(), *count));
        }
        report.medians = imputer.medians().to_vec();

        report.clamped = columns
            .iter_mut()
            .map(|column| clamp_non_finite(column, self.clip_bound))
            .sum();
        if report.clamped > 0 {
            warn!(count = report.clamped, bound = self.clip_bound, "Clamped non-finite values");
        }

        let matrix = FeatureMatrix::from_columns(selection.accepted.clone(), columns)?;
        report.selection = selection;
        debug!(
            rows = matrix.n_samples(),
            features = matrix.n_features(),
            "Feature matrix ready"
        );

        Ok(LoadedData { matrix, report })
    }

    fn validate(&self, df: &DataFrame, report: &mut LoadReport) -> Result<()> {
        if df.height() == 0 || df.width() == 0 {
            return Err(ForestError::EmptyInput);
        }
        if df.height() < self.min_samples {
            return Err(ForestError::InsufficientSamples {
                found: df.height(),
                required: self.min_samples,
            });
        }

        let n_rows = df.height() as f64;
        for column in df.get_columns() {
            let fraction = column.null_count() as f64 / n_rows;
            if fraction > HIGH_MISSING_THRESHOLD {
                warn!(
                    column = %column.name(),
                    missing_pct = (fraction * 1000.0).round() / 10.0,
                    "High missing values"
                );
                report.high_missing_columns.push(column.name().to_string());
            }
        }

        if let Some(rule) = &self.composite {
            let missing: Vec<String> = rule
                .required_columns()
                .iter()
                .filter(|c| !has_column(df, c))
                .map(|c| c.to_string())
                .collect();
            if !missing.is_empty() {
                return Err(ForestError::MissingColumns(missing));
            }
        }

        Ok(())
    }
}
