//! Training configuration
//!
//! Every field has a default; a JSON config file overrides defaults field by
//! field and command-line flags override the file.

use crate::error::{ForestError, Result};
use crate::preprocessing::ScalerKind;
use serde::{Deserialize, Deserializer, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Contamination used when the configured value is outside (0, 0.5)
pub const DEFAULT_CONTAMINATION: f64 = 0.10;

/// Subsample size policy for each tree
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaxSamples {
    /// min(256, n_samples)
    Auto,
    /// Fixed number of rows, capped at n_samples
    Count(usize),
    /// Fraction of n_samples
    Fraction(f64),
}

impl Default for MaxSamples {
    fn default() -> Self {
        MaxSamples::Auto
    }
}

impl MaxSamples {
    /// Resolve to a concrete subsample size for `n_samples` rows
    pub fn resolve(&self, n_samples: usize) -> usize {
        let size = match *self {
            MaxSamples::Auto => n_samples.min(256),
            MaxSamples::Count(k) => k.min(n_samples),
            MaxSamples::Fraction(f) => (f.clamp(0.0, 1.0) * n_samples as f64) as usize,
        };
        size.max(1)
    }
}

/// Configuration for a training run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Input telemetry file (CSV, JSON or Parquet)
    pub input_csv: PathBuf,
    /// Directory receiving the exported bundle
    pub output_dir: PathBuf,
    /// Expected fraction of anomalies, must lie in (0, 0.5)
    pub contamination: f64,
    /// Number of isolation trees
    pub n_estimators: usize,
    /// Seed for every random draw in the run
    pub random_state: u64,
    /// Candidate features in model order
    pub features: Vec<String>,
    /// Derive `memory_usage` from `memory_used_kb` / `memory_total_kb`
    pub memory_usage_ratio: bool,
    /// Columns removed before feature selection
    pub drop_columns: Vec<String>,
    /// Minimum number of input rows
    pub min_samples: usize,
    /// Fraction of rows held out for calibration and evaluation
    pub validation_split: f64,
    /// ONNX default-domain opset
    pub onnx_opset: i64,
    /// ONNX `ai.onnx.ml` opset
    pub ai_onnx_ml_opset: i64,
    /// Feature scaling strategy, unknown names fall back to robust
    #[serde(deserialize_with = "lenient_scaler")]
    pub scaler: ScalerKind,
    /// Subsample size per tree
    pub max_samples: MaxSamples,
    /// Draw subsamples with replacement
    pub bootstrap: bool,
    /// Maximum tree depth, `None` = ceil(log2(subsample size))
    pub max_depth: Option<usize>,
    /// Finite bound used to clamp non-finite values after imputation
    pub clip_bound: f64,
    /// Worker threads for tree building, `None` = rayon default
    pub n_jobs: Option<usize>,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            input_csv: PathBuf::from("system_metrics.csv"),
            output_dir: PathBuf::from("model_assets"),
            contamination: DEFAULT_CONTAMINATION,
            n_estimators: 100,
            random_state: 42,
            features: ["cpu_usage", "memory_usage", "net_in", "net_out", "load_one"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            memory_usage_ratio: true,
            drop_columns: [
                "time",
                "uptime",
                "docker_containers_running",
                "system_id",
                "components",
                "ctid",
                "load_fifteen",
                "load_five",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            min_samples: 100,
            validation_split: 0.2,
            onnx_opset: 15,
            ai_onnx_ml_opset: 3,
            scaler: ScalerKind::Robust,
            max_samples: MaxSamples::Auto,
            bootstrap: false,
            max_depth: None,
            clip_bound: 1e10,
            n_jobs: None,
        }
    }
}

impl TrainingConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a configuration file, falling back to defaults for missing keys
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            ForestError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        let config: Self = serde_json::from_str(&text).map_err(|e| {
            ForestError::Config(format!("failed to parse {}: {}", path.display(), e))
        })?;
        info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    pub fn with_input(mut self, path: impl Into<PathBuf>) -> Self {
        self.input_csv = path.into();
        self
    }

    pub fn with_output_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_dir = path.into();
        self
    }

    pub fn with_contamination(mut self, contamination: f64) -> Self {
        self.contamination = contamination;
        self
    }

    pub fn with_n_estimators(mut self, n: usize) -> Self {
        self.n_estimators = n.max(1);
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = seed;
        self
    }

    pub fn with_features(mut self, features: Vec<String>) -> Self {
        self.features = features;
        self
    }

    pub fn with_scaler(mut self, scaler: ScalerKind) -> Self {
        self.scaler = scaler;
        self
    }

    pub fn with_validation_split(mut self, split: f64) -> Self {
        self.validation_split = split;
        self
    }

    pub fn with_min_samples(mut self, n: usize) -> Self {
        self.min_samples = n;
        self
    }

    pub fn with_max_samples(mut self, max_samples: MaxSamples) -> Self {
        self.max_samples = max_samples;
        self
    }

    pub fn with_bootstrap(mut self, bootstrap: bool) -> Self {
        self.bootstrap = bootstrap;
        self
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    pub fn with_n_jobs(mut self, n_jobs: usize) -> Self {
        self.n_jobs = Some(n_jobs);
        self
    }

    /// Correct out-of-range settings in place, warning about each correction.
    /// Configuration mistakes never abort a run.
    pub fn sanitize(&mut self) {
        self.contamination = sanitize_contamination(self.contamination);

        if !(0.0..1.0).contains(&self.validation_split) || self.validation_split.is_nan() {
            warn!(
                validation_split = self.validation_split,
                "Validation split outside [0, 1), disabling held-out validation"
            );
            self.validation_split = 0.0;
        }

        if self.n_estimators == 0 {
            warn!("n_estimators = 0, using 100");
            self.n_estimators = 100;
        }

        if let MaxSamples::Fraction(f) = self.max_samples {
            if !(f > 0.0 && f <= 1.0) {
                warn!(fraction = f, "max_samples fraction outside (0, 1], using auto");
                self.max_samples = MaxSamples::Auto;
            }
        }

        if !(self.clip_bound.is_finite() && self.clip_bound > 0.0) {
            warn!(clip_bound = self.clip_bound, "Invalid clip bound, using 1e10");
            self.clip_bound = 1e10;
        }
    }
}

fn lenient_scaler<'de, D>(deserializer: D) -> std::result::Result<ScalerKind, D::Error>
where
    D: Deserializer<'de>,
{
    let name = String::deserialize(deserializer)?;
    Ok(ScalerKind::parse_or_default(&name))
}

/// Clamp a contamination rate to the default when it is outside (0, 0.5)
pub fn sanitize_contamination(contamination: f64) -> f64 {
    if contamination > 0.0 && contamination < 0.5 {
        contamination
    } else {
        warn!(
            contamination,
            fallback = DEFAULT_CONTAMINATION,
            "Contamination is unrealistic, using default"
        );
        DEFAULT_CONTAMINATION
    }
}
