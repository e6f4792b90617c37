//! Error types for telemetry-forest

use std::fmt;
use thiserror::Error;

/// Result type alias for telemetry-forest operations
pub type Result<T> = std::result::Result<T, ForestError>;

/// Pipeline stage in which a fatal error occurred
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Load,
    Scale,
    Train,
    Evaluate,
    Export,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Load => "load/validate",
            Stage::Scale => "scale",
            Stage::Train => "train",
            Stage::Evaluate => "evaluate",
            Stage::Export => "export",
        };
        f.write_str(name)
    }
}

/// Main error type for the training and export pipeline
#[derive(Error, Debug)]
pub enum ForestError {
    #[error("Input data is empty")]
    EmptyInput,

    #[error("Insufficient samples: {found} < {required}")]
    InsufficientSamples { found: usize, required: usize },

    #[error("Missing required columns: {0:?}")]
    MissingColumns(Vec<String>),

    #[error("Insufficient valid features: {usable:?}, need at least 2")]
    TooFewFeatures { usable: Vec<String> },

    #[error("Degenerate scale for feature '{feature}': {scale}")]
    DegenerateScale { feature: String, scale: f64 },

    #[error("Scaling produced a non-finite value for feature '{feature}' at row {row}")]
    NonFiniteScaled { feature: String, row: usize },

    #[error("Model not fitted")]
    ModelNotFitted,

    #[error("Invalid parameter: {name} = {value}, {reason}")]
    InvalidParameter {
        name: String,
        value: String,
        reason: String,
    },

    #[error("Feature order mismatch: expected {expected}, got {actual}")]
    FeatureOrderMismatch { expected: String, actual: String },

    #[error("Invalid shape: expected {expected}, got {actual}")]
    ShapeError { expected: String, actual: String },

    #[error("Export error: {0}")]
    Export(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Data error: {0}")]
    Data(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("{stage} stage failed: {source}")]
    Stage {
        stage: Stage,
        #[source]
        source: Box<ForestError>,
    },
}

impl ForestError {
    /// Tag this error with the pipeline stage it came from.
    /// Already tagged errors keep their original stage.
    pub fn in_stage(self, stage: Stage) -> Self {
        match self {
            tagged @ ForestError::Stage { .. } => tagged,
            other => ForestError::Stage {
                stage,
                source: Box::new(other),
            },
        }
    }

    /// Stage that failed, if the error was raised by the pipeline
    pub fn stage(&self) -> Option<Stage> {
        match self {
            ForestError::Stage { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// The underlying error with any stage tagging removed
    pub fn root_cause(&self) -> &ForestError {
        match self {
            ForestError::Stage { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

/// Attach a pipeline stage to the error side of a result
pub trait StageContext<T> {
    fn stage(self, stage: Stage) -> Result<T>;
}

impl<T> StageContext<T> for Result<T> {
    fn stage(self, stage: Stage) -> Result<T> {
        self.map_err(|e| e.in_stage(stage))
    }
}

impl From<polars::error::PolarsError> for ForestError {
    fn from(err: polars::error::PolarsError) -> Self {
        ForestError::Data(err.to_string())
    }
}

impl From<serde_json::Error> for ForestError {
    fn from(err: serde_json::Error) -> Self {
        ForestError::Serialization(err.to_string())
    }
}

impl From<ndarray::ShapeError> for ForestError {
    fn from(err: ndarray::ShapeError) -> Self {
        ForestError::ShapeError {
            expected: "valid shape".to_string(),
            actual: err.to_string(),
        }
    }
}
