//! Feature scaling implementations

use super::FeatureMatrix;
use crate::error::{ForestError, Result};
use crate::utils::stats;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::warn;

/// Type of scaler to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalerKind {
    /// Standard scaling (z-score normalization): (x - mean) / std
    Standard,
    /// Robust scaling using median and IQR
    #[default]
    Robust,
}

impl fmt::Display for ScalerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalerKind::Standard => f.write_str("standard"),
            ScalerKind::Robust => f.write_str("robust"),
        }
    }
}

impl FromStr for ScalerKind {
    type Err = ForestError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "standard" => Ok(ScalerKind::Standard),
            "robust" => Ok(ScalerKind::Robust),
            other => Err(ForestError::InvalidParameter {
                name: "scaler".to_string(),
                value: other.to_string(),
                reason: "expected 'standard' or 'robust'".to_string(),
            }),
        }
    }
}

impl ScalerKind {
    /// Parse a scaler name, falling back to robust scaling on unknown names
    pub fn parse_or_default(name: &str) -> Self {
        name.parse().unwrap_or_else(|e: ForestError| {
            warn!(error = %e, "Unknown scaler, using robust");
            ScalerKind::Robust
        })
    }
}

/// Fitted per-feature affine parameters: `scaled = (x - center) / scale`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalerParams {
    pub kind: ScalerKind,
    pub feature_names: Vec<String>,
    /// mean or median
    pub center: Vec<f64>,
    /// std or IQR
    pub scale: Vec<f64>,
}

/// Feature scaler
#[derive(Debug, Clone, Copy, Default)]
pub struct Scaler {
    kind: ScalerKind,
}

impl Scaler {
    /// Create a new scaler
    pub fn new(kind: ScalerKind) -> Self {
        Self { kind }
    }

    pub fn kind(&self) -> ScalerKind {
        self.kind
    }

    /// Fit per-feature center and scale. A zero or non-finite scale is an
    /// error, never silently replaced.
    pub fn fit(&self, data: &FeatureMatrix) -> Result<ScalerParams> {
        let mut center = Vec::with_capacity(data.n_features());
        let mut scale = Vec::with_capacity(data.n_features());

        for (j, name) in data.names().iter().enumerate() {
            let column = data.values().column(j).to_vec();
            let (c, s) = self.compute_params(&column);
            if !(s.is_finite() && s > 0.0) || !c.is_finite() {
                return Err(ForestError::DegenerateScale {
                    feature: name.clone(),
                    scale: s,
                });
            }
            center.push(c);
            scale.push(s);
        }

        Ok(ScalerParams {
            kind: self.kind,
            feature_names: data.names().to_vec(),
            center,
            scale,
        })
    }

    fn compute_params(&self, column: &[f64]) -> (f64, f64) {
        match self.kind {
            ScalerKind::Standard => (stats::mean(column), stats::std_dev(column)),
            ScalerKind::Robust => {
                let sorted = stats::sorted(column);
                let q1 = stats::quantile_sorted(&sorted, 0.25);
                let q3 = stats::quantile_sorted(&sorted, 0.75);
                (stats::quantile_sorted(&sorted, 0.5), q3 - q1)
            }
        }
    }
}

#[inline]
fn scale_value(x: f64, center: f64, scale: f64) -> f64 {
    (x - center) / scale
}

impl ScalerParams {
    pub fn n_features(&self) -> usize {
        self.feature_names.len()
    }

    /// Scale a whole matrix. Columns must match the fitted feature order.
    pub fn transform(&self, data: &FeatureMatrix) -> Result<FeatureMatrix> {
        if data.names() != self.feature_names.as_slice() {
            return Err(ForestError::FeatureOrderMismatch {
                expected: self.feature_names.join(","),
                actual: data.names().join(","),
            });
        }

        let values = data.values();
        let mut scaled = Array2::zeros(values.raw_dim());
        for ((i, j), x) in values.indexed_iter() {
            let v = scale_value(*x, self.center[j], self.scale[j]);
            if !v.is_finite() {
                return Err(ForestError::NonFiniteScaled {
                    feature: self.feature_names[j].clone(),
                    row: i,
                });
            }
            scaled[[i, j]] = v;
        }

        FeatureMatrix::new(self.feature_names.clone(), scaled)
    }

    /// Scale one row. Gives exactly the values [`ScalerParams::transform`]
    /// gives for the same row inside a batch.
    pub fn transform_row(&self, row: &[f64]) -> Result<Vec<f64>> {
        self.check_width(row.len())?;
        row.iter()
            .enumerate()
            .map(|(j, &x)| {
                let v = scale_value(x, self.center[j], self.scale[j]);
                if v.is_finite() {
                    Ok(v)
                } else {
                    Err(ForestError::NonFiniteScaled {
                        feature: self.feature_names[j].clone(),
                        row: 0,
                    })
                }
            })
            .collect()
    }

    /// Map a scaled row back to raw feature units
    pub fn inverse_transform_row(&self, row: &[f64]) -> Result<Vec<f64>> {
        self.check_width(row.len())?;
        Ok(row
            .iter()
            .enumerate()
            .map(|(j, &v)| v * self.scale[j] + self.center[j])
            .collect())
    }

    fn check_width(&self, width: usize) -> Result<()> {
        if width != self.n_features() {
            return Err(ForestError::ShapeError {
                expected: format!("{} features", self.n_features()),
                actual: format!("{} features", width),
            });
        }
        Ok(())
    }
}
