//! Telemetry preprocessing
//!
//! Turns a raw telemetry table into a validated, finite [`FeatureMatrix`]:
//! - Input validation (row counts, required columns, data quality warnings)
//! - Composite feature derivation (memory usage ratio)
//! - Variance-based feature selection
//! - Median imputation and non-finite clamping
//! - Feature scaling (standard or robust)

pub mod composite;
pub mod feature_selection;
pub mod imputer;
mod loader;
mod scaler;

pub use composite::UsageRatio;
pub use feature_selection::{FeatureRejection, FeatureSelection};
pub use imputer::MedianImputer;
pub use loader::{LoadReport, LoadedData, TelemetryLoader};
pub use scaler::{Scaler, ScalerKind, ScalerParams};

use crate::error::{ForestError, Result};
use ndarray::{Array2, Axis};
use polars::prelude::*;

/// Named, order-significant N x F matrix of feature values
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    names: Vec<String>,
    values: Array2<f64>,
}

impl FeatureMatrix {
    /// Create a matrix, checking that every column has a name
    pub fn new(names: Vec<String>, values: Array2<f64>) -> Result<Self> {
        if names.len() != values.ncols() {
            return Err(ForestError::ShapeError {
                expected: format!("{} columns", names.len()),
                actual: format!("{} columns", values.ncols()),
            });
        }
        Ok(Self { names, values })
    }

    /// Build from equally long columns, in the given name order
    pub fn from_columns(names: Vec<String>, columns: Vec<Vec<f64>>) -> Result<Self> {
        let n_rows = columns.first().map(|c| c.len()).unwrap_or(0);
        if let Some(bad) = columns.iter().find(|c| c.len() != n_rows) {
            return Err(ForestError::ShapeError {
                expected: format!("{} rows", n_rows),
                actual: format!("{} rows", bad.len()),
            });
        }
        let values = Array2::from_shape_fn((n_rows, columns.len()), |(i, j)| columns[j][i]);
        Self::new(names, values)
    }

    /// Feature names in column order
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Underlying values
    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    pub fn n_samples(&self) -> usize {
        self.values.nrows()
    }

    pub fn n_features(&self) -> usize {
        self.values.ncols()
    }

    /// Copy of row `i`
    pub fn row(&self, i: usize) -> Vec<f64> {
        self.values.row(i).to_vec()
    }

    /// Column index of a feature
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    /// New matrix with the given rows, in the given order
    pub fn select_rows(&self, indices: &[usize]) -> Self {
        Self {
            names: self.names.clone(),
            values: self.values.select(Axis(0), indices),
        }
    }

    /// Position of the first non-finite value, as (row, column)
    pub fn first_non_finite(&self) -> Option<(usize, usize)> {
        self.values
            .indexed_iter()
            .find(|(_, v)| !v.is_finite())
            .map(|(idx, _)| idx)
    }

    /// Convert to a polars frame (used for the debug copy)
    pub fn to_dataframe(&self) -> Result<DataFrame> {
        let columns: Vec<Column> = self
            .names
            .iter()
            .enumerate()
            .map(|(j, name)| {
                Series::new(name.as_str().into(), self.values.column(j).to_vec()).into()
            })
            .collect();
        Ok(DataFrame::new(columns)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_from_columns() {
        let m = FeatureMatrix::from_columns(
            names(&["a", "b"]),
            vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]],
        )
        .unwrap();
        assert_eq!(m.n_samples(), 3);
        assert_eq!(m.n_features(), 2);
        assert_eq!(m.row(1), vec![2.0, 5.0]);
        assert_eq!(m.column_index("b"), Some(1));
    }

    #[test]
    fn test_shape_mismatch() {
        let err = FeatureMatrix::from_columns(names(&["a", "b"]), vec![vec![1.0], vec![1.0, 2.0]]);
        assert!(matches!(err, Err(ForestError::ShapeError { .. })));

        let err = FeatureMatrix::new(names(&["a"]), Array2::zeros((2, 2)));
        assert!(matches!(err, Err(ForestError::ShapeError { .. })));
    }

    #[test]
    fn test_select_rows_and_finiteness() {
        let m = FeatureMatrix::from_columns(
            names(&["a", "b"]),
            vec![vec![1.0, f64::NAN, 3.0], vec![4.0, 5.0, 6.0]],
        )
        .unwrap();
        assert_eq!(m.first_non_finite(), Some((1, 0)));

        let subset = m.select_rows(&[2, 0]);
        assert_eq!(subset.row(0), vec![3.0, 6.0]);
        assert_eq!(subset.first_non_finite(), None);
    }

    #[test]
    fn test_to_dataframe() {
        let m = FeatureMatrix::from_columns(names(&["cpu_usage", "net_in"]), vec![vec![1.0, 2.0], vec![3.0, 4.0]])
            .unwrap();
        let df = m.to_dataframe().unwrap();
        assert_eq!(df.height(), 2);
        assert_eq!(df.width(), 2);
    }
}
