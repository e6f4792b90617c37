//! Missing value handling for retained features

use crate::utils::stats;
use serde::{Deserialize, Serialize};

/// Replaces missing values with the column median of the observed values.
///
/// NaN counts as missing. Infinite values are observed but excluded from
/// the median so the fill value is always finite.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MedianImputer {
    medians: Vec<f64>,
}

impl MedianImputer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fill values computed by the last call to [`MedianImputer::fit_transform`]
    pub fn medians(&self) -> &[f64] {
        &self.medians
    }

    /// Impute every column. Returns the filled columns and, per column, the
    /// number of values that were replaced.
    pub fn fit_transform(&mut self, columns: &[Vec<Option<f64>>]) -> (Vec<Vec<f64>>, Vec<usize>) {
        self.medians.clear();
        let mut filled = Vec::with_capacity(columns.len());
        let mut counts = Vec::with_capacity(columns.len());

        for column in columns {
            let median = column_median(column);
            self.medians.push(median);

            let mut imputed = 0;
            let values = column
                .iter()
                .map(|v| match v {
                    Some(x) if !x.is_nan() => *x,
                    _ => {
                        imputed += 1;
                        median
                    }
                })
                .collect();
            filled.push(values);
            counts.push(imputed);
        }

        (filled, counts)
    }
}

fn column_median(column: &[Option<f64>]) -> f64 {
    let finite: Vec<f64> = column
        .iter()
        .filter_map(|v| *v)
        .filter(|v| v.is_finite())
        .collect();
    if finite.is_empty() {
        0.0
    } else {
        stats::median(&finite)
    }
}

/// Replace any non-finite value with `±bound` (NaN becomes `+bound`).
/// Returns the number of replaced values.
pub fn clamp_non_finite(values: &mut [f64], bound: f64) -> usize {
    let mut clamped = 0;
    for v in values.iter_mut() {
        if !v.is_finite() {
            *v = if *v == f64::NEG_INFINITY { -bound } else { bound };
            clamped += 1;
        }
    }
    clamped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_median_fill() {
        let mut imputer = MedianImputer::new();
        let columns = vec![
            vec![Some(1.0), None, Some(3.0), Some(f64::NAN), Some(5.0)],
            vec![Some(2.0), Some(4.0), Some(6.0), Some(8.0), Some(10.0)],
        ];
        let (filled, counts) = imputer.fit_transform(&columns);

        assert_eq!(filled[0], vec![1.0, 3.0, 3.0, 3.0, 5.0]);
        assert_eq!(filled[1], columns[1].iter().map(|v| v.unwrap()).collect::<Vec<_>>());
        assert_eq!(counts, vec![2, 0]);
        assert_eq!(imputer.medians(), &[3.0, 6.0]);
    }

    #[test]
    fn test_infinite_values_survive_imputation() {
        let mut imputer = MedianImputer::new();
        let (filled, counts) = imputer.fit_transform(&[vec![Some(f64::INFINITY), None, Some(2.0)]]);
        assert_eq!(filled[0][0], f64::INFINITY);
        assert_eq!(filled[0][1], 2.0);
        assert_eq!(counts, vec![1]);
    }

    #[test]
    fn test_all_missing_column_fills_zero() {
        let mut imputer = MedianImputer::new();
        let (filled, _) = imputer.fit_transform(&[vec![None, None]]);
        assert_eq!(filled[0], vec![0.0, 0.0]);
    }

    #[test]
    fn test_clamp_non_finite() {
        let mut values = vec![1.0, f64::INFINITY, f64::NEG_INFINITY, f64::NAN];
        let clamped = clamp_non_finite(&mut values, 1e10);
        assert_eq!(clamped, 3);
        assert_eq!(values, vec![1.0, 1e10, -1e10, 1e10]);
    }
}
