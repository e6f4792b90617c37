//! Composite feature derivation

use serde::{Deserialize, Serialize};

/// Percentage derived from a (used, total) counter pair:
/// `100 * used / total`, clamped to [0, 100].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageRatio {
    /// Name of the derived feature
    pub output: String,
    /// Column holding the used counter
    pub used: String,
    /// Column holding the total counter
    pub total: String,
}

impl UsageRatio {
    /// `memory_usage` from `memory_used_kb` / `memory_total_kb`
    pub fn memory() -> Self {
        Self {
            output: "memory_usage".to_string(),
            used: "memory_used_kb".to_string(),
            total: "memory_total_kb".to_string(),
        }
    }

    /// Columns that must be present to derive the feature
    pub fn required_columns(&self) -> [&str; 2] {
        [&self.used, &self.total]
    }

    /// Derive the ratio row by row. Rows with a missing counter, `total <= 0`
    /// or `used < 0` map to 0. Returns the values and the number of such rows.
    pub fn derive(&self, used: &[Option<f64>], total: &[Option<f64>]) -> (Vec<f64>, usize) {
        let mut invalid = 0;
        let values = used
            .iter()
            .zip(total)
            .map(|(u, t)| match (u, t) {
                (Some(u), Some(t)) if *t > 0.0 && *u >= 0.0 && u.is_finite() && t.is_finite() => {
                    (u / t * 100.0).clamp(0.0, 100.0)
                }
                _ => {
                    invalid += 1;
                    0.0
                }
            })
            .collect();
        (values, invalid)
    }
}
