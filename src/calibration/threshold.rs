//! Contamination-based decision offset

use crate::error::{ForestError, Result};
use crate::utils::stats;

/// Offset such that roughly `contamination` of `scores` fall below it:
/// the linear-interpolated `contamination` quantile of the decision scores.
pub fn contamination_offset(scores: &[f64], contamination: f64) -> Result<f64> {
    if scores.is_empty() {
        return Err(ForestError::InvalidParameter {
            name: "scores".to_string(),
            value: "[]".to_string(),
            reason: "cannot calibrate an offset without scores".to_string(),
        });
    }
    if let Some(bad) = scores.iter().find(|s| !s.is_finite()) {
        return Err(ForestError::InvalidParameter {
            name: "scores".to_string(),
            value: bad.to_string(),
            reason: "decision scores must be finite".to_string(),
        });
    }
    Ok(stats::quantile(scores, contamination))
}

/// Number of scores strictly below the offset
pub fn count_below(scores: &[f64], offset: f64) -> usize {
    scores.iter().filter(|&&s| s < offset).count()
}
