//! Feature selection
//!
//! A candidate feature is kept only when it is present in the table and
//! carries information: more than one distinct observed value and a
//! strictly positive standard deviation.

use crate::utils::stats;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a candidate feature was not retained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureRejection {
    /// Column not present (or removed by the drop list)
    Missing,
    /// One distinct value, or zero standard deviation
    NoVariance,
}

impl fmt::Display for FeatureRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeatureRejection::Missing => f.write_str("missing"),
            FeatureRejection::NoVariance => f.write_str("no variance"),
        }
    }
}

/// Outcome of selecting from the candidate list
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureSelection {
    /// Retained features, in candidate order
    pub accepted: Vec<String>,
    /// Discarded features with the reason
    pub rejected: Vec<(String, FeatureRejection)>,
}

impl FeatureSelection {
    /// Select from `candidates`, preserving their order.
    /// `lookup` returns the raw column for a name, or `None` when unavailable.
    pub fn select<'a, F>(candidates: &[String], mut lookup: F) -> Self
    where
        F: FnMut(&str) -> Option<&'a [Option<f64>]>,
    {
        let mut selection = Self::default();
        for name in candidates {
            if selection.accepted.contains(name) {
                continue;
            }
            match lookup(name) {
                None => selection.rejected.push((name.clone(), FeatureRejection::Missing)),
                Some(values) if !has_variance(values) => {
                    selection.rejected.push((name.clone(), FeatureRejection::NoVariance))
                }
                Some(_) => selection.accepted.push(name.clone()),
            }
        }
        selection
    }
}

/// True when the observed finite values have more than one distinct value
/// and a positive standard deviation
pub fn has_variance(values: &[Option<f64>]) -> bool {
    let observed: Vec<f64> = values
        .iter()
        .filter_map(|v| *v)
        .filter(|v| v.is_finite())
        .collect();

    let Some(first) = observed.first().copied() else {
        return false;
    };
    if observed.iter().all(|&v| v == first) {
        return false;
    }
    stats::std_dev(&observed) > 0.0
}
