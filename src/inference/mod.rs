//! Inference from an exported bundle
//!
//! The scorer refuses bundles whose feature-order hash differs from the
//! caller's feature ordering, or whose documents disagree with each other.

mod engine;

pub use engine::{BundleScorer, Prediction};
