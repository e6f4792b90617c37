//! Model training module
//!
//! Drives the end-to-end training run:
//! - Seeded train/validation split
//! - Stage-tagged pipeline (load/validate, scale, train, evaluate, export)

mod engine;
mod split;

pub use engine::{TrainedModel, TrainingPipeline, TrainingReport};
pub use split::TrainValidationSplit;
