//! Card fraud detection pipeline.
//!
//! Trains a gradient-boosted classifier on transactions from the document
//! store, gates it against the current champion and promotes accepted models
//! to a versioned registry. Also serves single-transaction predictions.

pub mod commands;
pub mod context;
pub mod pipeline;
pub mod predict;
pub mod stages;

#[cfg(test)]
mod test_support;

pub use context::PipelineContext;
pub use pipeline::{PipelineOutcome, TrainingPipeline};
pub use predict::{Prediction, Predictor, Verdict, compute_features, load_latest_model};
