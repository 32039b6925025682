//! Fraud classifier: labeled datasets, class balancing, gradient-boosted
//! trees, training with quality gates and the promotion decision.

mod balancing;
mod dataset;
mod evaluation;
mod gbdt;
mod metrics;
mod training;

pub use balancing::{BalancedSplit, ClassBalancer};
pub use dataset::LabeledDataset;
pub use evaluation::{decide_promotion, evaluate_models};
pub use gbdt::{BoosterParams, DECISION_THRESHOLD, FeatureImportance, GradientBoostedTrees};
pub use metrics::{
    PrecisionRecallPoint, curve_table, f1_score, precision_recall_curve, precision_score,
    recall_score,
};
pub use training::{
    ModelTrainer, SearchOutcome, TrainedModel, cross_validate, sample_candidates,
    stratified_folds,
};
