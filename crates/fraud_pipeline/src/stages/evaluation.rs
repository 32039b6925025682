//! Champion/challenger comparison on the held-out test split.

use database::{read_from_object_store, write_json};
use fraud_structs::{
    DataPreprocessingArtifact, ModelEvaluationArtifact, ModelTrainerArtifact, PipelineResult,
    Stage,
};
use ml_model::{GradientBoostedTrees, evaluate_models};
use tracing::info;

use super::read_dataset;
use crate::context::PipelineContext;
use crate::predict::load_latest_model;

pub const EVALUATION_FILE: &str = "evaluation.json";

/// # Errors
///
/// Returns [`fraud_structs::ModelQualityError::ChampionNotBeaten`] (wrapped)
/// when the deployed model scores higher, or an error if a model or the test
/// split cannot be loaded.
pub async fn run(
    context: &PipelineContext,
    preprocessing: &DataPreprocessingArtifact,
    trainer: &ModelTrainerArtifact,
) -> PipelineResult<ModelEvaluationArtifact> {
    info!("=== Model evaluation started ===");

    info!("Step 1: Resolving the deployed model");
    let champion = load_latest_model(&context.registry())
        .await?
        .map(|(_, model)| model);
    if champion.is_none() {
        info!("No deployed model in the registry");
    }

    info!(path = %trainer.model_path(), "Step 2: Loading the trained model");
    let bytes = read_from_object_store(context.store(), trainer.model_path()).await?;
    let challenger = GradientBoostedTrees::from_bytes(&bytes)?;

    info!("Step 3: Scoring both models on the test split");
    let test = read_dataset(context, preprocessing.test_path()).await?;
    let summary = evaluate_models(champion.as_ref(), &challenger, &test)?;

    let report_path = context.stage_path(Stage::Evaluation, EVALUATION_FILE);
    info!(path = %report_path, "Step 4: Writing evaluation report");
    write_json(context.store(), &report_path, &summary).await?;

    info!(
        accepted = summary.is_model_accepted,
        improved_score = summary.improved_score,
        "Model evaluation completed"
    );
    Ok(ModelEvaluationArtifact::new(report_path, summary))
}
