//! Publishes an accepted model to the run directory and the registry.

use bytes::Bytes;
use database::{ModelRole, put_new, read_from_object_store};
use fraud_structs::{
    ModelEvaluationArtifact, ModelPusherArtifact, ModelTrainerArtifact, PipelineResult, Stage,
};
use serde::Serialize;
use tracing::info;

use crate::context::PipelineContext;

pub const PUSHER_MODEL_FILE: &str = "saved_models/model.bin";

/// Stored next to every registered model.
#[derive(Debug, Serialize)]
struct ModelMetadata<'a> {
    run_id: &'a str,
    train_f1: f64,
    test_f1: f64,
    champion_f1: Option<f64>,
    improved_score: f64,
}

/// # Errors
///
/// Returns [`fraud_structs::PipelineError::RegistryRace`] if every version
/// slot attempt was taken concurrently, or a store error.
pub async fn run(
    context: &PipelineContext,
    trainer: &ModelTrainerArtifact,
    evaluation: &ModelEvaluationArtifact,
) -> PipelineResult<ModelPusherArtifact> {
    info!("=== Model pusher started ===");

    info!(path = %trainer.model_path(), "Step 1: Loading the accepted model");
    let model = read_from_object_store(context.store(), trainer.model_path()).await?;

    let pusher_path = context.stage_path(Stage::Pusher, PUSHER_MODEL_FILE);
    info!(path = %pusher_path, "Step 2: Saving model into the pusher directory");
    put_new(context.store(), &pusher_path, model.clone()).await?;

    info!("Step 3: Promoting model to the registry");
    let metadata = ModelMetadata {
        run_id: context.run.id(),
        train_f1: trainer.train_f1(),
        test_f1: trainer.test_f1(),
        champion_f1: evaluation.champion_f1(),
        improved_score: evaluation.improved_score(),
    };
    let metadata = Bytes::from(serde_json::to_vec_pretty(&metadata)?);

    let registry = context.registry();
    let version = registry.promote(model, Some(metadata)).await?;
    let registry_path = registry.model_path(version, ModelRole::Model);

    info!(version, path = %registry_path, "Model pusher completed");
    Ok(ModelPusherArtifact::new(pusher_path, version, registry_path))
}
