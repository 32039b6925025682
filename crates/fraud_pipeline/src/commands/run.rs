//! Run command - executes one training run end to end.

use std::sync::Arc;

use anyhow::{Context, Result};
use config::PipelineConfig;
use database::DocumentStore;
use fraud_structs::Run;
use object_store::ObjectStore;
use tracing::info;

use crate::context::PipelineContext;
use crate::pipeline::TrainingPipeline;

/// Runs the training pipeline under a fresh run namespace.
///
/// # Errors
///
/// Returns an error naming the failed stage.
pub async fn run(
    config: PipelineConfig,
    artifact_store: Arc<dyn ObjectStore>,
    document_store: Arc<dyn DocumentStore>,
) -> Result<()> {
    let run = Run::start();
    let run_id = run.id().to_string();
    let mut pipeline = TrainingPipeline::new(PipelineContext::new(
        config,
        artifact_store,
        document_store,
        run,
    ));

    let outcome = pipeline
        .run()
        .await
        .with_context(|| format!("Training run {run_id} failed"))?;

    match &outcome.pusher {
        Some(pusher) => info!(
            run_id = %outcome.run_id,
            test_f1 = outcome.training.test_f1(),
            version = pusher.registry_version(),
            path = %pusher.registry_model_path(),
            "Model promoted"
        ),
        None => info!(run_id = %outcome.run_id, "Run finished without promotion"),
    }

    Ok(())
}
