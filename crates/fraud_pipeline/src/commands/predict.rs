//! Predict command - scores one transaction with the latest registered model.

use std::sync::Arc;

use anyhow::{Context, Result};
use config::PipelineConfig;
use database::{DocumentStore, ModelRegistry};
use object_store::ObjectStore;
use tracing::info;

use crate::predict::{Prediction, Predictor};

/// Scores a transaction given as a JSON object.
///
/// # Errors
///
/// Returns an error if the JSON is malformed, no model is registered, or the
/// transaction lacks a required field.
pub async fn run(
    config: &PipelineConfig,
    artifact_store: Arc<dyn ObjectStore>,
    document_store: Arc<dyn DocumentStore>,
    transaction: &str,
) -> Result<Prediction> {
    let transaction: serde_json::Value =
        serde_json::from_str(transaction).context("Transaction must be a JSON object")?;

    let registry = ModelRegistry::new(
        artifact_store,
        &config.registry.root,
        config.registry.promotion_attempts,
    );
    let predictor = Predictor::from_registry(
        config.features,
        &registry,
        document_store,
        config.document_store.clone(),
    )
    .await
    .context("Failed to load the latest model")?;

    let prediction = predictor.predict(transaction).await?;
    info!(
        transaction_id = prediction.transaction_id,
        fraud_probability = prediction.fraud_probability,
        model_version = prediction.model_version,
        "Prediction: {}",
        prediction.verdict
    );

    Ok(prediction)
}
