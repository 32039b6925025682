//! Fits the classifier, applies the quality gates and writes diagnostics.

use bytes::Bytes;
use database::{put_new, write_json, write_table};
use fraud_structs::{DataPreprocessingArtifact, ModelTrainerArtifact, PipelineResult, Stage};
use ml_model::{BoosterParams, ModelTrainer, SearchOutcome, curve_table, precision_recall_curve};
use serde::Serialize;
use tracing::info;

use super::read_dataset;
use crate::context::PipelineContext;

pub const MODEL_FILE: &str = "model.bin";
pub const TOP_FEATURES_FILE: &str = "trained_features/top_features.json";
pub const PRECISION_RECALL_FILE: &str = "precision_recall_performance.csv";
pub const HYPERPARAMETERS_FILE: &str = "hyperparameters.json";

#[derive(Serialize)]
struct HyperparameterReport<'a> {
    params: &'a BoosterParams,
    search: Option<SearchOutcome>,
}

/// # Errors
///
/// Returns [`fraud_structs::PipelineError::ModelQuality`] if the model fails a
/// quality gate, or an error if an artifact cannot be read or written.
pub async fn run(
    context: &PipelineContext,
    preprocessing: &DataPreprocessingArtifact,
) -> PipelineResult<ModelTrainerArtifact> {
    info!("=== Model training started ===");
    let settings = context.config.training;

    info!("Step 1: Reading train and test datasets");
    let train = read_dataset(context, preprocessing.train_path()).await?;
    let test = read_dataset(context, preprocessing.test_path()).await?;
    info!(
        train_rows = train.len(),
        test_rows = test.len(),
        features = train.feature_names().len(),
        "Loaded datasets"
    );

    info!(
        hyperparameter_tuning = settings.hyperparameter_tuning,
        "Step 2: Training model and checking quality gates"
    );
    let trained = ModelTrainer::new(settings).train(&train, &test)?;

    info!("Step 3: Computing precision and recall per decision threshold");
    let probabilities = trained.model.predict_proba(test.features())?;
    let curve = precision_recall_curve(test.labels(), &probabilities);

    info!(top = settings.top_features, "Step 4: Ranking feature importance");
    let mut top_features = trained.model.feature_importance();
    top_features.truncate(settings.top_features);

    info!("Step 5: Saving model and diagnostics");
    let model_path = context.stage_path(Stage::Training, MODEL_FILE);
    put_new(context.store(), &model_path, Bytes::from(trained.model.to_bytes()?)).await?;

    let top_features_path = context.stage_path(Stage::Training, TOP_FEATURES_FILE);
    write_json(context.store(), &top_features_path, &top_features).await?;

    let precision_recall_path = context.stage_path(Stage::Training, PRECISION_RECALL_FILE);
    write_table(context.store(), &precision_recall_path, &curve_table(&curve)).await?;

    let hyperparameters_path = context.stage_path(Stage::Training, HYPERPARAMETERS_FILE);
    let report = HyperparameterReport {
        params: trained.model.params(),
        search: trained.search,
    };
    write_json(context.store(), &hyperparameters_path, &report).await?;

    info!(
        train_f1 = trained.train_f1,
        test_f1 = trained.test_f1,
        path = %model_path,
        "Model training completed"
    );

    Ok(ModelTrainerArtifact::new(
        model_path,
        trained.train_f1,
        trained.test_f1,
        top_features_path,
        precision_recall_path,
        hyperparameters_path,
    ))
}
