//! Turns the validated snapshot into the feature-engineered table.

use database::{read_table, write_table};
use feature_extractor::{FeatureEngine, Mode, feature_table};
use fraud_structs::{
    DataValidationArtifact, FeatureEngineeringArtifact, PipelineResult, Stage, Transaction,
    schema,
};
use tracing::{debug, info};

use crate::context::PipelineContext;

pub const FEATURE_TABLE_FILE: &str = "feature_engineered_main.csv";

/// Cleans the snapshot and computes training-mode features.
///
/// # Errors
///
/// Returns a schema error if required columns are missing, or an error if
/// the snapshot is empty or cannot be read or written.
pub async fn run(
    context: &PipelineContext,
    validation: &DataValidationArtifact,
) -> PipelineResult<FeatureEngineeringArtifact> {
    info!("=== Feature engineering started ===");

    info!(path = %validation.validated_path(), "Step 1: Reading validated dataset");
    let table = read_table(context.store(), validation.validated_path()).await?;

    info!("Step 2: Keeping required columns and dropping empty and duplicate rows");
    let mut table = table.select(&schema::schema_column_names(true), "validated dataset")?;
    let dropped_na = table.drop_na();
    let dropped_duplicates = table.drop_duplicates();
    debug!(dropped_na, dropped_duplicates, rows = table.len(), "Cleaned dataset");

    let transactions = Transaction::from_table(&table, "validated dataset", true)?;

    info!(rows = transactions.len(), "Step 3: Computing features");
    let engine = FeatureEngine::new(context.config.features);
    let vectors = engine.compute(&transactions, Mode::Training)?;
    let features = feature_table(&vectors);

    let path = context.stage_path(Stage::FeatureEngineering, FEATURE_TABLE_FILE);
    info!(path = %path, "Step 4: Saving feature-engineered dataset");
    write_table(context.store(), &path, &features).await?;

    info!(rows = features.len(), "Feature engineering completed");
    Ok(FeatureEngineeringArtifact::new(path, features.len()))
}
