//! Compares the ingested snapshot against the reference snapshot.

use data_validation::DataValidator;
use database::{read_table, write_yaml};
use fraud_structs::{DataIngestionArtifact, DataValidationArtifact, PipelineResult, Stage};
use object_store::path::Path as ObjectStorePath;
use tracing::{info, warn};

use crate::context::PipelineContext;

pub const REPORT_FILE: &str = "report.yml";

/// Records missing columns and drift in a YAML report. Neither aborts the run.
///
/// # Errors
///
/// Returns an error if either snapshot cannot be read or the report cannot
/// be written.
pub async fn run(
    context: &PipelineContext,
    ingestion: &DataIngestionArtifact,
) -> PipelineResult<DataValidationArtifact> {
    info!("=== Data validation started ===");
    let settings = &context.config.validation;

    let base_path = ObjectStorePath::from(settings.base_dataset_path.as_str());
    info!(path = %base_path, "Step 1: Reading base dataset");
    let base = read_table(context.store(), &base_path).await?;

    info!(path = %ingestion.feature_store_path(), "Step 2: Reading current dataset");
    let current = read_table(context.store(), ingestion.feature_store_path()).await?;

    info!(
        significance_level = settings.significance_level,
        "Step 3: Checking required columns and data drift"
    );
    let report = DataValidator::new(settings.significance_level).validate(&base, &current);
    let drifted = report.drifted_count();
    if drifted > 0 {
        warn!(drifted, "Data drift detected");
    }

    let report_path = context.stage_path(Stage::Validation, REPORT_FILE);
    info!(path = %report_path, "Step 4: Writing validation report");
    write_yaml(context.store(), &report_path, &report).await?;

    info!(
        missing_columns = report.missing_columns.len(),
        drifted,
        skipped = report.skipped.len(),
        "Data validation completed"
    );

    Ok(DataValidationArtifact::new(
        report_path,
        ingestion.feature_store_path().clone(),
        report.missing_columns.len(),
        drifted,
    ))
}
