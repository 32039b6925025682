//! Balances the feature table and splits it into train and test sets.

use database::{read_table, write_table};
use feature_extractor::FEATURE_NAMES;
use fraud_structs::{
    DataPreprocessingArtifact, FeatureEngineeringArtifact, PipelineResult, Stage,
};
use ml_model::{ClassBalancer, LabeledDataset};
use tracing::info;

use crate::context::PipelineContext;

pub const TRAIN_FILE: &str = "dataset/train.csv";
pub const TEST_FILE: &str = "dataset/test.csv";

/// Writes the model feature columns plus the label for both splits.
///
/// # Errors
///
/// Returns an error if the feature table cannot be read, a class is missing,
/// or a split cannot be written.
pub async fn run(
    context: &PipelineContext,
    features: &FeatureEngineeringArtifact,
) -> PipelineResult<DataPreprocessingArtifact> {
    info!("=== Data preprocessing started ===");

    info!(path = %features.feature_table_path(), "Step 1: Reading feature-engineered dataset");
    let table = read_table(context.store(), features.feature_table_path()).await?;

    info!("Step 2: Selecting model input columns");
    let dataset = LabeledDataset::from_table(&table, &FEATURE_NAMES)?;
    let counts = dataset.class_counts();
    info!(safe = counts.safe, fraud = counts.fraud, "Class counts before balancing");

    info!(
        majority_cap = context.config.preprocessing.majority_cap,
        smote_ratio = context.config.preprocessing.smote_ratio,
        "Step 3: Downsampling, splitting and oversampling"
    );
    let split = ClassBalancer::new(context.config.preprocessing).balance(&dataset)?;

    let train_path = context.stage_path(Stage::Preprocessing, TRAIN_FILE);
    let test_path = context.stage_path(Stage::Preprocessing, TEST_FILE);
    info!(train = %train_path, test = %test_path, "Step 4: Saving train and test datasets");
    write_table(context.store(), &train_path, &split.train.to_table()).await?;
    write_table(context.store(), &test_path, &split.test.to_table()).await?;

    info!("Data preprocessing completed");
    Ok(DataPreprocessingArtifact::new(
        train_path,
        test_path,
        split.train.class_counts(),
        split.test.class_counts(),
    ))
}
