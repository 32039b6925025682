//! One module per pipeline stage. Each stage reads the previous artifact,
//! writes its outputs under the run directory and returns its own artifact.

use database::read_table;
use feature_extractor::FEATURE_NAMES;
use fraud_structs::PipelineResult;
use ml_model::LabeledDataset;
use object_store::path::Path as ObjectStorePath;

use crate::context::PipelineContext;

pub mod evaluation;
pub mod feature_engineering;
pub mod ingestion;
pub mod preprocessing;
pub mod pusher;
pub mod training;
pub mod validation;

/// Reads a train or test split written by preprocessing.
async fn read_dataset(
    context: &PipelineContext,
    path: &ObjectStorePath,
) -> PipelineResult<LabeledDataset> {
    let table = read_table(context.store(), path).await?;
    LabeledDataset::from_table(&table, &FEATURE_NAMES)
}
