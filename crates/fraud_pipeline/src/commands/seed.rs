//! Seed command - bulk-inserts a transactions CSV into the document store.

use std::path::Path;

use anyhow::{Context, Result};
use config::PipelineConfig;
use database::DocumentStore;
use fraud_structs::{PipelineResult, Table, Transaction};
use tracing::info;

/// Runs the seed command.
///
/// # Errors
///
/// Returns an error if the file cannot be read or a row does not match the
/// transaction schema.
pub async fn run(config: &PipelineConfig, store: &dyn DocumentStore, file: &Path) -> Result<usize> {
    info!(file = %file.display(), "Seeding transactions");

    let data = tokio::fs::read(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let inserted = seed_csv(config, store, &data).await?;

    info!(inserted, "Seeding completed");
    Ok(inserted)
}

/// Parses CSV bytes into transactions and inserts them as documents.
///
/// Columns outside the transaction schema are dropped. The label column is
/// optional.
///
/// # Errors
///
/// Returns a schema error naming every missing column, or a store error.
pub async fn seed_csv(
    config: &PipelineConfig,
    store: &dyn DocumentStore,
    data: &[u8],
) -> PipelineResult<usize> {
    let table = Table::from_csv(data)?;
    let transactions = Transaction::from_table(&table, "seed file", false)?;
    let documents = transactions.iter().map(Transaction::to_document).collect();

    store
        .insert_many(
            &config.document_store.database,
            &config.document_store.collection,
            documents,
        )
        .await
}
