//! Exports the transactions collection into the run's feature store.

use std::collections::BTreeSet;

use database::{Query, strip_document_id, write_table};
use fraud_structs::{
    DataIngestionArtifact, PipelineResult, Stage, TRANSACTION_SCHEMA, Table, document_cell,
};
use serde_json::Value;
use tracing::{info, warn};

use crate::context::PipelineContext;

pub const FEATURE_STORE_FILE: &str = "feature_store/main.csv";

/// Fetches every document of the configured collection and writes the snapshot CSV.
///
/// # Errors
///
/// Returns an error if the document store cannot be read or the snapshot
/// cannot be written.
pub async fn run(context: &PipelineContext) -> PipelineResult<DataIngestionArtifact> {
    info!("=== Data ingestion started ===");
    let store_config = &context.config.document_store;

    info!(
        database = %store_config.database,
        collection = %store_config.collection,
        "Step 1: Exporting collection records"
    );
    let mut documents = context
        .document_store
        .find(&store_config.database, &store_config.collection, &Query::All)
        .await?;
    if documents.is_empty() {
        warn!("Collection is empty, the snapshot will have no rows");
    }

    info!("Step 2: Dropping document identifiers");
    for document in &mut documents {
        strip_document_id(document);
    }
    let table = documents_to_table(&documents);

    let path = context.stage_path(Stage::Ingestion, FEATURE_STORE_FILE);
    info!(path = %path, rows = table.len(), "Step 3: Saving snapshot into feature store");
    write_table(context.store(), &path, &table).await?;

    info!("Data ingestion completed");
    Ok(DataIngestionArtifact::new(path, table.len()))
}

/// Builds a table from heterogeneous documents.
///
/// Schema columns come first in schema order, other keys follow sorted. A key
/// absent from a document leaves an empty cell.
#[must_use]
pub fn documents_to_table(documents: &[Value]) -> Table {
    let keys: BTreeSet<&str> = documents
        .iter()
        .filter_map(Value::as_object)
        .flat_map(|object| object.keys().map(String::as_str))
        .collect();

    let mut columns: Vec<String> = TRANSACTION_SCHEMA
        .iter()
        .filter(|spec| keys.contains(spec.name))
        .map(|spec| spec.name.to_string())
        .collect();
    columns.extend(
        keys.iter()
            .filter(|key| !TRANSACTION_SCHEMA.iter().any(|spec| spec.name == **key))
            .map(|key| (*key).to_string()),
    );

    let rows = documents
        .iter()
        .map(|document| {
            columns
                .iter()
                .map(|column| {
                    document
                        .get(column)
                        .and_then(document_cell)
                        .unwrap_or_default()
                })
                .collect()
        })
        .collect();

    Table::new(columns, rows)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_documents_to_table_orders_schema_first() {
        let documents = vec![
            json!({"TX_AMOUNT": 12.5, "TRANSACTION_ID": 1, "EXTRA": "a"}),
            json!({"TRANSACTION_ID": 2, "TX_AMOUNT": 3}),
        ];

        let table = documents_to_table(&documents);

        assert_eq!(table.columns(), ["TRANSACTION_ID", "TX_AMOUNT", "EXTRA"]);
        assert_eq!(table.rows()[0], vec!["1", "12.5", "a"]);
        assert_eq!(table.rows()[1], vec!["2", "3", ""]);
    }
}
