//! Synthetic transactions and in-memory stores shared by the tests.

use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use config::PipelineConfig;
use database::{DocumentStore, InMemoryDocumentStore, put_new};
use fraud_structs::{Transaction, transactions_to_table};
use object_store::ObjectStore;
use object_store::memory::InMemory;
use object_store::path::Path as ObjectStorePath;

pub fn start() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2018, 4, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
}

/// Every sixth transaction is a fraud with a much higher amount.
pub fn transactions(count: i64) -> Vec<Transaction> {
    (0..count)
        .map(|i| {
            let fraud = i % 6 == 0;
            #[allow(clippy::cast_precision_loss)]
            let tx_amount = if fraud {
                1500.0 + (i * 37 % 300) as f64
            } else {
                10.0 + (i * 53 % 140) as f64
            };
            Transaction {
                transaction_id: i,
                tx_datetime: start() + TimeDelta::minutes(i * 43),
                customer_id: i % 20,
                terminal_id: i % 10,
                tx_amount,
                tx_fraud: Some(u8::from(fraud)),
            }
        })
        .collect()
}

pub fn empty_stores() -> (Arc<dyn ObjectStore>, Arc<dyn DocumentStore>) {
    (
        Arc::new(InMemory::new()),
        Arc::new(InMemoryDocumentStore::new()),
    )
}

/// Writes the reference snapshot.
pub async fn put_base_snapshot(
    config: &PipelineConfig,
    store: &dyn ObjectStore,
    transactions: &[Transaction],
) {
    let base = transactions_to_table(transactions).to_csv().unwrap();
    put_new(
        store,
        &ObjectStorePath::from(config.validation.base_dataset_path.as_str()),
        base,
    )
    .await
    .unwrap();
}

pub async fn insert_documents(
    config: &PipelineConfig,
    store: &dyn DocumentStore,
    documents: Vec<serde_json::Value>,
) {
    store
        .insert_many(
            &config.document_store.database,
            &config.document_store.collection,
            documents,
        )
        .await
        .unwrap();
}

/// Stores holding `count` transactions and a matching reference snapshot.
pub async fn seeded_stores(
    config: &PipelineConfig,
    count: i64,
) -> (Arc<dyn ObjectStore>, Arc<dyn DocumentStore>) {
    let transactions = transactions(count);
    let (artifact_store, document_store) = empty_stores();

    put_base_snapshot(config, artifact_store.as_ref(), &transactions).await;
    insert_documents(
        config,
        document_store.as_ref(),
        transactions.iter().map(Transaction::to_document).collect(),
    )
    .await;

    (artifact_store, document_store)
}
