//! Append-only document collections holding the transaction records.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use fraud_structs::PipelineResult;
use serde_json::{Map, Value};
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::debug;

/// Key under which stores expose their internal document identifier.
pub const DOCUMENT_ID_KEY: &str = "_id";

/// Filter applied by [`DocumentStore::find`].
#[derive(Debug, Clone, PartialEq)]
pub enum Query {
    /// Every document of the collection.
    All,
    /// Documents whose top-level `field` equals `value`.
    Eq(String, Value),
    /// Documents matching any of the inner filters.
    Or(Vec<Query>),
}

impl Query {
    #[must_use]
    pub fn eq(field: &str, value: impl Into<Value>) -> Self {
        Self::Eq(field.to_string(), value.into())
    }

    /// Returns whether a document satisfies the filter.
    #[must_use]
    pub fn matches(&self, document: &Value) -> bool {
        match self {
            Self::All => true,
            Self::Eq(field, value) => document.get(field).is_some_and(|found| found == value),
            Self::Or(queries) => queries.iter().any(|query| query.matches(document)),
        }
    }
}

/// Client of a document store scoped by database and collection name.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Returns matching documents in insertion order, each carrying its `_id`.
    async fn find(
        &self,
        database: &str,
        collection: &str,
        query: &Query,
    ) -> PipelineResult<Vec<Value>>;

    /// Appends documents to a collection. Returns the number inserted.
    async fn insert_many(
        &self,
        database: &str,
        collection: &str,
        documents: Vec<Value>,
    ) -> PipelineResult<usize>;

    async fn insert_one(
        &self,
        database: &str,
        collection: &str,
        document: Value,
    ) -> PipelineResult<()> {
        self.insert_many(database, collection, vec![document])
            .await
            .map(|_| ())
    }
}

/// Removes the store's internal identifier from a document.
pub fn strip_document_id(document: &mut Value) {
    if let Value::Object(map) = document {
        map.remove(DOCUMENT_ID_KEY);
    }
}

fn with_document_id(document: Value, id: impl Into<Value>) -> Value {
    match document {
        Value::Object(mut map) => {
            map.insert(DOCUMENT_ID_KEY.to_string(), id.into());
            Value::Object(map)
        }
        other => other,
    }
}

/// Document store backed by a `PostgreSQL` JSONB table.
#[derive(Debug, Clone)]
pub struct PgDocumentStore {
    pool: PgPool,
}

impl PgDocumentStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn push_filter(builder: &mut QueryBuilder<'_, Postgres>, query: &Query) {
        match query {
            Query::All => {
                builder.push("TRUE");
            }
            Query::Eq(field, value) => {
                let mut containment = Map::new();
                containment.insert(field.clone(), value.clone());
                builder.push("body @> ");
                builder.push_bind(Value::Object(containment));
            }
            Query::Or(queries) if queries.is_empty() => {
                builder.push("FALSE");
            }
            Query::Or(queries) => {
                builder.push("(");
                for (index, inner) in queries.iter().enumerate() {
                    if index > 0 {
                        builder.push(" OR ");
                    }
                    Self::push_filter(builder, inner);
                }
                builder.push(")");
            }
        }
    }
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    async fn find(
        &self,
        database: &str,
        collection: &str,
        query: &Query,
    ) -> PipelineResult<Vec<Value>> {
        let mut builder =
            QueryBuilder::<Postgres>::new("SELECT id, body FROM documents WHERE database_name = ");
        builder.push_bind(database.to_string());
        builder.push(" AND collection_name = ");
        builder.push_bind(collection.to_string());
        builder.push(" AND ");
        Self::push_filter(&mut builder, query);
        builder.push(" ORDER BY id");

        let rows: Vec<(i64, Value)> = builder.build_query_as().fetch_all(&self.pool).await?;
        debug!(database, collection, documents = rows.len(), "Fetched documents");

        Ok(rows
            .into_iter()
            .map(|(id, body)| with_document_id(body, id.to_string()))
            .collect())
    }

    async fn insert_many(
        &self,
        database: &str,
        collection: &str,
        documents: Vec<Value>,
    ) -> PipelineResult<usize> {
        if documents.is_empty() {
            return Ok(0);
        }

        let result = sqlx::query(
            r"
            INSERT INTO documents (database_name, collection_name, body)
            SELECT $1, $2, body FROM unnest($3::jsonb[]) AS body
            ",
        )
        .bind(database)
        .bind(collection)
        .bind(documents)
        .execute(&self.pool)
        .await?;

        #[allow(clippy::cast_possible_truncation)]
        let inserted = result.rows_affected() as usize;
        debug!(database, collection, inserted, "Inserted documents");

        Ok(inserted)
    }
}

/// Process-local document store, used in tests and dry runs.
#[derive(Debug, Default)]
pub struct InMemoryDocumentStore {
    collections: Mutex<HashMap<(String, String), Vec<Value>>>,
}

impl InMemoryDocumentStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn find(
        &self,
        database: &str,
        collection: &str,
        query: &Query,
    ) -> PipelineResult<Vec<Value>> {
        let collections = self.collections.lock().unwrap_or_else(PoisonError::into_inner);
        let key = (database.to_string(), collection.to_string());

        Ok(collections
            .get(&key)
            .map(|documents| {
                documents
                    .iter()
                    .enumerate()
                    .filter(|(_, document)| query.matches(document))
                    .map(|(index, document)| with_document_id(document.clone(), index.to_string()))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn insert_many(
        &self,
        database: &str,
        collection: &str,
        documents: Vec<Value>,
    ) -> PipelineResult<usize> {
        let inserted = documents.len();
        let mut collections = self.collections.lock().unwrap_or_else(PoisonError::into_inner);
        collections
            .entry((database.to_string(), collection.to_string()))
            .or_default()
            .extend(documents);
        Ok(inserted)
    }
}
