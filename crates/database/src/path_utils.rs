//! Utility functions for reading and writing artifacts with `object_store`.
//!
//! Every write is create-only: an artifact location is written exactly once
//! and a second write to it fails instead of overwriting.

use bytes::Bytes;
use fraud_structs::{PipelineError, PipelineResult, Table};
use object_store::path::Path as ObjectStorePath;
use object_store::{ObjectStore, ObjectStoreExt, PutMode, PutPayload};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

/// Writes `payload` to a location that must not exist yet.
///
/// # Errors
///
/// Returns [`object_store::Error::AlreadyExists`] (wrapped) if the location is taken,
/// or any other store error.
pub async fn put_new(
    store: &dyn ObjectStore,
    path: &ObjectStorePath,
    payload: impl Into<PutPayload> + Send,
) -> PipelineResult<()> {
    store
        .put_opts(path, payload.into(), PutMode::Create.into())
        .await?;
    debug!(path = %path, "Wrote artifact");
    Ok(())
}

/// Reads a file from `object_store` and returns the data as bytes.
///
/// # Errors
///
/// Returns [`PipelineError::NotFound`] if nothing is stored at `path`, or any
/// other store error.
pub async fn read_from_object_store(
    store: &dyn ObjectStore,
    path: &ObjectStorePath,
) -> PipelineResult<Bytes> {
    match store.get(path).await {
        Ok(result) => Ok(result.bytes().await?),
        Err(object_store::Error::NotFound { .. }) => Err(PipelineError::NotFound(path.to_string())),
        Err(err) => Err(err.into()),
    }
}

/// Returns whether an object exists at `path`.
///
/// # Errors
///
/// Returns an error if the store cannot be queried.
pub async fn object_exists(store: &dyn ObjectStore, path: &ObjectStorePath) -> PipelineResult<bool> {
    match store.head(path).await {
        Ok(_) => Ok(true),
        Err(object_store::Error::NotFound { .. }) => Ok(false),
        Err(err) => Err(err.into()),
    }
}

/// Reads a CSV table.
///
/// # Errors
///
/// Returns an error if the object is missing or is not valid CSV.
pub async fn read_table(store: &dyn ObjectStore, path: &ObjectStorePath) -> PipelineResult<Table> {
    let bytes = read_from_object_store(store, path).await?;
    Table::from_csv(&bytes)
}

/// Writes a CSV table to a new location.
///
/// # Errors
///
/// Returns an error if serialization or the write fails.
pub async fn write_table(
    store: &dyn ObjectStore,
    path: &ObjectStorePath,
    table: &Table,
) -> PipelineResult<()> {
    put_new(store, path, table.to_csv()?).await
}

/// Writes a value as pretty-printed JSON to a new location.
///
/// # Errors
///
/// Returns an error if serialization or the write fails.
pub async fn write_json<T: Serialize + Sync>(
    store: &dyn ObjectStore,
    path: &ObjectStorePath,
    value: &T,
) -> PipelineResult<()> {
    put_new(store, path, serde_json::to_vec_pretty(value)?).await
}

/// Reads a JSON document.
///
/// # Errors
///
/// Returns an error if the object is missing or does not deserialize.
pub async fn read_json<T: DeserializeOwned>(
    store: &dyn ObjectStore,
    path: &ObjectStorePath,
) -> PipelineResult<T> {
    let bytes = read_from_object_store(store, path).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Writes a value as YAML to a new location.
///
/// # Errors
///
/// Returns an error if serialization or the write fails.
pub async fn write_yaml<T: Serialize + Sync>(
    store: &dyn ObjectStore,
    path: &ObjectStorePath,
    value: &T,
) -> PipelineResult<()> {
    let text = serde_yaml::to_string(value).map_err(PipelineError::serialization)?;
    put_new(store, path, text).await
}
