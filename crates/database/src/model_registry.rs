//! Versioned model registry laid out as `<root>/<version>/model/<file>`.
//!
//! The registry keeps no counter: every call lists the root and derives the
//! latest version from the integer directory names found there. Promotion
//! claims a version slot with a create-only write of the model blob, so two
//! concurrent promotions can never land on the same version.

use std::sync::Arc;

use bytes::Bytes;
use fraud_structs::{PipelineError, PipelineResult};
use object_store::ObjectStore;
use object_store::path::Path as ObjectStorePath;
use tracing::{debug, info, warn};

use crate::path_utils::{put_new, read_from_object_store};

const MODEL_DIR_NAME: &str = "model";

/// File stored inside a version directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelRole {
    /// Serialized classifier.
    Model,
    /// JSON metadata written alongside the classifier.
    Metadata,
}

impl ModelRole {
    #[must_use]
    pub const fn file_name(self) -> &'static str {
        match self {
            Self::Model => "model.bin",
            Self::Metadata => "metadata.json",
        }
    }
}

/// A model read back from the registry.
#[derive(Debug, Clone)]
pub struct RegisteredModel {
    pub version: u32,
    pub path: ObjectStorePath,
    pub bytes: Bytes,
}

#[derive(Debug, Clone)]
pub struct ModelRegistry {
    store: Arc<dyn ObjectStore>,
    root: String,
    max_attempts: usize,
}

impl ModelRegistry {
    #[must_use]
    pub fn new(store: Arc<dyn ObjectStore>, root: &str, max_attempts: usize) -> Self {
        Self {
            store,
            root: root.trim_matches('/').to_string(),
            max_attempts: max_attempts.max(1),
        }
    }

    /// Lists the integer version directories currently present.
    ///
    /// # Errors
    ///
    /// Returns an error if listing the store fails.
    pub async fn versions(&self) -> PipelineResult<Vec<u32>> {
        let prefix = ObjectStorePath::from(self.root.as_str());
        let listing = match self.store.list_with_delimiter(Some(&prefix)).await {
            Ok(listing) => listing,
            Err(object_store::Error::NotFound { .. }) => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut versions: Vec<u32> = listing
            .common_prefixes
            .iter()
            .filter_map(|dir| dir.filename())
            .filter(|name| name.chars().all(|c| c.is_ascii_digit()))
            .filter_map(|name| name.parse().ok())
            .collect();
        versions.sort_unstable();

        Ok(versions)
    }

    /// Highest version present, or `None` for an empty registry.
    ///
    /// # Errors
    ///
    /// Returns an error if listing the store fails.
    pub async fn latest_version(&self) -> PipelineResult<Option<u32>> {
        Ok(self.versions().await?.last().copied())
    }

    /// Version the next promotion would write: latest + 1, or 0 when empty.
    ///
    /// # Errors
    ///
    /// Returns an error if listing the store fails.
    pub async fn next_write_version(&self) -> PipelineResult<u32> {
        Ok(self
            .latest_version()
            .await?
            .map_or(0, |version| version + 1))
    }

    /// Storage location of `role` within `version`.
    #[must_use]
    pub fn model_path(&self, version: u32, role: ModelRole) -> ObjectStorePath {
        ObjectStorePath::from(format!(
            "{}/{version}/{MODEL_DIR_NAME}/{}",
            self.root,
            role.file_name()
        ))
    }

    /// Location of the latest model blob, if any version exists.
    ///
    /// # Errors
    ///
    /// Returns an error if listing the store fails.
    pub async fn latest_model_path(&self) -> PipelineResult<Option<ObjectStorePath>> {
        Ok(self
            .latest_version()
            .await?
            .map(|version| self.model_path(version, ModelRole::Model)))
    }

    /// Reads the model at the latest version.
    ///
    /// # Errors
    ///
    /// Returns an error if listing or reading the store fails.
    pub async fn load_latest(&self) -> PipelineResult<Option<RegisteredModel>> {
        let Some(version) = self.latest_version().await? else {
            return Ok(None);
        };

        let path = self.model_path(version, ModelRole::Model);
        let bytes = read_from_object_store(self.store.as_ref(), &path).await?;
        debug!(version, path = %path, bytes = bytes.len(), "Loaded latest model");

        Ok(Some(RegisteredModel {
            version,
            path,
            bytes,
        }))
    }

    /// Stores a model under the next free version and returns that version.
    ///
    /// The version slot is claimed by a create-only write of the model blob.
    /// If a concurrent promotion took the slot first the registry is listed
    /// again and the next slot is tried.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::RegistryRace`] when every attempt lost the race,
    /// or a store error.
    pub async fn promote(&self, model: Bytes, metadata: Option<Bytes>) -> PipelineResult<u32> {
        let mut version = 0;

        for attempt in 1..=self.max_attempts {
            version = self.next_write_version().await?;
            let path = self.model_path(version, ModelRole::Model);

            match put_new(self.store.as_ref(), &path, model.clone()).await {
                Ok(()) => {
                    if let Some(metadata) = metadata {
                        let metadata_path = self.model_path(version, ModelRole::Metadata);
                        put_new(self.store.as_ref(), &metadata_path, metadata).await?;
                    }
                    info!(version, path = %path, "Promoted model to registry");
                    return Ok(version);
                }
                Err(PipelineError::ObjectStore(object_store::Error::AlreadyExists { .. })) => {
                    warn!(version, attempt, "Registry version slot already taken, retrying");
                }
                Err(err) => return Err(err),
            }
        }

        Err(PipelineError::RegistryRace {
            version,
            attempts: self.max_attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use object_store::memory::InMemory;

    use super::*;

    fn registry(store: Arc<dyn ObjectStore>) -> ModelRegistry {
        ModelRegistry::new(store, "saved_models", 3)
    }

    #[tokio::test]
    async fn test_empty_registry() {
        let registry = registry(Arc::new(InMemory::new()));

        assert_eq!(registry.latest_version().await.unwrap(), None);
        assert_eq!(registry.next_write_version().await.unwrap(), 0);
        assert!(registry.load_latest().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_latest_and_next_versions() {
        let store: Arc<dyn ObjectStore> = Arc::new(InMemory::new());
        let registry = registry(Arc::clone(&store));

        for version in 0..3 {
            put_new(
                store.as_ref(),
                &registry.model_path(version, ModelRole::Model),
                format!("model {version}"),
            )
            .await
            .unwrap();
        }
        // Non-numeric entries are ignored.
        put_new(store.as_ref(), &ObjectStorePath::from("saved_models/tmp/x"), "x")
            .await
            .unwrap();

        assert_eq!(registry.latest_version().await.unwrap(), Some(2));
        assert_eq!(registry.next_write_version().await.unwrap(), 3);

        let latest = registry.load_latest().await.unwrap().unwrap();
        assert_eq!(latest.version, 2);
        assert_eq!(latest.bytes.as_ref(), b"model 2");
    }

    #[tokio::test]
    async fn test_promote_assigns_dense_versions() {
        let registry = registry(Arc::new(InMemory::new()));

        let first = registry
            .promote(Bytes::from_static(b"a"), Some(Bytes::from_static(b"{}")))
            .await
            .unwrap();
        let second = registry.promote(Bytes::from_static(b"b"), None).await.unwrap();

        assert_eq!((first, second), (0, 1));
        assert_eq!(
            registry.model_path(1, ModelRole::Model).as_ref(),
            "saved_models/1/model/model.bin"
        );
    }

    #[tokio::test]
    async fn test_concurrent_promotions_never_share_a_version() {
        let registry = registry(Arc::new(InMemory::new()));

        let (a, b) = tokio::join!(
            registry.promote(Bytes::from_static(b"a"), None),
            registry.promote(Bytes::from_static(b"b"), None)
        );

        let mut versions = vec![a.unwrap(), b.unwrap()];
        versions.sort_unstable();
        assert_eq!(versions, vec![0, 1]);
    }
}
