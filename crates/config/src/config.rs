use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use fraud_structs::{PipelineError, PipelineResult};
use object_store::ObjectStore;
use object_store::local::LocalFileSystem;
use tracing::debug;

mod pipeline;

pub use pipeline::*;

/// Reads an environment variable and parses it, falling back to `default`
/// when it is unset or unparsable.
pub fn get_env_or_default<T: core::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

/// Returns the base path for the artifact store.
#[must_use]
pub fn get_base_path() -> PathBuf {
    std::env::var("ARTIFACT_BASE_PATH").map_or_else(|_| PathBuf::from("."), PathBuf::from)
}

/// Number of worker threads available to CPU-bound steps.
#[must_use]
pub fn available_threads() -> usize {
    std::thread::available_parallelism().map_or(1, NonZeroUsize::get)
}

/// Creates the artifact store rooted at `base_path`, creating the directory if needed.
///
/// # Errors
///
/// Returns an error if the directory cannot be created or the store cannot be opened.
pub fn create_object_store(base_path: &Path) -> PipelineResult<Arc<dyn ObjectStore>> {
    std::fs::create_dir_all(base_path)?;
    debug!(base_path = %base_path.display(), "Opening artifact store");

    Ok(Arc::new(LocalFileSystem::new_with_prefix(base_path)?))
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Database connection URL
    pub database_url: String,

    /// Base directory of the artifact store
    pub artifact_base_path: PathBuf,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// Required environment variables:
    /// - `DATABASE_URL`: `PostgreSQL` connection string of the document store
    ///
    /// Optional environment variables:
    /// - `ARTIFACT_BASE_PATH`: Base directory for run artifacts and the model registry (default: `.`)
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Configuration`] if a required variable is missing.
    pub fn from_env() -> PipelineResult<Self> {
        // Load .env file
        dotenvy::dotenv().ok();

        let database_url = required_var("DATABASE_URL")?;

        Ok(Self {
            database_url,
            artifact_base_path: get_base_path(),
        })
    }
}

fn required_var(key: &str) -> PipelineResult<String> {
    match std::env::var(key) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        Ok(_) => Err(PipelineError::Configuration {
            key: key.to_string(),
            reason: "environment variable is empty".to_string(),
        }),
        Err(err) => Err(PipelineError::Configuration {
            key: key.to_string(),
            reason: format!("environment variable not set ({err})"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use object_store::ObjectStoreExt;
    use object_store::path::Path as ObjectStorePath;

    use super::*;

    #[test]
    fn test_missing_required_var_is_configuration_error() {
        let err = required_var("FRAUD_PIPELINE_TEST_SURELY_UNSET_VAR").unwrap_err();
        assert_eq!(err.kind(), fraud_structs::ErrorKind::Configuration);
        assert!(err.to_string().contains("FRAUD_PIPELINE_TEST_SURELY_UNSET_VAR"));
    }

    #[test]
    fn test_get_env_or_default_falls_back() {
        let value: usize = get_env_or_default("FRAUD_PIPELINE_TEST_SURELY_UNSET_VAR", 7);
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn test_create_object_store_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("nested").join("store");

        let store = create_object_store(&base).unwrap();
        assert!(base.is_dir());

        let path = ObjectStorePath::from("a/b.txt");
        store.put(&path, "hello".into()).await.unwrap();
        let bytes = store.get(&path).await.unwrap().bytes().await.unwrap();
        assert_eq!(bytes.as_ref(), b"hello");
    }
}
