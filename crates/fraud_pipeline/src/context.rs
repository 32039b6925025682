//! Run-scoped dependencies shared by every stage.

use std::sync::Arc;

use config::PipelineConfig;
use database::{DocumentStore, ModelRegistry};
use fraud_structs::{Run, Stage};
use object_store::ObjectStore;
use object_store::path::Path as ObjectStorePath;

/// Configuration, stores and run namespace of one pipeline execution.
///
/// Built once per run and passed by reference into every stage.
#[derive(Clone)]
pub struct PipelineContext {
    pub config: PipelineConfig,
    pub artifact_store: Arc<dyn ObjectStore>,
    pub document_store: Arc<dyn DocumentStore>,
    pub run: Run,
}

impl PipelineContext {
    #[must_use]
    pub fn new(
        config: PipelineConfig,
        artifact_store: Arc<dyn ObjectStore>,
        document_store: Arc<dyn DocumentStore>,
        run: Run,
    ) -> Self {
        Self {
            config,
            artifact_store,
            document_store,
            run,
        }
    }

    #[must_use]
    pub fn store(&self) -> &dyn ObjectStore {
        self.artifact_store.as_ref()
    }

    /// Output location of `relative` inside the stage directory of this run.
    #[must_use]
    pub fn stage_path(&self, stage: Stage, relative: &str) -> ObjectStorePath {
        self.run.stage_path(stage, relative)
    }

    #[must_use]
    pub fn registry(&self) -> ModelRegistry {
        ModelRegistry::new(
            Arc::clone(&self.artifact_store),
            &self.config.registry.root,
            self.config.registry.promotion_attempts,
        )
    }
}
