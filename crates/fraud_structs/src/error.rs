//! Error taxonomy shared by every pipeline crate.
//!
//! Errors fall into three kinds so the invoking scheduler can react differently:
//! configuration problems (fatal before any stage runs), business-rule
//! violations (schema and quality gates) and infrastructure faults.

use core::fmt;

use thiserror::Error;

use crate::Stage;

/// Result alias used across the pipeline crates.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Coarse classification of a [`PipelineError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A required configuration value is missing or malformed.
    Configuration,
    /// The data or the model violated a rule of the pipeline.
    BusinessRule,
    /// Storage, database, serialization or IO failure.
    Infrastructure,
}

/// Required columns are absent or a cell could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("missing required columns in {source_name}: {}", .columns.join(", "))]
    MissingColumns {
        source_name: String,
        columns: Vec<String>,
    },

    #[error("invalid value {value:?} for column {column} at row {row}")]
    InvalidValue {
        column: String,
        row: usize,
        value: String,
    },
}

/// A trained model failed one of the quality gates.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelQualityError {
    #[error("model performance below expected score: {test_f1} < {expected}")]
    BelowExpectedScore { test_f1: f64, expected: f64 },

    #[error("overfitting detected: score diff {diff} exceeds threshold {threshold}")]
    Overfitting { diff: f64, threshold: f64 },

    #[error(
        "current model is not better than the deployed model: challenger {challenger_f1} < champion {champion_f1}"
    )]
    ChampionNotBeaten { champion_f1: f64, challenger_f1: f64 },
}

/// Every failure the pipeline can surface.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("configuration value {key} is missing or invalid: {reason}")]
    Configuration { key: String, reason: String },

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error("statistical test on column {column} failed: {reason}")]
    StatisticalTest { column: String, reason: String },

    #[error(transparent)]
    ModelQuality(#[from] ModelQualityError),

    #[error("version slot {version} was taken by a concurrent promotion after {attempts} attempts")]
    RegistryRace { version: u32, attempts: usize },

    #[error("current batch must contain at least one transaction")]
    EmptyBatch,

    #[error("cannot balance dataset: {0}")]
    Balancing(String),

    #[error("training failed: {0}")]
    Training(String),

    #[error("artifact not found: {0}")]
    NotFound(String),

    #[error("stage {stage} failed: {source}")]
    StageFailed {
        stage: Stage,
        #[source]
        source: Box<PipelineError>,
    },

    #[error("object store error: {0}")]
    ObjectStore(#[from] object_store::Error),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    /// Wraps an error with the stage it originated from.
    #[must_use]
    pub fn in_stage(self, stage: Stage) -> Self {
        Self::StageFailed {
            stage,
            source: Box::new(self),
        }
    }

    /// Classifies the error, looking through stage wrappers.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration { .. } => ErrorKind::Configuration,
            Self::Schema(_)
            | Self::StatisticalTest { .. }
            | Self::ModelQuality(_)
            | Self::EmptyBatch
            | Self::Balancing(_) => ErrorKind::BusinessRule,
            Self::StageFailed { source, .. } => source.kind(),
            Self::RegistryRace { .. }
            | Self::Training(_)
            | Self::NotFound(_)
            | Self::ObjectStore(_)
            | Self::Database(_)
            | Self::Csv(_)
            | Self::Serialization(_)
            | Self::Io(_) => ErrorKind::Infrastructure,
        }
    }

    /// Returns the stage name when the error was raised inside a stage.
    #[must_use]
    pub const fn stage(&self) -> Option<Stage> {
        match self {
            Self::StageFailed { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// Builds a serialization error from any displayable source.
    pub fn serialization(err: impl fmt::Display) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization(err)
    }
}
