//! Stage artifacts: immutable records of what each stage produced.
//!
//! Fields are private and only readable through accessors, so an artifact
//! cannot change after the stage that built it returns.

use object_store::path::Path as ObjectStorePath;
use serde::{Deserialize, Serialize};

/// Number of rows per label value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassCounts {
    pub safe: usize,
    pub fraud: usize,
}

impl ClassCounts {
    #[must_use]
    pub fn from_labels(labels: &[u8]) -> Self {
        let fraud = labels.iter().filter(|&&label| label == 1).count();
        Self {
            safe: labels.len() - fraud,
            fraud,
        }
    }

    #[must_use]
    pub const fn total(self) -> usize {
        self.safe + self.fraud
    }
}

#[derive(Debug, Clone)]
pub struct DataIngestionArtifact {
    feature_store_path: ObjectStorePath,
    row_count: usize,
}

impl DataIngestionArtifact {
    #[must_use]
    pub const fn new(feature_store_path: ObjectStorePath, row_count: usize) -> Self {
        Self {
            feature_store_path,
            row_count,
        }
    }

    #[must_use]
    pub const fn feature_store_path(&self) -> &ObjectStorePath {
        &self.feature_store_path
    }

    #[must_use]
    pub const fn row_count(&self) -> usize {
        self.row_count
    }
}

#[derive(Debug, Clone)]
pub struct DataValidationArtifact {
    report_path: ObjectStorePath,
    validated_path: ObjectStorePath,
    missing_columns: usize,
    drifted_columns: usize,
}

impl DataValidationArtifact {
    #[must_use]
    pub const fn new(
        report_path: ObjectStorePath,
        validated_path: ObjectStorePath,
        missing_columns: usize,
        drifted_columns: usize,
    ) -> Self {
        Self {
            report_path,
            validated_path,
            missing_columns,
            drifted_columns,
        }
    }

    #[must_use]
    pub const fn report_path(&self) -> &ObjectStorePath {
        &self.report_path
    }

    /// The snapshot that was validated and is handed to feature engineering.
    #[must_use]
    pub const fn validated_path(&self) -> &ObjectStorePath {
        &self.validated_path
    }

    #[must_use]
    pub const fn missing_columns(&self) -> usize {
        self.missing_columns
    }

    #[must_use]
    pub const fn drifted_columns(&self) -> usize {
        self.drifted_columns
    }
}

#[derive(Debug, Clone)]
pub struct FeatureEngineeringArtifact {
    feature_table_path: ObjectStorePath,
    row_count: usize,
}

impl FeatureEngineeringArtifact {
    #[must_use]
    pub const fn new(feature_table_path: ObjectStorePath, row_count: usize) -> Self {
        Self {
            feature_table_path,
            row_count,
        }
    }

    #[must_use]
    pub const fn feature_table_path(&self) -> &ObjectStorePath {
        &self.feature_table_path
    }

    #[must_use]
    pub const fn row_count(&self) -> usize {
        self.row_count
    }
}

#[derive(Debug, Clone)]
pub struct DataPreprocessingArtifact {
    train_path: ObjectStorePath,
    test_path: ObjectStorePath,
    train_counts: ClassCounts,
    test_counts: ClassCounts,
}

impl DataPreprocessingArtifact {
    #[must_use]
    pub const fn new(
        train_path: ObjectStorePath,
        test_path: ObjectStorePath,
        train_counts: ClassCounts,
        test_counts: ClassCounts,
    ) -> Self {
        Self {
            train_path,
            test_path,
            train_counts,
            test_counts,
        }
    }

    #[must_use]
    pub const fn train_path(&self) -> &ObjectStorePath {
        &self.train_path
    }

    #[must_use]
    pub const fn test_path(&self) -> &ObjectStorePath {
        &self.test_path
    }

    /// Class counts of the oversampled training split.
    #[must_use]
    pub const fn train_counts(&self) -> ClassCounts {
        self.train_counts
    }

    /// Class counts of the untouched test split.
    #[must_use]
    pub const fn test_counts(&self) -> ClassCounts {
        self.test_counts
    }
}

#[derive(Debug, Clone)]
pub struct ModelTrainerArtifact {
    model_path: ObjectStorePath,
    train_f1: f64,
    test_f1: f64,
    top_features_path: ObjectStorePath,
    precision_recall_path: ObjectStorePath,
    hyperparameters_path: ObjectStorePath,
}

impl ModelTrainerArtifact {
    #[must_use]
    pub const fn new(
        model_path: ObjectStorePath,
        train_f1: f64,
        test_f1: f64,
        top_features_path: ObjectStorePath,
        precision_recall_path: ObjectStorePath,
        hyperparameters_path: ObjectStorePath,
    ) -> Self {
        Self {
            model_path,
            train_f1,
            test_f1,
            top_features_path,
            precision_recall_path,
            hyperparameters_path,
        }
    }

    #[must_use]
    pub const fn model_path(&self) -> &ObjectStorePath {
        &self.model_path
    }

    #[must_use]
    pub const fn train_f1(&self) -> f64 {
        self.train_f1
    }

    #[must_use]
    pub const fn test_f1(&self) -> f64 {
        self.test_f1
    }

    #[must_use]
    pub const fn top_features_path(&self) -> &ObjectStorePath {
        &self.top_features_path
    }

    #[must_use]
    pub const fn precision_recall_path(&self) -> &ObjectStorePath {
        &self.precision_recall_path
    }

    #[must_use]
    pub const fn hyperparameters_path(&self) -> &ObjectStorePath {
        &self.hyperparameters_path
    }
}

/// Outcome of the champion/challenger comparison as persisted to the run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EvaluationSummary {
    pub is_model_accepted: bool,
    pub champion_f1: Option<f64>,
    pub challenger_f1: f64,
    /// Challenger minus champion, or the challenger score when no champion exists.
    pub improved_score: f64,
}

#[derive(Debug, Clone)]
pub struct ModelEvaluationArtifact {
    report_path: ObjectStorePath,
    summary: EvaluationSummary,
}

impl ModelEvaluationArtifact {
    #[must_use]
    pub const fn new(report_path: ObjectStorePath, summary: EvaluationSummary) -> Self {
        Self {
            report_path,
            summary,
        }
    }

    #[must_use]
    pub const fn report_path(&self) -> &ObjectStorePath {
        &self.report_path
    }

    #[must_use]
    pub const fn is_model_accepted(&self) -> bool {
        self.summary.is_model_accepted
    }

    #[must_use]
    pub const fn champion_f1(&self) -> Option<f64> {
        self.summary.champion_f1
    }

    #[must_use]
    pub const fn challenger_f1(&self) -> f64 {
        self.summary.challenger_f1
    }

    #[must_use]
    pub const fn improved_score(&self) -> f64 {
        self.summary.improved_score
    }

    #[must_use]
    pub const fn summary(&self) -> EvaluationSummary {
        self.summary
    }
}

#[derive(Debug, Clone)]
pub struct ModelPusherArtifact {
    pusher_model_path: ObjectStorePath,
    registry_version: u32,
    registry_model_path: ObjectStorePath,
}

impl ModelPusherArtifact {
    #[must_use]
    pub const fn new(
        pusher_model_path: ObjectStorePath,
        registry_version: u32,
        registry_model_path: ObjectStorePath,
    ) -> Self {
        Self {
            pusher_model_path,
            registry_version,
            registry_model_path,
        }
    }

    #[must_use]
    pub const fn pusher_model_path(&self) -> &ObjectStorePath {
        &self.pusher_model_path
    }

    #[must_use]
    pub const fn registry_version(&self) -> u32 {
        self.registry_version
    }

    #[must_use]
    pub const fn registry_model_path(&self) -> &ObjectStorePath {
        &self.registry_model_path
    }
}
