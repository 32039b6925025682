//! Pipeline tunables, each overridable from the environment.

use crate::{available_threads, get_env_or_default};

/// Document-store scope of the transaction data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentStoreConfig {
    pub database: String,
    pub collection: String,
    /// Collection receiving feature vectors and verdicts of served predictions.
    pub prediction_log_collection: String,
}

impl Default for DocumentStoreConfig {
    fn default() -> Self {
        Self {
            database: String::from("cards"),
            collection: String::from("transactions"),
            prediction_log_collection: String::from("latest_transactions"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidationConfig {
    /// Reference snapshot inside the artifact store.
    pub base_dataset_path: String,
    pub significance_level: f64,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            base_dataset_path: String::from("dataset/main.csv"),
            significance_level: 0.05,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureConfig {
    pub high_amount_threshold: f64,
    /// Added to ratio denominators.
    pub epsilon: f64,
    /// Seconds reported when a customer has no earlier transaction.
    pub no_history_sentinel: f64,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            high_amount_threshold: 180.0,
            epsilon: 1e-5,
            no_history_sentinel: 999_999.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PreprocessingConfig {
    pub majority_cap: usize,
    pub test_fraction: f64,
    /// Target minority:majority ratio after oversampling the training split.
    pub smote_ratio: f64,
    pub smote_neighbours: usize,
    pub seed: u64,
}

impl Default for PreprocessingConfig {
    fn default() -> Self {
        Self {
            majority_cap: 100_000,
            test_fraction: 0.2,
            smote_ratio: 0.6,
            smote_neighbours: 5,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrainingConfig {
    pub hyperparameter_tuning: bool,
    pub tuning_iterations: usize,
    pub cv_folds: usize,
    pub worker_threads: usize,
    pub expected_score: f64,
    pub overfitting_threshold: f64,
    pub top_features: usize,
    pub seed: u64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            hyperparameter_tuning: false,
            tuning_iterations: 25,
            cv_folds: 3,
            worker_threads: available_threads(),
            expected_score: 0.8,
            overfitting_threshold: 0.1,
            top_features: 15,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryConfig {
    pub root: String,
    pub promotion_attempts: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            root: String::from("saved_models"),
            promotion_attempts: 5,
        }
    }
}

/// All tunables of one pipeline run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineConfig {
    pub document_store: DocumentStoreConfig,
    pub validation: ValidationConfig,
    pub features: FeatureConfig,
    pub preprocessing: PreprocessingConfig,
    pub training: TrainingConfig,
    pub registry: RegistryConfig,
}

impl PipelineConfig {
    /// Builds the configuration from defaults overridden by environment variables.
    ///
    /// Optional environment variables:
    /// - `MONGO_DATABASE`, `MONGO_COLLECTION`, `PREDICTION_LOG_COLLECTION`
    /// - `BASE_DATASET_PATH`, `SIGNIFICANCE_LEVEL`
    /// - `HIGH_AMOUNT_THRESHOLD`, `RATIO_EPSILON`, `NO_HISTORY_SENTINEL`
    /// - `MAJORITY_CAP`, `TEST_FRACTION`, `SMOTE_RATIO`, `SMOTE_NEIGHBOURS`, `RANDOM_SEED`
    /// - `HYPERPARAMETER_TUNING`, `TUNING_ITERATIONS`, `CV_FOLDS`, `TRAINING_THREADS`,
    ///   `EXPECTED_SCORE`, `OVERFITTING_THRESHOLD`, `TOP_FEATURES`
    /// - `MODEL_REGISTRY`, `PROMOTION_ATTEMPTS`
    #[must_use]
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let defaults = Self::default();
        let seed = get_env_or_default("RANDOM_SEED", defaults.preprocessing.seed);

        Self {
            document_store: DocumentStoreConfig {
                database: get_env_or_default("MONGO_DATABASE", defaults.document_store.database),
                collection: get_env_or_default(
                    "MONGO_COLLECTION",
                    defaults.document_store.collection,
                ),
                prediction_log_collection: get_env_or_default(
                    "PREDICTION_LOG_COLLECTION",
                    defaults.document_store.prediction_log_collection,
                ),
            },
            validation: ValidationConfig {
                base_dataset_path: get_env_or_default(
                    "BASE_DATASET_PATH",
                    defaults.validation.base_dataset_path,
                ),
                significance_level: get_env_or_default(
                    "SIGNIFICANCE_LEVEL",
                    defaults.validation.significance_level,
                ),
            },
            features: FeatureConfig {
                high_amount_threshold: get_env_or_default(
                    "HIGH_AMOUNT_THRESHOLD",
                    defaults.features.high_amount_threshold,
                ),
                epsilon: get_env_or_default("RATIO_EPSILON", defaults.features.epsilon),
                no_history_sentinel: get_env_or_default(
                    "NO_HISTORY_SENTINEL",
                    defaults.features.no_history_sentinel,
                ),
            },
            preprocessing: PreprocessingConfig {
                majority_cap: get_env_or_default(
                    "MAJORITY_CAP",
                    defaults.preprocessing.majority_cap,
                ),
                test_fraction: get_env_or_default(
                    "TEST_FRACTION",
                    defaults.preprocessing.test_fraction,
                ),
                smote_ratio: get_env_or_default("SMOTE_RATIO", defaults.preprocessing.smote_ratio),
                smote_neighbours: get_env_or_default(
                    "SMOTE_NEIGHBOURS",
                    defaults.preprocessing.smote_neighbours,
                ),
                seed,
            },
            training: TrainingConfig {
                hyperparameter_tuning: get_env_or_default(
                    "HYPERPARAMETER_TUNING",
                    defaults.training.hyperparameter_tuning,
                ),
                tuning_iterations: get_env_or_default(
                    "TUNING_ITERATIONS",
                    defaults.training.tuning_iterations,
                ),
                cv_folds: get_env_or_default("CV_FOLDS", defaults.training.cv_folds),
                worker_threads: get_env_or_default(
                    "TRAINING_THREADS",
                    defaults.training.worker_threads,
                )
                .max(1),
                expected_score: get_env_or_default(
                    "EXPECTED_SCORE",
                    defaults.training.expected_score,
                ),
                overfitting_threshold: get_env_or_default(
                    "OVERFITTING_THRESHOLD",
                    defaults.training.overfitting_threshold,
                ),
                top_features: get_env_or_default("TOP_FEATURES", defaults.training.top_features),
                seed,
            },
            registry: RegistryConfig {
                root: get_env_or_default("MODEL_REGISTRY", defaults.registry.root),
                promotion_attempts: get_env_or_default(
                    "PROMOTION_ATTEMPTS",
                    defaults.registry.promotion_attempts,
                )
                .max(1),
            },
        }
    }
}
