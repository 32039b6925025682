//! Serving-side functions: feature computation against stored history,
//! latest-model resolution and a predictor that logs its verdicts.

use std::fmt;
use std::sync::Arc;

use config::{DocumentStoreConfig, FeatureConfig};
use database::{DocumentStore, ModelRegistry, Query, strip_document_id};
use feature_extractor::{FeatureEngine, FeatureVector};
use fraud_structs::{PipelineError, PipelineResult, Transaction, schema};
use ml_model::{DECISION_THRESHOLD, GradientBoostedTrees};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

/// Computes prediction-mode features for new transactions.
///
/// Only context records strictly earlier than the earliest new transaction
/// contribute to the aggregates.
///
/// # Errors
///
/// Returns a schema error naming missing columns of either input, or
/// [`PipelineError::EmptyBatch`].
pub fn compute_features(
    engine: &FeatureEngine,
    new_transactions: &[Value],
    context: &[Value],
) -> PipelineResult<Vec<FeatureVector>> {
    engine.compute_from_documents(new_transactions, context)
}

/// Loads the model at the registry's latest version.
///
/// # Errors
///
/// Returns an error if the registry cannot be read or the blob does not decode.
pub async fn load_latest_model(
    registry: &ModelRegistry,
) -> PipelineResult<Option<(u32, GradientBoostedTrees)>> {
    let Some(registered) = registry.load_latest().await? else {
        return Ok(None);
    };

    let model = GradientBoostedTrees::from_bytes(&registered.bytes)?;
    info!(version = registered.version, path = %registered.path, "Loaded latest model");
    Ok(Some((registered.version, model)))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    Fraud,
    Safe,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fraud => f.write_str("Fraud"),
            Self::Safe => f.write_str("Safe"),
        }
    }
}

/// Result of scoring one transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub transaction_id: i64,
    pub fraud_probability: f64,
    pub verdict: Verdict,
    pub model_version: u32,
}

/// Scores single transactions with a fixed model.
pub struct Predictor {
    engine: FeatureEngine,
    model: GradientBoostedTrees,
    model_version: u32,
    document_store: Arc<dyn DocumentStore>,
    store_config: DocumentStoreConfig,
}

impl Predictor {
    #[must_use]
    pub const fn new(
        features: FeatureConfig,
        model: GradientBoostedTrees,
        model_version: u32,
        document_store: Arc<dyn DocumentStore>,
        store_config: DocumentStoreConfig,
    ) -> Self {
        Self {
            engine: FeatureEngine::new(features),
            model,
            model_version,
            document_store,
            store_config,
        }
    }

    /// Builds a predictor around the latest registered model.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::NotFound`] if the registry is empty.
    pub async fn from_registry(
        features: FeatureConfig,
        registry: &ModelRegistry,
        document_store: Arc<dyn DocumentStore>,
        store_config: DocumentStoreConfig,
    ) -> PipelineResult<Self> {
        let Some((version, model)) = load_latest_model(registry).await? else {
            return Err(PipelineError::NotFound(
                "no model has been promoted to the registry".to_string(),
            ));
        };

        Ok(Self::new(features, model, version, document_store, store_config))
    }

    #[must_use]
    pub const fn model_version(&self) -> u32 {
        self.model_version
    }

    /// Scores a transaction and appends its features and verdict to the
    /// prediction log collection.
    ///
    /// History is every stored transaction sharing the customer or the terminal.
    ///
    /// # Errors
    ///
    /// Returns a schema error if the transaction lacks a required field, or a
    /// store error.
    pub async fn predict(&self, transaction: Value) -> PipelineResult<Prediction> {
        let parsed = Transaction::from_documents(
            std::slice::from_ref(&transaction),
            "current batch",
            false,
        )?;
        let Some(parsed) = parsed.into_iter().next() else {
            return Err(PipelineError::EmptyBatch);
        };

        let query = Query::Or(vec![
            Query::eq(schema::CUSTOMER_ID, parsed.customer_id),
            Query::eq(schema::TERMINAL_ID, parsed.terminal_id),
        ]);
        let mut context = self
            .document_store
            .find(&self.store_config.database, &self.store_config.collection, &query)
            .await?;
        for document in &mut context {
            strip_document_id(document);
        }
        debug!(
            transaction_id = parsed.transaction_id,
            context = context.len(),
            "Fetched customer and terminal history"
        );

        let vectors = compute_features(&self.engine, &[transaction], &context)?;
        let Some(vector) = vectors.into_iter().next() else {
            return Err(PipelineError::EmptyBatch);
        };

        let fraud_probability = self.score(&vector)?;
        let verdict = if fraud_probability >= DECISION_THRESHOLD {
            Verdict::Fraud
        } else {
            Verdict::Safe
        };

        let mut log_entry = vector.to_document();
        if let Value::Object(map) = &mut log_entry {
            map.insert("prediction".to_string(), Value::from(verdict.to_string()));
            map.insert("fraud_probability".to_string(), Value::from(fraud_probability));
            map.insert("model_version".to_string(), Value::from(self.model_version));
        }
        self.document_store
            .insert_one(
                &self.store_config.database,
                &self.store_config.prediction_log_collection,
                log_entry,
            )
            .await?;

        info!(
            transaction_id = parsed.transaction_id,
            fraud_probability,
            verdict = %verdict,
            "Scored transaction"
        );

        Ok(Prediction {
            transaction_id: parsed.transaction_id,
            fraud_probability,
            verdict,
            model_version: self.model_version,
        })
    }

    /// Orders the feature vector the way the model was trained.
    fn score(&self, vector: &FeatureVector) -> PipelineResult<f64> {
        let input = self
            .model
            .feature_names()
            .iter()
            .map(|name| {
                vector.get(name).ok_or_else(|| {
                    PipelineError::Training(format!("model expects unknown feature {name}"))
                })
            })
            .collect::<PipelineResult<Vec<f64>>>()?;

        let width = input.len();
        let input = Array2::from_shape_vec((1, width), input)
            .map_err(|err| PipelineError::Training(err.to_string()))?;

        let probabilities = self.model.predict_proba(&input)?;
        probabilities
            .first()
            .copied()
            .ok_or(PipelineError::EmptyBatch)
    }
}
