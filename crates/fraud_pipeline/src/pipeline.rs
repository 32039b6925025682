//! Sequences the stages of one training run.

use std::time::{Duration, Instant};

use fraud_structs::{
    DataIngestionArtifact, DataPreprocessingArtifact, DataValidationArtifact,
    FeatureEngineeringArtifact, ModelEvaluationArtifact, ModelPusherArtifact,
    ModelTrainerArtifact, PipelineResult, Stage,
};
use tracing::{error, info};

use crate::context::PipelineContext;
use crate::stages;

/// Every artifact produced by a completed run.
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub run_id: String,
    pub ingestion: DataIngestionArtifact,
    pub validation: DataValidationArtifact,
    pub feature_engineering: FeatureEngineeringArtifact,
    pub preprocessing: DataPreprocessingArtifact,
    pub training: ModelTrainerArtifact,
    pub evaluation: ModelEvaluationArtifact,
    /// Present only when evaluation accepted the model.
    pub pusher: Option<ModelPusherArtifact>,
}

/// Runs ingestion through promotion. The first failing stage aborts the run.
pub struct TrainingPipeline {
    context: PipelineContext,
    timings: Vec<(Stage, Duration)>,
}

impl TrainingPipeline {
    #[must_use]
    pub const fn new(context: PipelineContext) -> Self {
        Self {
            context,
            timings: Vec::new(),
        }
    }

    #[must_use]
    pub const fn context(&self) -> &PipelineContext {
        &self.context
    }

    /// Runs every stage in order.
    ///
    /// # Errors
    ///
    /// Returns [`fraud_structs::PipelineError::StageFailed`] naming the stage
    /// that failed. Nothing is promoted after a failure.
    pub async fn run(&mut self) -> PipelineResult<PipelineOutcome> {
        let pipeline_start = Instant::now();
        self.timings.clear();
        info!(run_id = %self.context.run.id(), root = %self.context.run.root(), "Starting training pipeline");

        let context = self.context.clone();

        let ingestion = self
            .stage(Stage::Ingestion, stages::ingestion::run(&context))
            .await?;
        let validation = self
            .stage(Stage::Validation, stages::validation::run(&context, &ingestion))
            .await?;
        let feature_engineering = self
            .stage(
                Stage::FeatureEngineering,
                stages::feature_engineering::run(&context, &validation),
            )
            .await?;
        let preprocessing = self
            .stage(
                Stage::Preprocessing,
                stages::preprocessing::run(&context, &feature_engineering),
            )
            .await?;
        let training = self
            .stage(Stage::Training, stages::training::run(&context, &preprocessing))
            .await?;
        let evaluation = self
            .stage(
                Stage::Evaluation,
                stages::evaluation::run(&context, &preprocessing, &training),
            )
            .await?;

        let pusher = if evaluation.is_model_accepted() {
            Some(
                self.stage(
                    Stage::Pusher,
                    stages::pusher::run(&context, &training, &evaluation),
                )
                .await?,
            )
        } else {
            info!("Model was not accepted, skipping promotion");
            None
        };

        self.log_timing_summary(pipeline_start.elapsed());

        Ok(PipelineOutcome {
            run_id: context.run.id().to_string(),
            ingestion,
            validation,
            feature_engineering,
            preprocessing,
            training,
            evaluation,
            pusher,
        })
    }

    /// Stage wall times of the last run, in execution order.
    #[must_use]
    pub fn timings(&self) -> &[(Stage, Duration)] {
        &self.timings
    }

    async fn stage<T>(
        &mut self,
        stage: Stage,
        future: impl Future<Output = PipelineResult<T>>,
    ) -> PipelineResult<T> {
        let start = Instant::now();
        let result = future.await;
        let duration = start.elapsed();
        self.timings.push((stage, duration));

        match result {
            Ok(artifact) => {
                info!(stage = %stage, duration_ms = duration.as_millis(), "Stage complete");
                Ok(artifact)
            }
            Err(err) => {
                error!(stage = %stage, duration_ms = duration.as_millis(), error = %err, "Stage failed");
                Err(err.in_stage(stage))
            }
        }
    }

    fn log_timing_summary(&self, total: Duration) {
        info!(
            total_duration_ms = total.as_millis(),
            total_duration_sec = total.as_secs_f64(),
            "=== Training pipeline timing summary ==="
        );
        for (stage, duration) in &self.timings {
            info!(stage = %stage, duration_ms = duration.as_millis(), "Stage timing");
        }
        info!("=== Training pipeline completed successfully ===");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::TimeDelta;
    use config::PipelineConfig;
    use database::{DocumentStore, ModelRegistry, object_exists, read_json};
    use fraud_structs::{EvaluationSummary, ErrorKind, PipelineError, Run, Transaction};
    use object_store::ObjectStore;

    use super::*;
    use crate::test_support::{
        empty_stores, insert_documents, put_base_snapshot, seeded_stores, start, transactions,
    };

    fn pipeline(
        config: &PipelineConfig,
        artifact_store: &Arc<dyn ObjectStore>,
        document_store: &Arc<dyn DocumentStore>,
        minutes: i64,
    ) -> TrainingPipeline {
        TrainingPipeline::new(PipelineContext::new(
            config.clone(),
            Arc::clone(artifact_store),
            Arc::clone(document_store),
            Run::new(start() + TimeDelta::minutes(minutes)),
        ))
    }

    #[tokio::test]
    async fn test_end_to_end_runs_promote_dense_versions() {
        let config = PipelineConfig::default();
        let (artifact_store, document_store) = seeded_stores(&config, 600).await;

        let mut first = pipeline(&config, &artifact_store, &document_store, 0);
        let outcome = first.run().await.unwrap();

        assert_eq!(outcome.run_id, "010418__000000");
        assert_eq!(outcome.ingestion.row_count(), 600);
        assert_eq!(outcome.validation.missing_columns(), 0);
        assert_eq!(outcome.feature_engineering.row_count(), 600);
        assert_eq!(outcome.preprocessing.test_counts().fraud, 20);
        assert_eq!(outcome.preprocessing.test_counts().safe, 100);
        assert!(outcome.training.test_f1() >= 0.8);
        assert!(outcome.evaluation.is_model_accepted());
        assert_eq!(outcome.evaluation.champion_f1(), None);

        let pusher = outcome.pusher.unwrap();
        assert_eq!(pusher.registry_version(), 0);
        assert_eq!(
            pusher.pusher_model_path().as_ref(),
            "artifacts/010418__000000/model_pusher/saved_models/model.bin"
        );
        assert_eq!(first.timings().len(), Stage::ALL.len());

        for path in [
            outcome.validation.report_path(),
            outcome.training.top_features_path(),
            outcome.training.precision_recall_path(),
            outcome.training.hyperparameters_path(),
        ] {
            assert!(object_exists(artifact_store.as_ref(), path).await.unwrap());
        }

        let summary: EvaluationSummary =
            read_json(artifact_store.as_ref(), outcome.evaluation.report_path())
                .await
                .unwrap();
        assert!(summary.is_model_accepted);

        // Same data and seed: the challenger ties the champion and is accepted.
        let mut second = pipeline(&config, &artifact_store, &document_store, 1);
        let outcome = second.run().await.unwrap();
        assert!(outcome.evaluation.champion_f1().is_some());
        assert_eq!(outcome.pusher.unwrap().registry_version(), 1);

        let registry = ModelRegistry::new(artifact_store, "saved_models", 5);
        assert_eq!(registry.versions().await.unwrap(), vec![0, 1]);
    }

    #[tokio::test]
    async fn test_stage_failure_is_wrapped_and_nothing_is_promoted() {
        let config = PipelineConfig::default();
        let (artifact_store, document_store) = empty_stores();
        insert_documents(
            &config,
            document_store.as_ref(),
            transactions(30).iter().map(Transaction::to_document).collect(),
        )
        .await;

        // No reference snapshot exists, so validation fails.
        let mut pipeline = pipeline(&config, &artifact_store, &document_store, 0);
        let err = pipeline.run().await.unwrap_err();

        assert_eq!(err.stage(), Some(Stage::Validation));
        assert_eq!(err.kind(), ErrorKind::Infrastructure);
        assert!(matches!(
            err,
            PipelineError::StageFailed { ref source, .. }
                if matches!(**source, PipelineError::NotFound(_))
        ));

        let registry = ModelRegistry::new(artifact_store, "saved_models", 5);
        assert_eq!(registry.latest_version().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_missing_schema_column_aborts_feature_engineering() {
        let config = PipelineConfig::default();
        let (artifact_store, document_store) = empty_stores();

        let transactions = transactions(30);
        put_base_snapshot(&config, artifact_store.as_ref(), &transactions).await;
        let documents = transactions
            .iter()
            .map(|transaction| {
                let mut document = transaction.to_document();
                if let Some(map) = document.as_object_mut() {
                    map.remove("TERMINAL_ID");
                }
                document
            })
            .collect();
        insert_documents(&config, document_store.as_ref(), documents).await;

        let mut pipeline = pipeline(&config, &artifact_store, &document_store, 0);
        let err = pipeline.run().await.unwrap_err();

        assert_eq!(err.stage(), Some(Stage::FeatureEngineering));
        assert_eq!(err.kind(), ErrorKind::BusinessRule);
        assert!(err.to_string().contains("TERMINAL_ID"));

        // Validation only records the missing column.
        let report = pipeline
            .context()
            .stage_path(Stage::Validation, stages::validation::REPORT_FILE);
        assert!(object_exists(artifact_store.as_ref(), &report).await.unwrap());
    }
}
