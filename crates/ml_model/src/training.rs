//! Training with an optional randomized hyperparameter search.

use std::time::Instant;

use config::TrainingConfig;
use fraud_structs::{ModelQualityError, PipelineError, PipelineResult};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::dataset::LabeledDataset;
use crate::gbdt::{BoosterParams, GradientBoostedTrees};
use crate::metrics::f1_score;

/// Result of a hyperparameter search.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SearchOutcome {
    pub params: BoosterParams,
    /// Mean F1 over the validation folds.
    pub cv_f1: f64,
    pub candidates: usize,
}

/// A model that passed both quality gates.
#[derive(Debug, Clone)]
pub struct TrainedModel {
    pub model: GradientBoostedTrees,
    pub train_f1: f64,
    pub test_f1: f64,
    pub search: Option<SearchOutcome>,
}

/// Fits a [`GradientBoostedTrees`] and checks it against the quality gates.
#[derive(Debug, Clone, Copy)]
pub struct ModelTrainer {
    config: TrainingConfig,
}

impl ModelTrainer {
    #[must_use]
    pub const fn new(config: TrainingConfig) -> Self {
        Self { config }
    }

    /// Negative count divided by positive count.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Training`] if there are no positive labels.
    pub fn positive_class_weight(labels: &[u8]) -> PipelineResult<f64> {
        let positives = labels.iter().filter(|&&label| label == 1).count();
        if positives == 0 {
            return Err(PipelineError::Training(
                "training split has no positive labels".to_string(),
            ));
        }

        #[allow(clippy::cast_precision_loss)]
        let weight = (labels.len() - positives) as f64 / positives as f64;
        Ok(weight)
    }

    /// Default hyperparameters weighted for the class balance of `train`.
    ///
    /// # Errors
    ///
    /// Returns an error if `train` has no positive labels.
    pub fn base_params(&self, train: &LabeledDataset) -> PipelineResult<BoosterParams> {
        Ok(BoosterParams {
            scale_pos_weight: Self::positive_class_weight(train.labels())?,
            seed: self.config.seed,
            ..BoosterParams::default()
        })
    }

    /// Fits on `train`, scores both splits and applies the quality gates.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::ModelQuality`] if the test F1 is below the
    /// expected score or the train/test gap exceeds the overfitting threshold.
    pub fn train(
        &self,
        train: &LabeledDataset,
        test: &LabeledDataset,
    ) -> PipelineResult<TrainedModel> {
        let base = self.base_params(train)?;

        let search = if self.config.hyperparameter_tuning {
            Some(self.search(train, base)?)
        } else {
            None
        };
        let params = search.map_or(base, |outcome| outcome.params);

        let start = Instant::now();
        let model = GradientBoostedTrees::fit(train, params)?;
        info!(
            trees = params.n_estimators,
            max_depth = params.max_depth,
            duration_ms = start.elapsed().as_millis(),
            "Fitted model"
        );

        let train_f1 = f1_score(train.labels(), &model.predict(train.features())?);
        info!(train_f1, "Train F1 score");
        let test_f1 = f1_score(test.labels(), &model.predict(test.features())?);
        info!(test_f1, "Test F1 score");

        self.check_quality(train_f1, test_f1)?;

        Ok(TrainedModel {
            model,
            train_f1,
            test_f1,
            search,
        })
    }

    /// # Errors
    ///
    /// Returns the first quality gate the scores fail.
    pub fn check_quality(&self, train_f1: f64, test_f1: f64) -> Result<(), ModelQualityError> {
        if test_f1 < self.config.expected_score {
            return Err(ModelQualityError::BelowExpectedScore {
                test_f1,
                expected: self.config.expected_score,
            });
        }

        let diff = (train_f1 - test_f1).abs();
        if diff > self.config.overfitting_threshold {
            return Err(ModelQualityError::Overfitting {
                diff,
                threshold: self.config.overfitting_threshold,
            });
        }

        info!(diff, "Model passed quality gates");
        Ok(())
    }

    /// Randomized search scored by stratified k-fold F1.
    ///
    /// Candidates and folds are drawn up front from the seeded RNG, then
    /// evaluated on a pool of `worker_threads` threads. Ties keep the earliest
    /// candidate.
    ///
    /// # Errors
    ///
    /// Returns an error if the pool cannot be built or a fit fails.
    pub fn search(&self, train: &LabeledDataset, base: BoosterParams) -> PipelineResult<SearchOutcome> {
        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let candidates = sample_candidates(&mut rng, self.config.tuning_iterations, base);
        let folds = stratified_folds(train.labels(), self.config.cv_folds, &mut rng)?;

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.worker_threads.max(1))
            .build()
            .map_err(|err| PipelineError::Training(err.to_string()))?;

        info!(
            candidates = candidates.len(),
            folds = folds.len(),
            threads = pool.current_num_threads(),
            "Starting hyperparameter search"
        );
        let start = Instant::now();

        let scores: Vec<PipelineResult<f64>> = pool.install(|| {
            candidates
                .par_iter()
                .map(|params| cross_validate(train, *params, &folds))
                .collect()
        });

        let mut best: Option<(BoosterParams, f64)> = None;
        for (params, score) in candidates.iter().zip(scores) {
            let score = score?;
            debug!(
                n_estimators = params.n_estimators,
                max_depth = params.max_depth,
                learning_rate = params.learning_rate,
                cv_f1 = score,
                "Evaluated candidate"
            );
            if best.is_none_or(|(_, current)| score > current) {
                best = Some((*params, score));
            }
        }

        let Some((params, cv_f1)) = best else {
            return Err(PipelineError::Training(
                "hyperparameter search needs at least one candidate".to_string(),
            ));
        };

        info!(
            n_estimators = params.n_estimators,
            max_depth = params.max_depth,
            learning_rate = params.learning_rate,
            subsample = params.subsample,
            colsample_bytree = params.colsample_bytree,
            cv_f1,
            duration_ms = start.elapsed().as_millis(),
            "Best parameters from random search"
        );

        Ok(SearchOutcome {
            params,
            cv_f1,
            candidates: candidates.len(),
        })
    }
}

/// Draws `count` candidates from the search space around `base`.
pub fn sample_candidates(rng: &mut StdRng, count: usize, base: BoosterParams) -> Vec<BoosterParams> {
    (0..count)
        .map(|_| BoosterParams {
            n_estimators: rng.gen_range(100..300),
            max_depth: rng.gen_range(3..10),
            learning_rate: rng.gen_range(0.01..0.31),
            subsample: rng.gen_range(0.6..1.0),
            colsample_bytree: rng.gen_range(0.6..1.0),
            ..base
        })
        .collect()
}

/// Splits row indices into `k` folds with the label ratio preserved.
///
/// # Errors
///
/// Returns an error if `k < 2` or a class has fewer than `k` rows.
pub fn stratified_folds(labels: &[u8], k: usize, rng: &mut StdRng) -> PipelineResult<Vec<Vec<usize>>> {
    if k < 2 {
        return Err(PipelineError::Training(format!(
            "cross-validation needs at least 2 folds, got {k}"
        )));
    }

    let mut folds = vec![Vec::new(); k];
    for class in [0, 1] {
        let mut rows: Vec<usize> = labels
            .iter()
            .enumerate()
            .filter(|&(_, &label)| label == class)
            .map(|(index, _)| index)
            .collect();
        if rows.len() < k {
            return Err(PipelineError::Training(format!(
                "class {class} has {} rows, fewer than {k} folds",
                rows.len()
            )));
        }

        rows.shuffle(rng);
        for (position, row) in rows.into_iter().enumerate() {
            folds[position % k].push(row);
        }
    }

    for fold in &mut folds {
        fold.sort_unstable();
    }
    Ok(folds)
}

/// Mean validation F1 of `params` over the folds.
///
/// # Errors
///
/// Returns an error if a fold fit fails.
pub fn cross_validate(
    dataset: &LabeledDataset,
    params: BoosterParams,
    folds: &[Vec<usize>],
) -> PipelineResult<f64> {
    let mut total = 0.0;
    for (held_out, validation_rows) in folds.iter().enumerate() {
        let training_rows: Vec<usize> = folds
            .iter()
            .enumerate()
            .filter(|&(index, _)| index != held_out)
            .flat_map(|(_, rows)| rows.iter().copied())
            .collect();

        let model = GradientBoostedTrees::fit(&dataset.select_rows(&training_rows), params)?;
        let validation = dataset.select_rows(validation_rows);
        total += f1_score(validation.labels(), &model.predict(validation.features())?);
    }

    #[allow(clippy::cast_precision_loss)]
    let mean = total / folds.len() as f64;
    Ok(mean)
}

#[cfg(test)]
mod tests {
    use ndarray::Array2;

    use super::*;

    fn dataset(rows: usize, seed: u64) -> LabeledDataset {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut labels = Vec::with_capacity(rows);
        let features = Array2::from_shape_fn((rows, 2), |(i, j)| {
            let fraud = i % 5 == 0;
            if j == 0 {
                labels.push(u8::from(fraud));
            }
            match (j, fraud) {
                (0, true) => rng.gen_range(600.0..900.0),
                (0, false) => rng.gen_range(10.0..150.0),
                _ => rng.gen_range(0.0..1.0),
            }
        });
        LabeledDataset::new(vec!["AMOUNT".to_string(), "NOISE".to_string()], features, labels)
            .unwrap()
    }

    fn config(tuning: bool) -> TrainingConfig {
        TrainingConfig {
            hyperparameter_tuning: tuning,
            tuning_iterations: 3,
            cv_folds: 3,
            worker_threads: 2,
            expected_score: 0.8,
            overfitting_threshold: 0.1,
            top_features: 15,
            seed: 42,
        }
    }

    #[test]
    fn test_positive_class_weight() {
        assert!((ModelTrainer::positive_class_weight(&[0, 0, 0, 1]).unwrap() - 3.0).abs() < 1e-12);
        assert!(ModelTrainer::positive_class_weight(&[0, 0]).is_err());
    }

    #[test]
    fn test_quality_gates() {
        let trainer = ModelTrainer::new(config(false));

        assert!(trainer.check_quality(0.9, 0.85).is_ok());
        assert!(matches!(
            trainer.check_quality(0.9, 0.7),
            Err(ModelQualityError::BelowExpectedScore { .. })
        ));
        assert!(matches!(
            trainer.check_quality(1.0, 0.85),
            Err(ModelQualityError::Overfitting { .. })
        ));
    }

    #[test]
    fn test_train_separable_data() {
        let trained = ModelTrainer::new(config(false))
            .train(&dataset(300, 1), &dataset(100, 2))
            .unwrap();

        assert!((trained.test_f1 - 1.0).abs() < 1e-12);
        assert!(trained.search.is_none());
        assert!((trained.model.params().scale_pos_weight - 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_search_is_deterministic() {
        let trainer = ModelTrainer::new(config(true));
        let train = dataset(150, 3);
        let base = trainer.base_params(&train).unwrap();

        let first = trainer.search(&train, base).unwrap();
        let second = trainer.search(&train, base).unwrap();

        assert_eq!(first, second);
        assert_eq!(first.candidates, 3);
        assert!((100..300).contains(&first.params.n_estimators));
    }

    #[test]
    fn test_stratified_folds_cover_rows_once() {
        let labels: Vec<u8> = (0..30).map(|i| u8::from(i % 3 == 0)).collect();
        let mut rng = StdRng::seed_from_u64(5);
        let folds = stratified_folds(&labels, 3, &mut rng).unwrap();

        let mut all: Vec<usize> = folds.concat();
        all.sort_unstable();
        assert_eq!(all, (0..30).collect::<Vec<_>>());

        let positives: Vec<usize> = folds
            .iter()
            .map(|fold| fold.iter().filter(|&&row| labels[row] == 1).count())
            .collect();
        assert_eq!(positives, vec![4, 3, 3]);
    }

    #[test]
    fn test_too_few_rows_for_folds() {
        let mut rng = StdRng::seed_from_u64(6);
        assert!(stratified_folds(&[0, 0, 0, 1], 3, &mut rng).is_err());
        assert!(stratified_folds(&[0, 1], 1, &mut rng).is_err());
    }
}
