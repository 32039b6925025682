//! Class balancing: majority downsampling, stratified split and SMOTE.

use config::PreprocessingConfig;
use fraud_structs::{PipelineError, PipelineResult};
use ndarray::{Array2, ArrayView1};
use rand::Rng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::seq::index;
use rand::SeedableRng;
use tracing::{debug, info};

use crate::dataset::LabeledDataset;

/// Train and test splits after balancing.
#[derive(Debug, Clone)]
pub struct BalancedSplit {
    pub train: LabeledDataset,
    pub test: LabeledDataset,
}

/// Balances a labeled dataset with a single seeded RNG.
#[derive(Debug, Clone, Copy)]
pub struct ClassBalancer {
    config: PreprocessingConfig,
}

impl ClassBalancer {
    #[must_use]
    pub const fn new(config: PreprocessingConfig) -> Self {
        Self { config }
    }

    /// Downsamples, splits, then oversamples the training split only.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Balancing`] if a class is absent or the
    /// training minority has fewer than two rows.
    pub fn balance(&self, dataset: &LabeledDataset) -> PipelineResult<BalancedSplit> {
        let mut rng = StdRng::seed_from_u64(self.config.seed);

        let reduced = self.downsample_majority(dataset, &mut rng)?;
        let (train, test) = self.stratified_split(&reduced, &mut rng);
        let train = self.oversample_minority(&train, &mut rng)?;

        let train_counts = train.class_counts();
        let test_counts = test.class_counts();
        info!(
            train_safe = train_counts.safe,
            train_fraud = train_counts.fraud,
            test_safe = test_counts.safe,
            test_fraud = test_counts.fraud,
            "Balanced dataset"
        );

        Ok(BalancedSplit { train, test })
    }

    /// Keeps every minority row and at most `majority_cap` majority rows,
    /// then shuffles the result.
    ///
    /// # Errors
    ///
    /// Returns an error if either class is absent.
    pub fn downsample_majority(
        &self,
        dataset: &LabeledDataset,
        rng: &mut StdRng,
    ) -> PipelineResult<LabeledDataset> {
        let (majority, minority) = class_roles(dataset)?;
        let majority_rows = dataset.indices_of(majority);
        let minority_rows = dataset.indices_of(minority);

        let keep = majority_rows.len().min(self.config.majority_cap);
        let mut selected: Vec<usize> = index::sample(rng, majority_rows.len(), keep)
            .into_iter()
            .map(|position| majority_rows[position])
            .collect();
        selected.extend(minority_rows);
        selected.shuffle(rng);

        debug!(
            majority_before = majority_rows.len(),
            majority_after = keep,
            "Downsampled majority class"
        );

        Ok(dataset.select_rows(&selected))
    }

    /// Holds out `round(n * test_fraction)` rows of each class.
    #[must_use]
    pub fn stratified_split(
        &self,
        dataset: &LabeledDataset,
        rng: &mut StdRng,
    ) -> (LabeledDataset, LabeledDataset) {
        let mut train_rows = Vec::with_capacity(dataset.len());
        let mut test_rows = Vec::new();

        for label in [0, 1] {
            let mut rows = dataset.indices_of(label);
            rows.shuffle(rng);

            let test_len = test_size(rows.len(), self.config.test_fraction);
            test_rows.extend_from_slice(&rows[..test_len]);
            train_rows.extend_from_slice(&rows[test_len..]);
        }

        train_rows.shuffle(rng);
        test_rows.shuffle(rng);

        (dataset.select_rows(&train_rows), dataset.select_rows(&test_rows))
    }

    /// Synthesizes minority rows until the minority reaches
    /// `floor(smote_ratio * majority)`.
    ///
    /// Each synthetic row interpolates between a random minority row and one
    /// of its `k` nearest minority neighbours, `k = min(smote_neighbours, m - 1)`.
    ///
    /// # Errors
    ///
    /// Returns an error if either class is absent or the minority has fewer
    /// than two rows.
    pub fn oversample_minority(
        &self,
        dataset: &LabeledDataset,
        rng: &mut StdRng,
    ) -> PipelineResult<LabeledDataset> {
        let (majority, minority) = class_roles(dataset)?;
        let majority_len = dataset.indices_of(majority).len();
        let minority_rows = dataset.indices_of(minority);

        #[allow(
            clippy::cast_possible_truncation,
            clippy::cast_sign_loss,
            clippy::cast_precision_loss
        )]
        let target = (self.config.smote_ratio * majority_len as f64).floor() as usize;
        let Some(missing) = target.checked_sub(minority_rows.len()).filter(|n| *n > 0) else {
            debug!(
                minority = minority_rows.len(),
                target, "Minority already at target ratio"
            );
            return Ok(dataset.clone());
        };

        if minority_rows.len() < 2 {
            return Err(PipelineError::Balancing(format!(
                "cannot oversample a minority class of {} row(s)",
                minority_rows.len()
            )));
        }

        let neighbours_count = self.config.smote_neighbours.min(minority_rows.len() - 1).max(1);
        let samples = dataset.features().select(ndarray::Axis(0), &minority_rows);
        let neighbours = nearest_neighbours(&samples, neighbours_count);

        let mut synthetic = Array2::<f64>::zeros((missing, samples.ncols()));
        for mut row in synthetic.rows_mut() {
            let origin = rng.gen_range(0..samples.nrows());
            let neighbour = neighbours[origin][rng.gen_range(0..neighbours_count)];
            let gap: f64 = rng.r#gen();

            let a = samples.row(origin);
            let b = samples.row(neighbour);
            for (column, value) in row.iter_mut().enumerate() {
                *value = a[column] + gap * (b[column] - a[column]);
            }
        }

        debug!(
            minority_before = minority_rows.len(),
            synthesized = missing,
            k = neighbours_count,
            "Oversampled minority class"
        );

        dataset.with_appended(&synthetic, minority)
    }
}

fn class_roles(dataset: &LabeledDataset) -> PipelineResult<(u8, u8)> {
    let counts = dataset.class_counts();
    if counts.safe == 0 || counts.fraud == 0 {
        return Err(PipelineError::Balancing(format!(
            "both classes are required (safe: {}, fraud: {})",
            counts.safe, counts.fraud
        )));
    }

    Ok(if counts.fraud <= counts.safe { (0, 1) } else { (1, 0) })
}

#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn test_size(len: usize, fraction: f64) -> usize {
    ((len as f64 * fraction).round() as usize).min(len)
}

fn squared_distance(a: ArrayView1<'_, f64>, b: ArrayView1<'_, f64>) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// Indices of the `k` closest other rows for every row.
fn nearest_neighbours(samples: &Array2<f64>, k: usize) -> Vec<Vec<usize>> {
    (0..samples.nrows())
        .map(|i| {
            let mut distances: Vec<(f64, usize)> = (0..samples.nrows())
                .filter(|&j| j != i)
                .map(|j| (squared_distance(samples.row(i), samples.row(j)), j))
                .collect();
            distances.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
            distances.into_iter().take(k).map(|(_, j)| j).collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dataset(safe: usize, fraud: usize) -> LabeledDataset {
        let total = safe + fraud;
        #[allow(clippy::cast_precision_loss)]
        let features = Array2::from_shape_fn((total, 2), |(i, j)| {
            if i < safe {
                (i * (j + 1)) as f64
            } else {
                1000.0 + (i * (j + 1)) as f64
            }
        });
        let labels = (0..total).map(|i| u8::from(i >= safe)).collect();
        LabeledDataset::new(vec!["A".to_string(), "B".to_string()], features, labels).unwrap()
    }

    fn config() -> PreprocessingConfig {
        PreprocessingConfig {
            majority_cap: 500,
            test_fraction: 0.2,
            smote_ratio: 0.6,
            smote_neighbours: 5,
            seed: 42,
        }
    }

    #[test]
    fn test_downsample_caps_majority() {
        let balancer = ClassBalancer::new(config());
        let mut rng = StdRng::seed_from_u64(1);

        let reduced = balancer.downsample_majority(&dataset(990, 10), &mut rng).unwrap();
        let counts = reduced.class_counts();

        assert_eq!(counts.safe, 500);
        assert_eq!(counts.fraud, 10);
    }

    #[test]
    fn test_stratified_split_preserves_ratio() {
        let balancer = ClassBalancer::new(config());
        let mut rng = StdRng::seed_from_u64(2);

        let (train, test) = balancer.stratified_split(&dataset(500, 10), &mut rng);

        assert_eq!(test.class_counts().safe, 100);
        assert_eq!(test.class_counts().fraud, 2);
        assert_eq!(train.class_counts().safe, 400);
        assert_eq!(train.class_counts().fraud, 8);
    }

    #[test]
    fn test_balance_oversamples_train_only() {
        let split = ClassBalancer::new(config()).balance(&dataset(990, 10)).unwrap();

        let train = split.train.class_counts();
        let test = split.test.class_counts();

        assert_eq!(train.safe, 400);
        assert_eq!(train.fraud, 240);
        assert_eq!(test.safe, 100);
        assert_eq!(test.fraud, 2);
    }

    #[test]
    fn test_synthetic_rows_stay_inside_minority_hull() {
        let split = ClassBalancer::new(config()).balance(&dataset(990, 10)).unwrap();

        let features = split.train.features();
        for (row, label) in features.rows().into_iter().zip(split.train.labels()) {
            if *label == 1 {
                assert!(row[0] >= 1000.0, "synthetic row escaped: {row}");
            }
        }
    }

    #[test]
    fn test_balance_is_deterministic() {
        let balancer = ClassBalancer::new(config());
        let first = balancer.balance(&dataset(300, 20)).unwrap();
        let second = balancer.balance(&dataset(300, 20)).unwrap();

        assert_eq!(first.train, second.train);
        assert_eq!(first.test, second.test);
    }

    #[test]
    fn test_single_class_is_rejected() {
        let err = ClassBalancer::new(config()).balance(&dataset(50, 0)).unwrap_err();
        assert!(matches!(err, PipelineError::Balancing(_)));
    }

    #[test]
    fn test_single_minority_row_cannot_be_oversampled() {
        let balancer = ClassBalancer::new(config());
        let mut rng = StdRng::seed_from_u64(3);

        let err = balancer.oversample_minority(&dataset(100, 1), &mut rng).unwrap_err();
        assert!(matches!(err, PipelineError::Balancing(_)));
    }
}
