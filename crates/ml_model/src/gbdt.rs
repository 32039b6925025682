//! Gradient-boosted decision trees for binary classification.
//!
//! Trees are grown depth-first on the second-order expansion of the logistic
//! loss. Split candidates come from per-feature histograms built once before
//! boosting starts.

use fraud_structs::{PipelineError, PipelineResult};
use ndarray::{Array2, ArrayView1, Axis};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::index;
use serde::{Deserialize, Serialize};

use crate::dataset::LabeledDataset;

/// Probability at or above which a transaction is classified as fraud.
pub const DECISION_THRESHOLD: f64 = 0.5;

/// Hyperparameters of the boosted ensemble.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoosterParams {
    pub n_estimators: usize,
    pub max_depth: usize,
    pub learning_rate: f64,
    /// Fraction of rows drawn, without replacement, for each tree.
    pub subsample: f64,
    /// Fraction of features drawn for each tree.
    pub colsample_bytree: f64,
    pub min_child_weight: f64,
    /// L2 penalty on leaf values.
    pub lambda: f64,
    /// Minimum loss reduction required to split.
    pub gamma: f64,
    /// Gradient weight of positive rows.
    pub scale_pos_weight: f64,
    pub max_bins: usize,
    pub seed: u64,
}

impl Default for BoosterParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_depth: 6,
            learning_rate: 0.3,
            subsample: 1.0,
            colsample_bytree: 1.0,
            min_child_weight: 1.0,
            lambda: 1.0,
            gamma: 0.0,
            scale_pos_weight: 1.0,
            max_bins: 256,
            seed: 42,
        }
    }
}

impl BoosterParams {
    fn validate(&self) -> PipelineResult<()> {
        let invalid = |reason: &str| Err(PipelineError::Training(reason.to_string()));

        if self.max_bins < 2 || self.max_bins > usize::from(u16::MAX) {
            return invalid("max_bins must be in [2, 65535]");
        }
        if !(self.learning_rate > 0.0) {
            return invalid("learning_rate must be positive");
        }
        if !(self.subsample > 0.0 && self.subsample <= 1.0) {
            return invalid("subsample must be in (0, 1]");
        }
        if !(self.colsample_bytree > 0.0 && self.colsample_bytree <= 1.0) {
            return invalid("colsample_bytree must be in (0, 1]");
        }
        if !(self.lambda > 0.0) || !(self.scale_pos_weight > 0.0) {
            return invalid("lambda and scale_pos_weight must be positive");
        }

        Ok(())
    }
}

/// Weight importance of one feature: the number of splits using it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureImportance {
    pub feature: String,
    pub importance: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum TreeNode {
    Leaf {
        value: f64,
    },
    Internal {
        feature_idx: usize,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
    },
}

impl TreeNode {
    fn predict(&self, row: ArrayView1<'_, f64>) -> f64 {
        let mut node = self;
        loop {
            match node {
                Self::Leaf { value } => return *value,
                Self::Internal {
                    feature_idx,
                    threshold,
                    left,
                    right,
                } => {
                    node = if row[*feature_idx] <= *threshold {
                        left
                    } else {
                        right
                    };
                }
            }
        }
    }
}

/// A fitted ensemble. Scores are log-odds summed over trees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradientBoostedTrees {
    params: BoosterParams,
    feature_names: Vec<String>,
    base_margin: f64,
    trees: Vec<TreeNode>,
    split_counts: Vec<u32>,
}

impl GradientBoostedTrees {
    /// Fits an ensemble on the dataset.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Training`] for an empty dataset or invalid
    /// hyperparameters.
    pub fn fit(dataset: &LabeledDataset, params: BoosterParams) -> PipelineResult<Self> {
        params.validate()?;
        if dataset.is_empty() || dataset.feature_names().is_empty() {
            return Err(PipelineError::Training(
                "cannot fit on an empty dataset".to_string(),
            ));
        }

        let features = dataset.features();
        let labels = dataset.labels();
        let (n_rows, n_features) = features.dim();

        let cut_points: Vec<Vec<f64>> = features
            .axis_iter(Axis(1))
            .map(|column| cut_points(column, params.max_bins))
            .collect();
        let bins: Vec<Vec<u16>> = features
            .axis_iter(Axis(1))
            .zip(&cut_points)
            .map(|(column, cuts)| column.iter().map(|value| bin_of(cuts, *value)).collect())
            .collect();

        let weights: Vec<f64> = labels
            .iter()
            .map(|&label| if label == 1 { params.scale_pos_weight } else { 1.0 })
            .collect();
        let base_margin = prior_log_odds(labels, &weights);

        let mut rng = StdRng::seed_from_u64(params.seed);
        let mut margins = vec![base_margin; n_rows];
        let mut gradients = vec![0.0; n_rows];
        let mut hessians = vec![0.0; n_rows];
        let mut split_counts = vec![0_u32; n_features];
        let mut trees = Vec::with_capacity(params.n_estimators);

        let row_sample = sample_size(n_rows, params.subsample);
        let feature_sample = sample_size(n_features, params.colsample_bytree);

        for _ in 0..params.n_estimators {
            for i in 0..n_rows {
                let p = sigmoid(margins[i]);
                let y = f64::from(labels[i]);
                gradients[i] = weights[i] * (p - y);
                hessians[i] = weights[i] * (p * (1.0 - p)).max(1e-16);
            }

            let mut rows = index::sample(&mut rng, n_rows, row_sample).into_vec();
            rows.sort_unstable();
            let mut columns = index::sample(&mut rng, n_features, feature_sample).into_vec();
            columns.sort_unstable();

            let mut builder = TreeBuilder {
                bins: &bins,
                cut_points: &cut_points,
                gradients: &gradients,
                hessians: &hessians,
                columns: &columns,
                params: &params,
                split_counts: &mut split_counts,
            };
            let tree = builder.build(rows, 0);

            for (margin, row) in margins.iter_mut().zip(features.axis_iter(Axis(0))) {
                *margin += tree.predict(row);
            }
            trees.push(tree);
        }

        Ok(Self {
            params,
            feature_names: dataset.feature_names().to_vec(),
            base_margin,
            trees,
            split_counts,
        })
    }

    #[must_use]
    pub const fn params(&self) -> &BoosterParams {
        &self.params
    }

    /// Feature columns the model expects, in input order.
    #[must_use]
    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    /// Fraud probability of a single row.
    #[must_use]
    pub fn predict_row(&self, row: ArrayView1<'_, f64>) -> f64 {
        let margin = self.base_margin + self.trees.iter().map(|tree| tree.predict(row)).sum::<f64>();
        sigmoid(margin)
    }

    /// Fraud probability of every row.
    ///
    /// # Errors
    ///
    /// Returns an error if the matrix width differs from the trained features.
    pub fn predict_proba(&self, features: &Array2<f64>) -> PipelineResult<Vec<f64>> {
        if features.ncols() != self.feature_names.len() {
            return Err(PipelineError::Training(format!(
                "model expects {} features, got {}",
                self.feature_names.len(),
                features.ncols()
            )));
        }

        Ok(features
            .axis_iter(Axis(0))
            .map(|row| self.predict_row(row))
            .collect())
    }

    /// Hard labels at [`DECISION_THRESHOLD`].
    ///
    /// # Errors
    ///
    /// Returns an error if the matrix width differs from the trained features.
    pub fn predict(&self, features: &Array2<f64>) -> PipelineResult<Vec<u8>> {
        Ok(self
            .predict_proba(features)?
            .into_iter()
            .map(|p| u8::from(p >= DECISION_THRESHOLD))
            .collect())
    }

    /// Features used by at least one split, most used first.
    #[must_use]
    pub fn feature_importance(&self) -> Vec<FeatureImportance> {
        let mut importance: Vec<FeatureImportance> = self
            .feature_names
            .iter()
            .zip(&self.split_counts)
            .filter(|&(_, &count)| count > 0)
            .map(|(feature, &count)| FeatureImportance {
                feature: feature.clone(),
                importance: count,
            })
            .collect();
        importance.sort_by(|a, b| b.importance.cmp(&a.importance));
        importance
    }

    /// # Errors
    ///
    /// Returns an error if the model cannot be encoded.
    pub fn to_bytes(&self) -> PipelineResult<Vec<u8>> {
        bincode::serialize(self).map_err(PipelineError::serialization)
    }

    /// # Errors
    ///
    /// Returns an error if the bytes are not an encoded model.
    pub fn from_bytes(bytes: &[u8]) -> PipelineResult<Self> {
        bincode::deserialize(bytes).map_err(PipelineError::serialization)
    }
}

struct TreeBuilder<'a> {
    bins: &'a [Vec<u16>],
    cut_points: &'a [Vec<f64>],
    gradients: &'a [f64],
    hessians: &'a [f64],
    columns: &'a [usize],
    params: &'a BoosterParams,
    split_counts: &'a mut [u32],
}

struct Split {
    feature_idx: usize,
    bin: usize,
    gain: f64,
}

impl TreeBuilder<'_> {
    fn build(&mut self, rows: Vec<usize>, depth: usize) -> TreeNode {
        let g: f64 = rows.iter().map(|&i| self.gradients[i]).sum();
        let h: f64 = rows.iter().map(|&i| self.hessians[i]).sum();
        let leaf = TreeNode::Leaf {
            value: -g / (h + self.params.lambda) * self.params.learning_rate,
        };

        if depth >= self.params.max_depth || rows.len() < 2 {
            return leaf;
        }
        let Some(split) = self.find_best_split(&rows, g, h) else {
            return leaf;
        };

        let (left_rows, right_rows) = self.split_data(rows, &split);
        self.split_counts[split.feature_idx] += 1;

        TreeNode::Internal {
            feature_idx: split.feature_idx,
            threshold: self.cut_points[split.feature_idx][split.bin],
            left: Box::new(self.build(left_rows, depth + 1)),
            right: Box::new(self.build(right_rows, depth + 1)),
        }
    }

    fn find_best_split(&self, rows: &[usize], g: f64, h: f64) -> Option<Split> {
        let lambda = self.params.lambda;
        let parent_score = g * g / (h + lambda);
        let mut best: Option<Split> = None;

        for &feature_idx in self.columns {
            let n_bins = self.cut_points[feature_idx].len() + 1;
            if n_bins < 2 {
                continue;
            }

            let column = &self.bins[feature_idx];
            let mut hist_g = vec![0.0; n_bins];
            let mut hist_h = vec![0.0; n_bins];
            for &i in rows {
                let bin = usize::from(column[i]);
                hist_g[bin] += self.gradients[i];
                hist_h[bin] += self.hessians[i];
            }

            let (mut g_left, mut h_left) = (0.0, 0.0);
            for bin in 0..n_bins - 1 {
                g_left += hist_g[bin];
                h_left += hist_h[bin];
                let g_right = g - g_left;
                let h_right = h - h_left;
                if h_left < self.params.min_child_weight || h_right < self.params.min_child_weight {
                    continue;
                }

                let gain = 0.5
                    * (g_left * g_left / (h_left + lambda) + g_right * g_right / (h_right + lambda)
                        - parent_score)
                    - self.params.gamma;
                if gain > 1e-12 && best.as_ref().is_none_or(|current| gain > current.gain) {
                    best = Some(Split {
                        feature_idx,
                        bin,
                        gain,
                    });
                }
            }
        }

        best
    }

    fn split_data(&self, rows: Vec<usize>, split: &Split) -> (Vec<usize>, Vec<usize>) {
        let column = &self.bins[split.feature_idx];
        rows.into_iter()
            .partition(|&i| usize::from(column[i]) <= split.bin)
    }
}

/// Sorted split thresholds for one feature, at most `max_bins - 1` of them.
fn cut_points(column: ArrayView1<'_, f64>, max_bins: usize) -> Vec<f64> {
    let mut values = column.to_vec();
    values.sort_by(f64::total_cmp);
    values.dedup();

    if values.len() < 2 {
        return Vec::new();
    }

    let mut cuts: Vec<f64> = if values.len() <= max_bins {
        values.windows(2).map(|pair| (pair[0] + pair[1]) / 2.0).collect()
    } else {
        (1..max_bins)
            .map(|b| {
                let upper = b * values.len() / max_bins;
                (values[upper - 1] + values[upper]) / 2.0
            })
            .collect()
    };
    cuts.dedup();
    cuts
}

/// Number of cut points strictly below `value`.
fn bin_of(cuts: &[f64], value: f64) -> u16 {
    let bin = cuts.partition_point(|&cut| cut < value);
    u16::try_from(bin).unwrap_or(u16::MAX)
}

#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn sample_size(len: usize, fraction: f64) -> usize {
    ((len as f64 * fraction).round() as usize).clamp(1, len)
}

fn prior_log_odds(labels: &[u8], weights: &[f64]) -> f64 {
    let total: f64 = weights.iter().sum();
    let positive: f64 = labels
        .iter()
        .zip(weights)
        .filter(|&(&label, _)| label == 1)
        .map(|(_, weight)| weight)
        .sum();

    let p = (positive / total).clamp(1e-6, 1.0 - 1e-6);
    (p / (1.0 - p)).ln()
}

fn sigmoid(margin: f64) -> f64 {
    1.0 / (1.0 + (-margin).exp())
}

#[cfg(test)]
mod tests {
    use ndarray::array;
    use rand::Rng;

    use super::*;

    fn separable(rows: usize, seed: u64) -> LabeledDataset {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut labels = Vec::with_capacity(rows);
        let features = Array2::from_shape_fn((rows, 3), |(i, j)| {
            let fraud = i % 4 == 0;
            if j == 0 {
                labels.push(u8::from(fraud));
            }
            match (j, fraud) {
                (0, true) => rng.gen_range(600.0..900.0),
                (0, false) => rng.gen_range(10.0..150.0),
                _ => rng.gen_range(0.0..1.0),
            }
        });

        LabeledDataset::new(
            vec!["AMOUNT".to_string(), "NOISE_A".to_string(), "NOISE_B".to_string()],
            features,
            labels,
        )
        .unwrap()
    }

    #[test]
    fn test_cut_points_and_bins() {
        let column = array![3.0, 1.0, 2.0, 2.0];
        let cuts = cut_points(column.view(), 256);
        assert_eq!(cuts, vec![1.5, 2.5]);

        assert_eq!(bin_of(&cuts, 1.0), 0);
        assert_eq!(bin_of(&cuts, 2.0), 1);
        assert_eq!(bin_of(&cuts, 3.0), 2);
    }

    #[test]
    fn test_cut_points_respect_max_bins() {
        let column = ndarray::Array1::from_iter((0..1000).map(f64::from));
        let cuts = cut_points(column.view(), 16);
        assert_eq!(cuts.len(), 15);
        assert!(cuts.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[test]
    fn test_fits_separable_data() {
        let train = separable(400, 1);
        let test = separable(200, 2);

        let model = GradientBoostedTrees::fit(&train, BoosterParams::default()).unwrap();
        let predictions = model.predict(test.features()).unwrap();

        assert_eq!(predictions, test.labels());
        assert_eq!(model.feature_importance()[0].feature, "AMOUNT");
    }

    #[test]
    fn test_subsampled_fit_is_deterministic() {
        let train = separable(200, 3);
        let params = BoosterParams {
            n_estimators: 20,
            subsample: 0.7,
            colsample_bytree: 0.67,
            ..BoosterParams::default()
        };

        let first = GradientBoostedTrees::fit(&train, params).unwrap();
        let second = GradientBoostedTrees::fit(&train, params).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_bytes_restore_predictions() {
        let train = separable(120, 4);
        let params = BoosterParams {
            n_estimators: 10,
            ..BoosterParams::default()
        };
        let model = GradientBoostedTrees::fit(&train, params).unwrap();

        let restored = GradientBoostedTrees::from_bytes(&model.to_bytes().unwrap()).unwrap();
        assert_eq!(
            restored.predict_proba(train.features()).unwrap(),
            model.predict_proba(train.features()).unwrap()
        );
    }

    #[test]
    fn test_width_mismatch_is_rejected() {
        let model = GradientBoostedTrees::fit(&separable(40, 5), BoosterParams::default()).unwrap();
        assert!(model.predict(&array![[1.0, 2.0]]).is_err());
    }

    #[test]
    fn test_invalid_params_are_rejected() {
        let params = BoosterParams {
            subsample: 0.0,
            ..BoosterParams::default()
        };
        let err = GradientBoostedTrees::fit(&separable(40, 6), params).unwrap_err();
        assert!(matches!(err, PipelineError::Training(_)));
    }
}
