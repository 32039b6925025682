//! Classification metrics for the positive (fraud) class.

use fraud_structs::Table;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Confusion {
    true_positive: usize,
    false_positive: usize,
    false_negative: usize,
}

impl Confusion {
    fn new(y_true: &[u8], y_pred: &[u8]) -> Self {
        let mut confusion = Self::default();
        for (&actual, &predicted) in y_true.iter().zip(y_pred) {
            match (actual, predicted) {
                (1, 1) => confusion.true_positive += 1,
                (0, 1) => confusion.false_positive += 1,
                (1, 0) => confusion.false_negative += 1,
                _ => {}
            }
        }
        confusion
    }
}

#[allow(clippy::cast_precision_loss)]
fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

/// Fraction of predicted frauds that are frauds. Zero when nothing is predicted.
#[must_use]
pub fn precision_score(y_true: &[u8], y_pred: &[u8]) -> f64 {
    let c = Confusion::new(y_true, y_pred);
    ratio(c.true_positive, c.true_positive + c.false_positive)
}

/// Fraction of frauds that are predicted. Zero when there are no frauds.
#[must_use]
pub fn recall_score(y_true: &[u8], y_pred: &[u8]) -> f64 {
    let c = Confusion::new(y_true, y_pred);
    ratio(c.true_positive, c.true_positive + c.false_negative)
}

/// F1 score of the fraud class, `2TP / (2TP + FP + FN)`, zero when undefined.
#[must_use]
pub fn f1_score(y_true: &[u8], y_pred: &[u8]) -> f64 {
    let c = Confusion::new(y_true, y_pred);
    ratio(
        2 * c.true_positive,
        2 * c.true_positive + c.false_positive + c.false_negative,
    )
}

/// Precision and recall when predicting fraud for scores `>= threshold`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PrecisionRecallPoint {
    pub threshold: f64,
    pub precision: f64,
    pub recall: f64,
}

/// One point per distinct score, thresholds ascending.
#[must_use]
pub fn precision_recall_curve(y_true: &[u8], scores: &[f64]) -> Vec<PrecisionRecallPoint> {
    let mut ranked: Vec<(f64, u8)> = scores.iter().copied().zip(y_true.iter().copied()).collect();
    ranked.sort_by(|a, b| b.0.total_cmp(&a.0));

    let positives = y_true.iter().filter(|&&label| label == 1).count();
    let mut curve = Vec::new();
    let (mut tp, mut fp) = (0, 0);

    let mut i = 0;
    while i < ranked.len() {
        let threshold = ranked[i].0;
        while i < ranked.len() && ranked[i].0.total_cmp(&threshold).is_eq() {
            if ranked[i].1 == 1 {
                tp += 1;
            } else {
                fp += 1;
            }
            i += 1;
        }

        curve.push(PrecisionRecallPoint {
            threshold,
            precision: ratio(tp, tp + fp),
            recall: ratio(tp, positives),
        });
    }

    curve.reverse();
    curve
}

/// The curve as a `threshold,precision,recall` table.
#[must_use]
pub fn curve_table(curve: &[PrecisionRecallPoint]) -> Table {
    let columns = ["threshold", "precision", "recall"]
        .map(String::from)
        .to_vec();
    let rows = curve
        .iter()
        .map(|point| {
            vec![
                point.threshold.to_string(),
                point.precision.to_string(),
                point.recall.to_string(),
            ]
        })
        .collect();

    Table::new(columns, rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_scores() {
        let y_true = [1, 1, 0, 0, 1];
        let y_pred = [1, 0, 1, 0, 1];

        assert!(approx(precision_score(&y_true, &y_pred), 2.0 / 3.0));
        assert!(approx(recall_score(&y_true, &y_pred), 2.0 / 3.0));
        assert!(approx(f1_score(&y_true, &y_pred), 2.0 / 3.0));
    }

    #[test]
    fn test_f1_without_positives_is_zero() {
        assert!(approx(f1_score(&[0, 0], &[0, 0]), 0.0));
    }

    #[test]
    fn test_precision_recall_curve() {
        let curve = precision_recall_curve(&[0, 0, 1, 1], &[0.1, 0.4, 0.35, 0.8]);

        let thresholds: Vec<f64> = curve.iter().map(|p| p.threshold).collect();
        assert_eq!(thresholds, vec![0.1, 0.35, 0.4, 0.8]);

        let expected = [(0.5, 1.0), (2.0 / 3.0, 1.0), (0.5, 0.5), (1.0, 0.5)];
        for (point, (precision, recall)) in curve.iter().zip(expected) {
            assert!(approx(point.precision, precision));
            assert!(approx(point.recall, recall));
        }

        let table = curve_table(&curve);
        assert_eq!(table.columns(), ["threshold", "precision", "recall"]);
        assert_eq!(table.len(), 4);
    }

    #[test]
    fn test_curve_groups_tied_scores() {
        let curve = precision_recall_curve(&[1, 0, 1], &[0.7, 0.7, 0.2]);
        assert_eq!(curve.len(), 2);
        assert!(approx(curve[1].precision, 0.5));
        assert!(approx(curve[0].recall, 1.0));
    }
}
