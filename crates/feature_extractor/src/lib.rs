//! Temporal feature engine for the fraud classifier.
//!
//! This crate turns raw transactions into model-ready feature vectors. In
//! training mode all aggregates are computed in-sample over the provided
//! dataset. In prediction mode aggregates come from a historical context
//! restricted to transactions strictly earlier than the earliest transaction
//! of the batch being scored.

use std::collections::HashMap;

use chrono::{Datelike, Timelike};
use config::FeatureConfig;
use fraud_structs::{PipelineError, PipelineResult, Table, Transaction, schema};
use serde_json::Value;
use tracing::debug;

mod windows;

use windows::{MILLIS_PER_DAY, group_in_order, tie_broken_order, timestamp_millis, trailing_window};

/// Names of the derived feature columns, in model input order.
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "TX_HOUR",
    "TX_WEEK_DAY",
    "IS_NIGHT_TX",
    "TX_IS_WEEKEND",
    "IS_TX_AMOUNT_HIGH",
    "TX_MONTH",
    "WEEKEND_NIGHT",
    "CUSTOMER_AVG_AMOUNT_7D",
    "CUSTOMER_MAX_AMOUNT_7D",
    "AVG_AMOUNT_CUSTOMER",
    "IS_TX_5X_AVG",
    "CUSTOMER_TX_COUNT_7D",
    "TERMINAL_TX_COUNT_7D",
    "CUSTOMER_TX_COUNT_MONTH",
    "TERMINAL_TX_COUNT_MONTH",
    "TX_OVER_CUSTOMER_AVG",
    "TX_OVER_MAX_LAST_7D",
    "CUSTOMER_TX_COUNT_1D",
    "TERMINAL_TX_COUNT_1D",
    "TERMINAL_RISK",
    "TIME_SINCE_LAST_TX",
];

/// The number of derived features per transaction.
pub const FEATURE_COUNT: usize = 21;

const NIGHT_END_HOUR: u32 = 6;
const WEEK_MILLIS: i64 = 7 * MILLIS_PER_DAY;

/// Index of a named feature within [`FeatureVector::features`].
#[must_use]
pub fn feature_index(name: &str) -> Option<usize> {
    FEATURE_NAMES.iter().position(|feature| *feature == name)
}

/// How aggregates are sourced.
#[derive(Debug, Clone, Copy)]
pub enum Mode<'a> {
    /// Aggregate over the batch itself.
    Training,
    /// Aggregate over `context` rows earlier than the batch, plus the batch.
    Prediction { context: &'a [Transaction] },
}

/// A transaction with its derived features.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector {
    pub transaction: Transaction,
    pub features: [f64; FEATURE_COUNT],
}

impl FeatureVector {
    #[must_use]
    pub fn get(&self, name: &str) -> Option<f64> {
        feature_index(name).map(|index| self.features[index])
    }

    /// The values the classifier consumes, in [`FEATURE_NAMES`] order.
    #[must_use]
    pub const fn model_input(&self) -> &[f64; FEATURE_COUNT] {
        &self.features
    }

    /// Document form: the transaction fields followed by every feature.
    #[must_use]
    pub fn to_document(&self) -> Value {
        let mut document = self.transaction.to_document();
        if let Value::Object(map) = &mut document {
            for (name, value) in FEATURE_NAMES.iter().zip(self.features) {
                map.insert((*name).to_string(), Value::from(value));
            }
        }
        document
    }
}

/// Builds the feature-engineered snapshot: schema columns then features.
#[must_use]
pub fn feature_table(vectors: &[FeatureVector]) -> Table {
    let columns = schema::schema_column_names(true)
        .into_iter()
        .chain(FEATURE_NAMES)
        .map(str::to_string)
        .collect();

    let rows = vectors
        .iter()
        .map(|vector| {
            let mut row = vector.transaction.to_row();
            row.extend(vector.features.iter().map(f64::to_string));
            row
        })
        .collect();

    Table::new(columns, rows)
}

/// Computes leakage-safe temporal features.
#[derive(Debug, Clone, Default)]
pub struct FeatureEngine {
    config: FeatureConfig,
}

impl FeatureEngine {
    #[must_use]
    pub const fn new(config: FeatureConfig) -> Self {
        Self { config }
    }

    /// Computes one feature vector per batch transaction, in batch order.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::EmptyBatch`] if `batch` is empty.
    pub fn compute(
        &self,
        batch: &[Transaction],
        mode: Mode<'_>,
    ) -> PipelineResult<Vec<FeatureVector>> {
        if batch.is_empty() {
            return Err(PipelineError::EmptyBatch);
        }

        let (history, risk_source): (Vec<&Transaction>, Vec<&Transaction>) = match mode {
            Mode::Training => (Vec::new(), batch.iter().collect()),
            Mode::Prediction { context } => {
                let cutoff = batch
                    .iter()
                    .map(|transaction| transaction.tx_datetime)
                    .min()
                    .ok_or(PipelineError::EmptyBatch)?;
                let history: Vec<&Transaction> = context
                    .iter()
                    .filter(|transaction| transaction.tx_datetime < cutoff)
                    .collect();
                debug!(
                    context = context.len(),
                    usable_history = history.len(),
                    cutoff = %cutoff,
                    "Filtered prediction context to the leakage boundary"
                );
                (history.clone(), history)
            }
        };

        // History rows first, batch rows last: batch row `i` sits at `offset + i`.
        let offset = history.len();
        let combined: Vec<&Transaction> = history.into_iter().chain(batch).collect();

        let aggregates = self.aggregate(&combined, &risk_source);

        Ok(batch
            .iter()
            .enumerate()
            .map(|(index, transaction)| FeatureVector {
                transaction: transaction.clone(),
                features: aggregates[offset + index],
            })
            .collect())
    }

    /// Converts documents at the store boundary and computes prediction features.
    ///
    /// # Errors
    ///
    /// Returns a schema error naming the missing columns of the batch or the
    /// context, or [`PipelineError::EmptyBatch`].
    pub fn compute_from_documents(
        &self,
        batch: &[Value],
        context: &[Value],
    ) -> PipelineResult<Vec<FeatureVector>> {
        if batch.is_empty() {
            return Err(PipelineError::EmptyBatch);
        }

        let batch = Transaction::from_documents(batch, "current batch", false)?;
        let context = Transaction::from_documents(context, "historical context", false)?;

        self.compute(&batch, Mode::Prediction { context: &context })
    }

    #[allow(clippy::cast_precision_loss)]
    fn aggregate(
        &self,
        rows: &[&Transaction],
        risk_source: &[&Transaction],
    ) -> Vec<[f64; FEATURE_COUNT]> {
        let n = rows.len();
        let amounts: Vec<f64> = rows.iter().map(|t| t.tx_amount).collect();
        let raw_times: Vec<i64> = rows.iter().map(|t| timestamp_millis(&t.tx_datetime)).collect();
        let (times, order) = tie_broken_order(&raw_times);

        let customers = group_in_order(&order, |row| rows[row].customer_id);
        let terminals = group_in_order(&order, |row| rows[row].terminal_id);

        let mut customer_7d = vec![None; n];
        let mut customer_1d = vec![0; n];
        let mut terminal_7d = vec![0; n];
        let mut terminal_1d = vec![0; n];
        let mut time_since_last = vec![self.config.no_history_sentinel; n];
        let mut customer_mean = vec![0.0; n];

        for group in &customers {
            for (row, stats) in trailing_window(group, &times, &amounts, WEEK_MILLIS) {
                customer_7d[row] = Some(stats);
            }
            for (row, stats) in trailing_window(group, &times, &amounts, MILLIS_PER_DAY) {
                customer_1d[row] = stats.count;
            }

            let mean = group.iter().map(|&row| amounts[row]).sum::<f64>() / group.len() as f64;
            for &row in group {
                customer_mean[row] = mean;
            }

            for pair in group.windows(2) {
                let seconds = (raw_times[pair[1]] - raw_times[pair[0]]) as f64 / 1000.0;
                time_since_last[pair[1]] = seconds;
            }
        }

        for group in &terminals {
            for (row, stats) in trailing_window(group, &times, &amounts, WEEK_MILLIS) {
                terminal_7d[row] = stats.count;
            }
            for (row, stats) in trailing_window(group, &times, &amounts, MILLIS_PER_DAY) {
                terminal_1d[row] = stats.count;
            }
        }

        let mut customer_months: HashMap<(i64, u32), usize> = HashMap::new();
        let mut terminal_months: HashMap<(i64, u32), usize> = HashMap::new();
        for transaction in rows {
            let month = transaction.tx_datetime.month();
            *customer_months.entry((transaction.customer_id, month)).or_default() += 1;
            *terminal_months.entry((transaction.terminal_id, month)).or_default() += 1;
        }

        let terminal_risk = terminal_fraud_rates(risk_source);
        let epsilon = self.config.epsilon;

        rows.iter()
            .enumerate()
            .map(|(row, transaction)| {
                let timestamp = transaction.tx_datetime;
                let hour = timestamp.hour();
                let weekday = timestamp.weekday().num_days_from_monday();
                let month = timestamp.month();
                let amount = transaction.tx_amount;

                let is_night = hour < NIGHT_END_HOUR;
                let is_weekend = weekday >= 5;
                let avg_customer = customer_mean[row];
                let (avg_7d, max_7d, count_7d) = customer_7d[row]
                    .map_or((amount, amount, 1), |stats| (stats.mean, stats.max, stats.count));

                [
                    f64::from(hour),
                    f64::from(weekday),
                    flag(is_night),
                    flag(is_weekend),
                    flag(amount > self.config.high_amount_threshold),
                    f64::from(month),
                    flag(is_night && is_weekend),
                    avg_7d,
                    max_7d,
                    avg_customer,
                    flag(amount > 5.0 * avg_customer),
                    count_7d as f64,
                    terminal_7d[row] as f64,
                    customer_months[&(transaction.customer_id, month)] as f64,
                    terminal_months[&(transaction.terminal_id, month)] as f64,
                    amount / (avg_customer + epsilon),
                    amount / (max_7d + epsilon),
                    customer_1d[row] as f64,
                    terminal_1d[row] as f64,
                    terminal_risk
                        .get(&transaction.terminal_id)
                        .copied()
                        .unwrap_or(0.0),
                    time_since_last[row],
                ]
            })
            .collect()
    }
}

/// Mean fraud label per terminal over labeled rows.
fn terminal_fraud_rates(rows: &[&Transaction]) -> HashMap<i64, f64> {
    let mut totals: HashMap<i64, (u32, u32)> = HashMap::new();
    for transaction in rows {
        if let Some(label) = transaction.tx_fraud {
            let entry = totals.entry(transaction.terminal_id).or_default();
            entry.0 += u32::from(label);
            entry.1 += 1;
        }
    }

    totals
        .into_iter()
        .map(|(terminal, (frauds, labeled))| (terminal, f64::from(frauds) / f64::from(labeled)))
        .collect()
}

const fn flag(value: bool) -> f64 {
    if value { 1.0 } else { 0.0 }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, NaiveDateTime};
    use proptest::prelude::*;

    use super::*;

    fn at(day: u32, hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2018, 4, day)
            .unwrap()
            .and_hms_opt(hour, minute, 0)
            .unwrap()
    }

    fn tx(
        id: i64,
        when: NaiveDateTime,
        customer: i64,
        terminal: i64,
        amount: f64,
        fraud: Option<u8>,
    ) -> Transaction {
        Transaction {
            transaction_id: id,
            tx_datetime: when,
            customer_id: customer,
            terminal_id: terminal,
            tx_amount: amount,
            tx_fraud: fraud,
        }
    }

    fn value(vector: &FeatureVector, name: &str) -> f64 {
        vector.get(name).unwrap()
    }

    fn engine() -> FeatureEngine {
        FeatureEngine::new(FeatureConfig::default())
    }

    #[test]
    fn test_flags_on_small_batch() {
        // 2018-04-01 is a Sunday.
        let batch = vec![
            tx(0, at(1, 2, 0), 1, 10, 50.0, Some(0)),
            tx(1, at(2, 10, 0), 1, 10, 200.0, Some(1)),
            tx(2, at(2, 12, 0), 2, 11, 30.0, Some(0)),
            tx(3, at(3, 23, 0), 2, 11, 180.0, Some(0)),
            tx(4, at(4, 5, 59), 3, 12, 20.0, Some(0)),
        ];

        let vectors = engine().compute(&batch, Mode::Training).unwrap();
        assert_eq!(vectors.len(), 5);

        assert_eq!(value(&vectors[0], "TX_HOUR"), 2.0);
        assert_eq!(value(&vectors[0], "IS_NIGHT_TX"), 1.0);
        assert_eq!(value(&vectors[0], "TX_IS_WEEKEND"), 1.0);
        assert_eq!(value(&vectors[0], "WEEKEND_NIGHT"), 1.0);
        assert_eq!(value(&vectors[0], "TX_WEEK_DAY"), 6.0);

        assert_eq!(value(&vectors[1], "IS_TX_AMOUNT_HIGH"), 1.0);
        assert_eq!(value(&vectors[1], "IS_NIGHT_TX"), 0.0);
        assert_eq!(value(&vectors[3], "IS_TX_AMOUNT_HIGH"), 0.0);
        assert_eq!(value(&vectors[4], "IS_NIGHT_TX"), 1.0);
        assert_eq!(value(&vectors[4], "TX_IS_WEEKEND"), 0.0);

        // Deterministic for a fixed input.
        assert_eq!(engine().compute(&batch, Mode::Training).unwrap(), vectors);
    }

    #[test]
    fn test_customer_aggregates() {
        let batch = vec![
            tx(0, at(1, 10, 0), 1, 10, 100.0, Some(0)),
            tx(1, at(3, 10, 0), 1, 11, 300.0, Some(0)),
            tx(2, at(9, 10, 0), 1, 12, 50.0, Some(0)),
        ];

        let vectors = engine().compute(&batch, Mode::Training).unwrap();

        assert_eq!(value(&vectors[1], "CUSTOMER_TX_COUNT_7D"), 2.0);
        assert_eq!(value(&vectors[1], "CUSTOMER_AVG_AMOUNT_7D"), 200.0);
        assert_eq!(value(&vectors[1], "CUSTOMER_MAX_AMOUNT_7D"), 300.0);
        assert_eq!(value(&vectors[1], "TIME_SINCE_LAST_TX"), 2.0 * 86_400.0);

        // Day 9 is more than seven days after day 1 but within seven of day 3.
        assert_eq!(value(&vectors[2], "CUSTOMER_TX_COUNT_7D"), 2.0);
        assert_eq!(value(&vectors[2], "CUSTOMER_MAX_AMOUNT_7D"), 300.0);
        assert_eq!(value(&vectors[2], "CUSTOMER_TX_COUNT_MONTH"), 3.0);
        assert_eq!(value(&vectors[2], "AVG_AMOUNT_CUSTOMER"), 150.0);

        assert_eq!(value(&vectors[0], "TIME_SINCE_LAST_TX"), 999_999.0);
        let ratio = value(&vectors[1], "TX_OVER_CUSTOMER_AVG");
        assert!((ratio - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_duplicate_timestamps_get_distinct_counts() {
        let when = at(5, 12, 0);
        let batch = vec![
            tx(0, when, 1, 10, 10.0, Some(0)),
            tx(1, when, 1, 10, 20.0, Some(0)),
            tx(2, when, 1, 10, 30.0, Some(0)),
        ];

        let vectors = engine().compute(&batch, Mode::Training).unwrap();
        let counts: Vec<f64> = vectors
            .iter()
            .map(|vector| value(vector, "CUSTOMER_TX_COUNT_1D"))
            .collect();
        assert_eq!(counts, vec![1.0, 2.0, 3.0]);
        assert_eq!(value(&vectors[2], "TERMINAL_TX_COUNT_7D"), 3.0);
        assert_eq!(value(&vectors[1], "TIME_SINCE_LAST_TX"), 0.0);
    }

    #[test]
    fn test_terminal_risk_training_and_prediction() {
        let batch = vec![
            tx(0, at(1, 10, 0), 1, 10, 10.0, Some(1)),
            tx(1, at(1, 11, 0), 2, 10, 10.0, Some(0)),
            tx(2, at(1, 12, 0), 3, 11, 10.0, Some(0)),
        ];
        let vectors = engine().compute(&batch, Mode::Training).unwrap();
        assert_eq!(value(&vectors[0], "TERMINAL_RISK"), 0.5);
        assert_eq!(value(&vectors[2], "TERMINAL_RISK"), 0.0);

        // In prediction mode only context labels count.
        let new = vec![tx(9, at(2, 10, 0), 4, 10, 10.0, None)];
        let vectors = engine()
            .compute(&new, Mode::Prediction { context: &batch })
            .unwrap();
        assert_eq!(value(&vectors[0], "TERMINAL_RISK"), 0.5);

        let vectors = engine()
            .compute(&new, Mode::Prediction { context: &[] })
            .unwrap();
        assert_eq!(value(&vectors[0], "TERMINAL_RISK"), 0.0);
        assert_eq!(value(&vectors[0], "TIME_SINCE_LAST_TX"), 999_999.0);
    }

    #[test]
    fn test_prediction_output_is_exactly_the_batch() {
        let context = vec![
            tx(100, at(1, 10, 0), 1, 10, 10.0, Some(0)),
            tx(101, at(2, 10, 0), 1, 10, 20.0, Some(0)),
        ];
        let batch = vec![
            tx(7, at(3, 10, 0), 1, 10, 30.0, None),
            tx(8, at(3, 9, 0), 2, 10, 40.0, None),
        ];

        let vectors = engine()
            .compute(&batch, Mode::Prediction { context: &context })
            .unwrap();

        let ids: Vec<i64> = vectors.iter().map(|v| v.transaction.transaction_id).collect();
        assert_eq!(ids, vec![7, 8]);
        assert_eq!(value(&vectors[0], "CUSTOMER_TX_COUNT_7D"), 3.0);
        assert_eq!(value(&vectors[1], "TERMINAL_TX_COUNT_7D"), 3.0);
        assert!(vectors.iter().all(|v| v.transaction.tx_fraud.is_none()));
    }

    #[test]
    fn test_empty_batch_fails() {
        let err = engine().compute(&[], Mode::Training).unwrap_err();
        assert!(matches!(err, PipelineError::EmptyBatch));

        let err = engine().compute_from_documents(&[], &[]).unwrap_err();
        assert!(matches!(err, PipelineError::EmptyBatch));
    }

    #[test]
    fn test_documents_missing_columns() {
        let batch = vec![serde_json::json!({"TRANSACTION_ID": 1, "TX_AMOUNT": 5.0})];
        let err = engine().compute_from_documents(&batch, &[]).unwrap_err();

        let PipelineError::Schema(fraud_structs::SchemaError::MissingColumns { columns, .. }) =
            &err
        else {
            panic!("expected a schema error, got {err:?}");
        };
        assert_eq!(*columns, vec!["TX_DATETIME", "CUSTOMER_ID", "TERMINAL_ID"]);

        let good = vec![serde_json::json!({
            "TRANSACTION_ID": 1, "TX_DATETIME": "2018-04-05 10:00:00",
            "CUSTOMER_ID": 1, "TERMINAL_ID": 1, "TX_AMOUNT": 5.0
        })];
        let err = engine().compute_from_documents(&good, &batch).unwrap_err();
        assert!(err.to_string().contains("historical context"));
    }

    #[test]
    fn test_feature_table_layout() {
        let batch = vec![tx(0, at(1, 2, 0), 1, 10, 50.0, Some(0))];
        let vectors = engine().compute(&batch, Mode::Training).unwrap();
        let table = feature_table(&vectors);

        assert_eq!(table.columns().len(), 6 + FEATURE_COUNT);
        assert_eq!(table.columns()[6], "TX_HOUR");
        assert_eq!(table.column("IS_NIGHT_TX").unwrap(), vec!["1"]);

        let document = vectors[0].to_document();
        assert_eq!(document["TX_HOUR"], 2.0);
    }

    fn context_strategy() -> impl Strategy<Value = Vec<(i64, u32, i64, i64, f64, u8)>> {
        prop::collection::vec(
            (
                0_i64..200,
                0_u32..(20 * 24 * 60),
                0_i64..4,
                0_i64..4,
                1.0_f64..500.0,
                0_u8..2,
            ),
            0..40,
        )
    }

    fn minute(offset: u32) -> NaiveDateTime {
        at(1, 0, 0) + chrono::Duration::minutes(i64::from(offset))
    }

    proptest! {
        #[test]
        fn test_future_context_never_changes_features(
            past in context_strategy(),
            future in context_strategy(),
            perturbed in context_strategy(),
        ) {
            // Batch starts on day 11; context rows are split around that cutoff.
            let cutoff = 10 * 24 * 60;
            let batch = vec![
                tx(1000, minute(cutoff), 1, 1, 75.0, None),
                tx(1001, minute(cutoff + 90), 2, 3, 900.0, None),
            ];

            let to_tx = |rows: &[(i64, u32, i64, i64, f64, u8)], shift: u32| -> Vec<Transaction> {
                rows.iter()
                    .map(|&(id, at_minute, customer, terminal, amount, label)| {
                        tx(id, minute(at_minute % cutoff + shift), customer, terminal, amount, Some(label))
                    })
                    .collect()
            };

            let history = to_tx(&past, 0);
            let mut with_future = history.clone();
            with_future.extend(to_tx(&future, cutoff));
            let mut with_other_future = history.clone();
            with_other_future.extend(to_tx(&perturbed, cutoff));

            let engine = engine();
            let baseline = engine.compute(&batch, Mode::Prediction { context: &history }).unwrap();
            let a = engine.compute(&batch, Mode::Prediction { context: &with_future }).unwrap();
            let b = engine.compute(&batch, Mode::Prediction { context: &with_other_future }).unwrap();

            prop_assert_eq!(&baseline, &a);
            prop_assert_eq!(&baseline, &b);
        }
    }
}
