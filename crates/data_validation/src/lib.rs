//! Schema and drift validation of a snapshot against a reference snapshot.
//!
//! Two independent checks run on every snapshot:
//! - every reference column must be present in the current snapshot;
//! - every shared column is tested for distribution drift.
//!
//! Neither check aborts a run. Missing columns and degenerate tests are
//! recorded in the report.

use std::collections::BTreeMap;

use fraud_structs::{PipelineError, Table};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

mod columns;
mod statistics;

pub use columns::{ColumnType, DATE_FEATURES, date_features, detect_column_type, numeric_values};
pub use statistics::{
    DegenerateInput, TestOutcome, chi_square_homogeneity, ks_two_sample,
};

/// Which test produced a drift result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriftTest {
    KolmogorovSmirnov,
    ChiSquare,
}

/// Drift verdict for one column or date sub-feature.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DriftResult {
    pub pvalue: f64,
    #[serde(rename = "Same_distribution")]
    pub same_distribution: bool,
    pub test: DriftTest,
}

/// The persisted validation report.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    #[serde(
        rename = "Missing_columns_within_current_main_dataset",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    pub missing_columns: Vec<String>,

    #[serde(rename = "Data_drift_within_current_dataset", default)]
    pub drift: BTreeMap<String, DriftResult>,

    /// Columns whose test could not run, with the reason.
    #[serde(
        rename = "Skipped_drift_checks",
        default,
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub skipped: BTreeMap<String, String>,
}

impl ValidationReport {
    /// Number of tested entries whose distribution changed.
    #[must_use]
    pub fn drifted_count(&self) -> usize {
        self.drift
            .values()
            .filter(|result| !result.same_distribution)
            .count()
    }
}

/// Compares snapshots against a reference at a fixed significance level.
#[derive(Debug, Clone, Copy)]
pub struct DataValidator {
    significance_level: f64,
}

impl Default for DataValidator {
    fn default() -> Self {
        Self::new(0.05)
    }
}

enum ColumnOutcome {
    Tested(Vec<(String, DriftResult)>),
    Skipped(String, PipelineError),
}

impl DataValidator {
    #[must_use]
    pub const fn new(significance_level: f64) -> Self {
        Self { significance_level }
    }

    /// Reference columns absent from the current snapshot, in reference order.
    #[must_use]
    pub fn missing_columns(base: &Table, current: &Table) -> Vec<String> {
        base.columns()
            .iter()
            .filter(|column| !current.has_column(column))
            .cloned()
            .collect()
    }

    /// Runs both checks. Rows with empty cells are ignored.
    #[must_use]
    pub fn validate(&self, base: &Table, current: &Table) -> ValidationReport {
        let mut base = base.clone();
        let mut current = current.clone();
        base.drop_na();
        current.drop_na();

        let missing_columns = Self::missing_columns(&base, &current);
        if missing_columns.is_empty() {
            info!("All required columns exist in the current dataset");
        } else {
            warn!(missing = ?missing_columns, "Missing required columns");
        }

        let (drift, skipped) = self.check_drift(&base, &current);

        ValidationReport {
            missing_columns,
            drift,
            skipped,
        }
    }

    /// Tests every column present in both snapshots, in parallel.
    ///
    /// Returns the results keyed by column (or `<column>_<date feature>`) and
    /// the skipped columns with their reason.
    #[must_use]
    pub fn check_drift(
        &self,
        base: &Table,
        current: &Table,
    ) -> (BTreeMap<String, DriftResult>, BTreeMap<String, String>) {
        let shared: Vec<&String> = base
            .columns()
            .iter()
            .filter(|column| current.has_column(column))
            .collect();

        let outcomes: Vec<ColumnOutcome> = shared
            .par_iter()
            .map(|column| {
                let base_cells = base.column(column).unwrap_or_default();
                let current_cells = current.column(column).unwrap_or_default();
                self.test_column(column, &base_cells, &current_cells)
            })
            .collect();

        let mut drift = BTreeMap::new();
        let mut skipped = BTreeMap::new();
        for outcome in outcomes {
            match outcome {
                ColumnOutcome::Tested(results) => drift.extend(results),
                ColumnOutcome::Skipped(column, err) => {
                    warn!(column = %column, error = %err, "Skipping drift check");
                    skipped.insert(column, err.to_string());
                }
            }
        }

        (drift, skipped)
    }

    fn test_column(&self, column: &str, base: &[&str], current: &[&str]) -> ColumnOutcome {
        let skip = |reason: DegenerateInput| {
            ColumnOutcome::Skipped(
                column.to_string(),
                PipelineError::StatisticalTest {
                    column: column.to_string(),
                    reason: reason.to_string(),
                },
            )
        };

        match detect_column_type(base) {
            ColumnType::Numeric => {
                match ks_two_sample(&numeric_values(base), &numeric_values(current)) {
                    Ok(outcome) => ColumnOutcome::Tested(vec![(
                        column.to_string(),
                        self.verdict(outcome, DriftTest::KolmogorovSmirnov),
                    )]),
                    Err(reason) => skip(reason),
                }
            }
            ColumnType::DateLike => {
                let base_features = date_features(base);
                let current_features = date_features(current);

                let mut results = Vec::with_capacity(DATE_FEATURES.len());
                for ((name, base_values), current_values) in
                    DATE_FEATURES.iter().zip(&base_features).zip(&current_features)
                {
                    match ks_two_sample(base_values, current_values) {
                        Ok(outcome) => results.push((
                            format!("{column}_{name}"),
                            self.verdict(outcome, DriftTest::KolmogorovSmirnov),
                        )),
                        Err(reason) => return skip(reason),
                    }
                }
                ColumnOutcome::Tested(results)
            }
            ColumnType::Categorical => match chi_square_homogeneity(base, current) {
                Ok(outcome) => ColumnOutcome::Tested(vec![(
                    column.to_string(),
                    self.verdict(outcome, DriftTest::ChiSquare),
                )]),
                Err(reason) => skip(reason),
            },
        }
    }

    fn verdict(&self, outcome: TestOutcome, test: DriftTest) -> DriftResult {
        DriftResult {
            pvalue: outcome.pvalue,
            same_distribution: outcome.pvalue > self.significance_level,
            test,
        }
    }
}
