//! Labeled feature matrix used for balancing, training and evaluation.

use fraud_structs::{ClassCounts, PipelineResult, SchemaError, TARGET_COLUMN, Table, schema};
use ndarray::{Array2, Axis, concatenate};

/// A dense feature matrix with one binary label per row.
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledDataset {
    feature_names: Vec<String>,
    features: Array2<f64>,
    labels: Vec<u8>,
}

impl LabeledDataset {
    /// # Errors
    ///
    /// Returns an error if the matrix shape does not match the names and labels.
    pub fn new(
        feature_names: Vec<String>,
        features: Array2<f64>,
        labels: Vec<u8>,
    ) -> PipelineResult<Self> {
        if features.ncols() != feature_names.len() || features.nrows() != labels.len() {
            return Err(fraud_structs::PipelineError::Training(format!(
                "dataset shape mismatch: {}x{} features, {} names, {} labels",
                features.nrows(),
                features.ncols(),
                feature_names.len(),
                labels.len()
            )));
        }

        Ok(Self {
            feature_names,
            features,
            labels,
        })
    }

    /// Reads the named feature columns and the label column from a table.
    ///
    /// # Errors
    ///
    /// Returns a [`SchemaError`] if a column is missing or a cell is not numeric.
    pub fn from_table(table: &Table, feature_names: &[&str]) -> PipelineResult<Self> {
        let mut wanted: Vec<&str> = feature_names.to_vec();
        wanted.push(TARGET_COLUMN);
        let selected = table.select(&wanted, "labeled dataset")?;

        let n_features = feature_names.len();
        let mut features = Array2::<f64>::zeros((selected.len(), n_features));
        let mut labels = Vec::with_capacity(selected.len());

        for (row_index, row) in selected.rows().iter().enumerate() {
            for (column, cell) in row[..n_features].iter().enumerate() {
                features[[row_index, column]] =
                    schema::parse_float(cell).ok_or_else(|| SchemaError::InvalidValue {
                        column: feature_names[column].to_string(),
                        row: row_index,
                        value: cell.clone(),
                    })?;
            }

            let label_cell = &row[n_features];
            let label = match schema::parse_integer(label_cell) {
                Some(0) => 0,
                Some(1) => 1,
                _ => {
                    return Err(SchemaError::InvalidValue {
                        column: TARGET_COLUMN.to_string(),
                        row: row_index,
                        value: label_cell.clone(),
                    }
                    .into());
                }
            };
            labels.push(label);
        }

        Ok(Self {
            feature_names: feature_names.iter().map(|name| (*name).to_string()).collect(),
            features,
            labels,
        })
    }

    /// Feature columns followed by the label column.
    #[must_use]
    pub fn to_table(&self) -> Table {
        let columns = self
            .feature_names
            .iter()
            .cloned()
            .chain(std::iter::once(TARGET_COLUMN.to_string()))
            .collect();

        let rows = self
            .features
            .axis_iter(Axis(0))
            .zip(&self.labels)
            .map(|(row, label)| {
                row.iter()
                    .map(f64::to_string)
                    .chain(std::iter::once(label.to_string()))
                    .collect()
            })
            .collect();

        Table::new(columns, rows)
    }

    #[must_use]
    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    #[must_use]
    pub const fn features(&self) -> &Array2<f64> {
        &self.features
    }

    #[must_use]
    pub fn labels(&self) -> &[u8] {
        &self.labels
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    #[must_use]
    pub fn class_counts(&self) -> ClassCounts {
        ClassCounts::from_labels(&self.labels)
    }

    /// Row indices holding `label`, in row order.
    #[must_use]
    pub fn indices_of(&self, label: u8) -> Vec<usize> {
        self.labels
            .iter()
            .enumerate()
            .filter(|&(_, &value)| value == label)
            .map(|(index, _)| index)
            .collect()
    }

    /// A new dataset made of the given rows, in the given order.
    #[must_use]
    pub fn select_rows(&self, indices: &[usize]) -> Self {
        Self {
            feature_names: self.feature_names.clone(),
            features: self.features.select(Axis(0), indices),
            labels: indices.iter().map(|&index| self.labels[index]).collect(),
        }
    }

    /// Appends synthetic rows with a single label.
    ///
    /// # Errors
    ///
    /// Returns an error if `rows` has a different number of columns.
    pub fn with_appended(&self, rows: &Array2<f64>, label: u8) -> PipelineResult<Self> {
        let features = concatenate(Axis(0), &[self.features.view(), rows.view()])
            .map_err(|err| fraud_structs::PipelineError::Training(err.to_string()))?;

        let mut labels = self.labels.clone();
        labels.extend(std::iter::repeat_n(label, rows.nrows()));

        Ok(Self {
            feature_names: self.feature_names.clone(),
            features,
            labels,
        })
    }
}
