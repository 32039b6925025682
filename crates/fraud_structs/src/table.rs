//! Untyped tabular snapshot, the on-disk CSV form of every stage's data.

use std::collections::HashSet;

use crate::{PipelineError, PipelineResult, SchemaError};

/// A header plus rows of textual cells.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    #[must_use]
    pub const fn new(columns: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { columns, rows }
    }

    /// Parses a CSV document with a header row.
    ///
    /// # Errors
    ///
    /// Returns an error if the CSV is malformed or rows have uneven lengths.
    pub fn from_csv(data: &[u8]) -> PipelineResult<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_reader(data);

        let columns = reader.headers()?.iter().map(str::to_string).collect();

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            rows.push(record.iter().map(str::to_string).collect());
        }

        Ok(Self { columns, rows })
    }

    /// Serializes the table as CSV with a header row.
    ///
    /// # Errors
    ///
    /// Returns an error if writing a record fails.
    pub fn to_csv(&self) -> PipelineResult<Vec<u8>> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(&self.columns)?;
        for row in &self.rows {
            writer.write_record(row)?;
        }

        writer
            .into_inner()
            .map_err(|err| PipelineError::Io(err.into_error()))
    }

    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    #[must_use]
    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    #[must_use]
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column == name)
    }

    #[must_use]
    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    /// Returns the cells of one column, top to bottom.
    #[must_use]
    pub fn column(&self, name: &str) -> Option<Vec<&str>> {
        let index = self.column_index(name)?;
        Some(self.rows.iter().map(|row| row[index].as_str()).collect())
    }

    /// Returns a table restricted to `names`, in the given order.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::MissingColumns`] listing every absent column.
    pub fn select(&self, names: &[&str], source_name: &str) -> Result<Self, SchemaError> {
        let mut indices = Vec::with_capacity(names.len());
        let mut missing = Vec::new();
        for name in names {
            match self.column_index(name) {
                Some(index) => indices.push(index),
                None => missing.push((*name).to_string()),
            }
        }

        if !missing.is_empty() {
            return Err(SchemaError::MissingColumns {
                source_name: source_name.to_string(),
                columns: missing,
            });
        }

        let rows = self
            .rows
            .iter()
            .map(|row| indices.iter().map(|&index| row[index].clone()).collect())
            .collect();

        Ok(Self {
            columns: names.iter().map(|name| (*name).to_string()).collect(),
            rows,
        })
    }

    /// Removes a column if present. Returns whether it existed.
    pub fn drop_column(&mut self, name: &str) -> bool {
        let Some(index) = self.column_index(name) else {
            return false;
        };

        self.columns.remove(index);
        for row in &mut self.rows {
            row.remove(index);
        }
        true
    }

    /// Drops rows containing an empty or `NaN` cell. Returns the number removed.
    pub fn drop_na(&mut self) -> usize {
        let before = self.rows.len();
        self.rows.retain(|row| {
            row.iter()
                .all(|cell| !cell.trim().is_empty() && !cell.eq_ignore_ascii_case("nan"))
        });
        before - self.rows.len()
    }

    /// Drops exact duplicate rows, keeping the first occurrence. Returns the number removed.
    pub fn drop_duplicates(&mut self) -> usize {
        let before = self.rows.len();
        let mut seen = HashSet::with_capacity(before);
        self.rows.retain(|row| seen.insert(row.clone()));
        before - self.rows.len()
    }
}
