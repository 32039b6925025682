//! Typed transaction record and its conversions from snapshots and documents.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::schema::{
    CUSTOMER_ID, TARGET_COLUMN, TERMINAL_ID, TRANSACTION_ID, TX_AMOUNT, TX_DATETIME,
    format_timestamp, missing_schema_columns, parse_float, parse_integer, parse_timestamp,
    schema_column_names,
};
use crate::{SchemaError, Table};

/// One card transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    #[serde(rename = "TRANSACTION_ID")]
    pub transaction_id: i64,

    #[serde(rename = "TX_DATETIME", with = "timestamp_format")]
    pub tx_datetime: NaiveDateTime,

    #[serde(rename = "CUSTOMER_ID")]
    pub customer_id: i64,

    #[serde(rename = "TERMINAL_ID")]
    pub terminal_id: i64,

    #[serde(rename = "TX_AMOUNT")]
    pub tx_amount: f64,

    /// Fraud label, `None` for transactions awaiting a prediction.
    #[serde(rename = "TX_FRAUD", default, skip_serializing_if = "Option::is_none")]
    pub tx_fraud: Option<u8>,
}

impl Transaction {
    /// Converts snapshot rows into transactions.
    ///
    /// All missing required columns are reported at once. When `require_label`
    /// is false the label column may be absent or hold empty cells.
    ///
    /// # Errors
    ///
    /// Returns a [`SchemaError`] if columns are missing or a cell does not parse.
    pub fn from_table(
        table: &Table,
        source_name: &str,
        require_label: bool,
    ) -> Result<Vec<Self>, SchemaError> {
        let missing = missing_schema_columns(require_label, |name| table.has_column(name));
        if !missing.is_empty() {
            return Err(SchemaError::MissingColumns {
                source_name: source_name.to_string(),
                columns: missing,
            });
        }

        let index_of = |name: &str| table.column_index(name);

        table
            .rows()
            .iter()
            .enumerate()
            .map(|(row_index, row)| {
                Self::parse_fields(row_index, |name| {
                    index_of(name).map(|index| row[index].as_str().into())
                })
            })
            .collect()
    }

    /// Converts store documents into transactions.
    ///
    /// # Errors
    ///
    /// Returns a [`SchemaError`] if any document lacks a required field or a
    /// field does not parse.
    pub fn from_documents(
        documents: &[Value],
        source_name: &str,
        require_label: bool,
    ) -> Result<Vec<Self>, SchemaError> {
        let mut missing: Vec<String> = Vec::new();
        for document in documents {
            for column in missing_schema_columns(require_label, |name| {
                document.get(name).is_some_and(|value| !value.is_null())
            }) {
                if !missing.contains(&column) {
                    missing.push(column);
                }
            }
        }

        if !missing.is_empty() {
            return Err(SchemaError::MissingColumns {
                source_name: source_name.to_string(),
                columns: missing,
            });
        }

        documents
            .iter()
            .enumerate()
            .map(|(row_index, document)| {
                Self::parse_fields(row_index, |name| document.get(name).and_then(document_cell))
            })
            .collect()
    }

    fn parse_fields(
        row: usize,
        cell: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, SchemaError> {
        let invalid = |column: &str, value: String| SchemaError::InvalidValue {
            column: column.to_string(),
            row,
            value,
        };
        let required = |column: &str| cell(column).unwrap_or_default();

        let integer = |column: &str| {
            let raw = required(column);
            parse_integer(&raw).ok_or_else(|| invalid(column, raw))
        };

        let transaction_id = integer(TRANSACTION_ID)?;
        let customer_id = integer(CUSTOMER_ID)?;
        let terminal_id = integer(TERMINAL_ID)?;

        let raw_datetime = required(TX_DATETIME);
        let tx_datetime =
            parse_timestamp(&raw_datetime).ok_or_else(|| invalid(TX_DATETIME, raw_datetime))?;

        let raw_amount = required(TX_AMOUNT);
        let tx_amount = parse_float(&raw_amount).ok_or_else(|| invalid(TX_AMOUNT, raw_amount))?;

        let tx_fraud = match cell(TARGET_COLUMN) {
            Some(raw) if !raw.trim().is_empty() => match parse_integer(&raw) {
                Some(0) => Some(0),
                Some(1) => Some(1),
                _ => return Err(invalid(TARGET_COLUMN, raw)),
            },
            _ => None,
        };

        Ok(Self {
            transaction_id,
            tx_datetime,
            customer_id,
            terminal_id,
            tx_amount,
            tx_fraud,
        })
    }

    /// Textual cells in schema order, with an empty label cell when unlabeled.
    #[must_use]
    pub fn to_row(&self) -> Vec<String> {
        vec![
            self.transaction_id.to_string(),
            format_timestamp(&self.tx_datetime),
            self.customer_id.to_string(),
            self.terminal_id.to_string(),
            self.tx_amount.to_string(),
            self.tx_fraud.map(|label| label.to_string()).unwrap_or_default(),
        ]
    }

    /// The document form stored in the transactions collection.
    #[must_use]
    pub fn to_document(&self) -> Value {
        let mut document = Map::new();
        document.insert(TRANSACTION_ID.to_string(), self.transaction_id.into());
        document.insert(
            TX_DATETIME.to_string(),
            format_timestamp(&self.tx_datetime).into(),
        );
        document.insert(CUSTOMER_ID.to_string(), self.customer_id.into());
        document.insert(TERMINAL_ID.to_string(), self.terminal_id.into());
        document.insert(TX_AMOUNT.to_string(), self.tx_amount.into());
        if let Some(label) = self.tx_fraud {
            document.insert(TARGET_COLUMN.to_string(), label.into());
        }
        Value::Object(document)
    }
}

/// Builds a schema-ordered snapshot table from transactions.
#[must_use]
pub fn transactions_to_table(transactions: &[Transaction]) -> Table {
    Table::new(
        schema_column_names(true)
            .into_iter()
            .map(str::to_string)
            .collect(),
        transactions.iter().map(Transaction::to_row).collect(),
    )
}

/// Renders a scalar document value as a table cell.
#[must_use]
pub fn document_cell(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) => Some(text.clone()),
        Value::Bool(flag) => Some(u8::from(*flag).to_string()),
        Value::Number(number) => Some(number.to_string()),
        Value::Array(_) | Value::Object(_) => Some(value.to_string()),
    }
}

mod timestamp_format {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer, de};

    use crate::schema::{format_timestamp, parse_timestamp};

    pub fn serialize<S: Serializer>(value: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format_timestamp(value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse_timestamp(&raw).ok_or_else(|| de::Error::custom(format!("invalid timestamp {raw:?}")))
    }
}
