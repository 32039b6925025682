//! Ordered, typed transaction schema validated once at each data boundary.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

/// Textual form of every timestamp written by the pipeline.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub const TRANSACTION_ID: &str = "TRANSACTION_ID";
pub const TX_DATETIME: &str = "TX_DATETIME";
pub const CUSTOMER_ID: &str = "CUSTOMER_ID";
pub const TERMINAL_ID: &str = "TERMINAL_ID";
pub const TX_AMOUNT: &str = "TX_AMOUNT";
/// Binary fraud label, the training target.
pub const TARGET_COLUMN: &str = "TX_FRAUD";

/// Value type of a schema column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Integer,
    Float,
    DateTime,
}

impl ColumnKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Integer => "int",
            Self::Float => "float",
            Self::DateTime => "datetime",
        }
    }
}

/// One named, typed column of the transaction schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: &'static str,
    pub kind: ColumnKind,
    /// The label column is absent from transactions awaiting a prediction.
    pub is_label: bool,
}

impl ColumnSpec {
    const fn new(name: &'static str, kind: ColumnKind) -> Self {
        Self {
            name,
            kind,
            is_label: false,
        }
    }

    const fn label(name: &'static str, kind: ColumnKind) -> Self {
        Self {
            name,
            kind,
            is_label: true,
        }
    }
}

/// The required columns of a transaction record, in snapshot order.
pub const TRANSACTION_SCHEMA: [ColumnSpec; 6] = [
    ColumnSpec::new(TRANSACTION_ID, ColumnKind::Integer),
    ColumnSpec::new(TX_DATETIME, ColumnKind::DateTime),
    ColumnSpec::new(CUSTOMER_ID, ColumnKind::Integer),
    ColumnSpec::new(TERMINAL_ID, ColumnKind::Integer),
    ColumnSpec::new(TX_AMOUNT, ColumnKind::Float),
    ColumnSpec::label(TARGET_COLUMN, ColumnKind::Integer),
];

/// Names of the schema columns, optionally including the label.
#[must_use]
pub fn schema_column_names(include_label: bool) -> Vec<&'static str> {
    TRANSACTION_SCHEMA
        .iter()
        .filter(|spec| include_label || !spec.is_label)
        .map(|spec| spec.name)
        .collect()
}

/// Returns every schema column for which `is_present` is false, in schema order.
pub fn missing_schema_columns(
    include_label: bool,
    mut is_present: impl FnMut(&str) -> bool,
) -> Vec<String> {
    schema_column_names(include_label)
        .into_iter()
        .filter(|name| !is_present(name))
        .map(str::to_string)
        .collect()
}

/// Parses a timestamp in any of the accepted textual forms.
///
/// Accepts `YYYY-MM-DD HH:MM:SS` (optionally with fractional seconds), the
/// ISO `T`-separated equivalent and a bare date (midnight).
#[must_use]
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    const DATETIME_FORMATS: [&str; 4] = [
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M:%S%.f",
    ];

    let raw = raw.trim();
    DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .map(|date| date.and_time(NaiveTime::MIN))
        })
}

/// Formats a timestamp in the canonical snapshot form.
#[must_use]
pub fn format_timestamp(timestamp: &NaiveDateTime) -> String {
    timestamp.format(TIMESTAMP_FORMAT).to_string()
}

/// Parses an integer cell, tolerating an integral float such as `"12.0"`.
#[must_use]
pub fn parse_integer(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    if let Ok(value) = raw.parse::<i64>() {
        return Some(value);
    }

    let value = raw.parse::<f64>().ok()?;
    #[allow(clippy::cast_possible_truncation)]
    let truncated = value as i64;
    (value.is_finite() && value.fract() == 0.0).then_some(truncated)
}

/// Parses a finite float cell.
#[must_use]
pub fn parse_float(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|value| value.is_finite())
}

#[cfg(test)]
mod tests {
    use chrono::{Datelike, Timelike};

    use super::*;

    #[test]
    fn test_schema_order_and_label() {
        assert_eq!(
            schema_column_names(true),
            vec![
                "TRANSACTION_ID",
                "TX_DATETIME",
                "CUSTOMER_ID",
                "TERMINAL_ID",
                "TX_AMOUNT",
                "TX_FRAUD"
            ]
        );
        assert!(!schema_column_names(false).contains(&TARGET_COLUMN));
    }

    #[test]
    fn test_missing_columns_reports_all() {
        let present = ["TRANSACTION_ID", "TX_DATETIME", "CUSTOMER_ID"];
        let missing = missing_schema_columns(true, |name| present.contains(&name));
        assert_eq!(missing, vec!["TERMINAL_ID", "TX_AMOUNT", "TX_FRAUD"]);
    }

    #[test]
    fn test_parse_timestamp_forms() {
        let ts = parse_timestamp("2018-04-01 02:13:07").unwrap();
        assert_eq!((ts.hour(), ts.minute(), ts.second()), (2, 13, 7));

        let iso = parse_timestamp("2018-04-01T02:13:07").unwrap();
        assert_eq!(ts, iso);

        let date = parse_timestamp("2018-04-01").unwrap();
        assert_eq!((date.day(), date.hour()), (1, 0));

        assert!(parse_timestamp("not a date").is_none());
        assert_eq!(format_timestamp(&ts), "2018-04-01 02:13:07");
    }

    #[test]
    fn test_parse_integer_accepts_integral_float() {
        assert_eq!(parse_integer("42"), Some(42));
        assert_eq!(parse_integer("42.0"), Some(42));
        assert_eq!(parse_integer("42.5"), None);
        assert_eq!(parse_integer(""), None);
    }
}
