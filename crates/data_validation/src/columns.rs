//! Column type detection and date decomposition.

use chrono::{Datelike, NaiveDateTime};
use fraud_structs::schema::{parse_float, parse_timestamp};

/// How a column's drift is tested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Numeric,
    /// Text fully parseable as dates.
    DateLike,
    Categorical,
}

/// Classifies a column from its reference cells.
pub fn detect_column_type(cells: &[&str]) -> ColumnType {
    if cells.is_empty() {
        return ColumnType::Categorical;
    }

    if cells.iter().all(|cell| parse_float(cell).is_some()) {
        ColumnType::Numeric
    } else if cells.iter().all(|cell| parse_timestamp(cell).is_some()) {
        ColumnType::DateLike
    } else {
        ColumnType::Categorical
    }
}

/// Numeric values of the cells that parse, skipping the rest.
pub fn numeric_values(cells: &[&str]) -> Vec<f64> {
    cells.iter().filter_map(|cell| parse_float(cell)).collect()
}

/// Sub-features tested for every date-like column, keyed `<column>_<name>`.
pub const DATE_FEATURES: [&str; 5] = ["year", "month", "weekday", "day", "is_weekend"];

/// Decomposes parseable cells into one value series per [`DATE_FEATURES`] entry.
pub fn date_features(cells: &[&str]) -> [Vec<f64>; 5] {
    let timestamps: Vec<NaiveDateTime> = cells.iter().filter_map(|cell| parse_timestamp(cell)).collect();

    let series = |extract: fn(&NaiveDateTime) -> f64| timestamps.iter().map(extract).collect();

    [
        series(|ts| f64::from(ts.year())),
        series(|ts| f64::from(ts.month())),
        series(|ts| f64::from(ts.weekday().num_days_from_monday())),
        series(|ts| f64::from(ts.day())),
        series(|ts| if ts.weekday().num_days_from_monday() >= 5 { 1.0 } else { 0.0 }),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_column_type() {
        assert_eq!(detect_column_type(&["1", "2.5", "-3"]), ColumnType::Numeric);
        assert_eq!(
            detect_column_type(&["2018-04-01 00:00:31", "2018-04-02"]),
            ColumnType::DateLike
        );
        assert_eq!(detect_column_type(&["a", "1"]), ColumnType::Categorical);
    }

    #[test]
    fn test_date_features() {
        // 2018-04-07 is a Saturday.
        let [year, month, weekday, day, weekend] = date_features(&["2018-04-07 10:00:00", "bad"]);
        assert_eq!(year, vec![2018.0]);
        assert_eq!(month, vec![4.0]);
        assert_eq!(weekday, vec![5.0]);
        assert_eq!(day, vec![7.0]);
        assert_eq!(weekend, vec![1.0]);
    }
}
