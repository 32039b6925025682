//! Time ordering and trailing-window aggregation over a transaction set.

use std::collections::HashMap;
use std::hash::Hash;

use chrono::NaiveDateTime;

pub const MILLIS_PER_DAY: i64 = 86_400_000;

/// Milliseconds since the epoch.
pub fn timestamp_millis(timestamp: &NaiveDateTime) -> i64 {
    timestamp.and_utc().timestamp_millis()
}

/// Makes timestamps strictly ordered.
///
/// Rows sharing an identical timestamp are shifted by 1 ms per earlier
/// duplicate, earlier duplicates being the ones with the lower row index.
/// Returns the shifted timestamps (by row) and the row indices sorted by them.
pub fn tie_broken_order(timestamps: &[i64]) -> (Vec<i64>, Vec<usize>) {
    let mut by_time: Vec<usize> = (0..timestamps.len()).collect();
    by_time.sort_by_key(|&row| (timestamps[row], row));

    let mut unique = vec![0; timestamps.len()];
    let mut duplicates = 0;
    for (position, &row) in by_time.iter().enumerate() {
        if position > 0 && timestamps[by_time[position - 1]] == timestamps[row] {
            duplicates += 1;
        } else {
            duplicates = 0;
        }
        unique[row] = timestamps[row] + duplicates;
    }

    let mut order: Vec<usize> = (0..timestamps.len()).collect();
    order.sort_by_key(|&row| (unique[row], row));

    (unique, order)
}

/// Splits an ordered row sequence into per-key sequences, preserving order.
pub fn group_in_order<K: Eq + Hash + Copy>(order: &[usize], key: impl Fn(usize) -> K) -> Vec<Vec<usize>> {
    let mut slots: HashMap<K, usize> = HashMap::new();
    let mut groups: Vec<Vec<usize>> = Vec::new();

    for &row in order {
        let slot = *slots.entry(key(row)).or_insert_with(|| {
            groups.push(Vec::new());
            groups.len() - 1
        });
        groups[slot].push(row);
    }

    groups
}

/// Aggregates over the half-open window `(t - window, t]` ending at a row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowStats {
    pub count: usize,
    pub mean: f64,
    pub max: f64,
}

/// Computes trailing-window statistics for every row of one entity.
///
/// `group` lists the entity's rows in time order, `times` holds the
/// tie-broken timestamps by row. Only rows at or before the current position
/// contribute to its window.
pub fn trailing_window(
    group: &[usize],
    times: &[i64],
    amounts: &[f64],
    window_millis: i64,
) -> Vec<(usize, WindowStats)> {
    let mut stats = Vec::with_capacity(group.len());
    let mut start = 0;
    let mut sum = 0.0;

    for (end, &row) in group.iter().enumerate() {
        sum += amounts[row];
        while times[group[start]] <= times[row] - window_millis {
            sum -= amounts[group[start]];
            start += 1;
        }

        let window = &group[start..=end];
        let max = window
            .iter()
            .map(|&member| amounts[member])
            .fold(f64::NEG_INFINITY, f64::max);

        #[allow(clippy::cast_precision_loss)]
        let count = window.len() as f64;
        stats.push((
            row,
            WindowStats {
                count: window.len(),
                mean: sum / count,
                max,
            },
        ));
    }

    stats
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tie_break_shifts_duplicates() {
        let (unique, order) = tie_broken_order(&[1000, 500, 1000, 1000]);
        assert_eq!(unique, vec![1000, 500, 1001, 1002]);
        assert_eq!(order, vec![1, 0, 2, 3]);
    }

    #[test]
    fn test_group_in_order() {
        let keys = [7, 3, 7, 3, 9];
        let groups = group_in_order(&[0, 1, 2, 3, 4], |row| keys[row]);
        assert_eq!(groups, vec![vec![0, 2], vec![1, 3], vec![4]]);
    }

    #[test]
    fn test_trailing_window_is_half_open() {
        let times = [0, MILLIS_PER_DAY / 2, MILLIS_PER_DAY, MILLIS_PER_DAY + 1];
        let amounts = [10.0, 20.0, 30.0, 40.0];
        let stats = trailing_window(&[0, 1, 2, 3], &times, &amounts, MILLIS_PER_DAY);

        let counts: Vec<usize> = stats.iter().map(|(_, s)| s.count).collect();
        // The row exactly one day earlier falls outside the window.
        assert_eq!(counts, vec![1, 2, 2, 3]);

        let (_, last) = stats[3];
        assert!((last.mean - 30.0).abs() < 1e-9);
        assert!((last.max - 40.0).abs() < 1e-9);
    }
}
