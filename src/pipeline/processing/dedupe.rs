use serde::Serialize;
use std::collections::HashSet;

use crate::pipeline::dataset::Dataset;

/// Row counts around deduplication. `rows_out == rows_in - rows_removed` always holds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DedupeStats {
    pub rows_in: usize,
    pub rows_out: usize,
    pub rows_removed: usize,
}

/// Drop exact full-row duplicates, keeping the first occurrence and the
/// original order of the survivors.
pub fn dedupe(dataset: &mut Dataset) -> DedupeStats {
    let rows_in = dataset.rows.len();

    let keep: Vec<bool> = {
        let mut seen = HashSet::with_capacity(rows_in);
        dataset.rows.iter().map(|row| seen.insert(row)).collect()
    };
    let mut keep = keep.into_iter();
    dataset.rows.retain(|_| keep.next().unwrap_or(true));

    let rows_out = dataset.rows.len();
    DedupeStats {
        rows_in,
        rows_out,
        rows_removed: rows_in - rows_out,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::dataset::{DatasetName, Value};
    use rust_decimal::Decimal;

    fn dataset(rows: Vec<Vec<Value>>) -> Dataset {
        let mut ds = Dataset::new(DatasetName::Clickstream, vec!["user_id".to_string(), "page".to_string()]);
        ds.rows = rows;
        ds
    }

    fn row(id: i64, page: &str) -> Vec<Value> {
        vec![Value::Number(Decimal::from(id)), Value::Text(page.to_string())]
    }

    #[test]
    fn test_keeps_first_occurrence_in_order() {
        let mut ds = dataset(vec![row(1, "/a"), row(2, "/b"), row(1, "/a"), row(3, "/c"), row(2, "/b")]);
        let stats = dedupe(&mut ds);

        assert_eq!(ds.rows, vec![row(1, "/a"), row(2, "/b"), row(3, "/c")]);
        assert_eq!(stats, DedupeStats { rows_in: 5, rows_out: 3, rows_removed: 2 });
    }

    #[test]
    fn test_partial_duplicates_are_kept() {
        let mut ds = dataset(vec![row(1, "/a"), row(1, "/b"), vec![Value::Null, Value::Text("/a".to_string())]]);
        let stats = dedupe(&mut ds);
        assert_eq!(stats.rows_removed, 0);
    }

    #[test]
    fn test_numeric_scale_does_not_split_duplicates() {
        let a = vec![Value::Number(Decimal::new(150, 2)), Value::Null];
        let b = vec![Value::Number(Decimal::new(15, 1)), Value::Null];
        let mut ds = dataset(vec![a, b]);
        assert_eq!(dedupe(&mut ds).rows_out, 1);
    }

    #[test]
    fn test_dedupe_is_idempotent() {
        let mut ds = dataset(vec![row(1, "/a"), row(1, "/a"), row(2, "/a"), row(2, "/a"), row(2, "/b")]);
        let first = dedupe(&mut ds);
        let second = dedupe(&mut ds);

        assert_eq!(first.rows_out, second.rows_out);
        assert_eq!(second.rows_removed, 0);
        assert_eq!(first.rows_out, first.rows_in - first.rows_removed);
    }

    #[test]
    fn test_empty_dataset() {
        let mut ds = dataset(vec![]);
        assert_eq!(dedupe(&mut ds), DedupeStats::default());
    }
}
