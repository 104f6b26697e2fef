use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::common::constants::{
    CLICKSTREAM, CLICK_TIME_COLUMN, STAGED_TIMESTAMP_FORMAT, TRANSACTIONS, TXN_TIME_COLUMN,
};

/// The two datasets a daily run ingests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatasetName {
    Clickstream,
    Transactions,
}

impl DatasetName {
    pub fn as_str(&self) -> &'static str {
        match self {
            DatasetName::Clickstream => CLICKSTREAM,
            DatasetName::Transactions => TRANSACTIONS,
        }
    }

    /// Column coerced to a UTC timestamp when the dataset is read
    pub fn timestamp_column(&self) -> &'static str {
        match self {
            DatasetName::Clickstream => CLICK_TIME_COLUMN,
            DatasetName::Transactions => TXN_TIME_COLUMN,
        }
    }
}

impl fmt::Display for DatasetName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DatasetName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            CLICKSTREAM => Ok(DatasetName::Clickstream),
            TRANSACTIONS => Ok(DatasetName::Transactions),
            other => Err(format!("unknown dataset '{}' (expected clickstream or transactions)", other)),
        }
    }
}

/// A single typed cell
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Value {
    Null,
    Text(String),
    Number(Decimal),
    Timestamp(DateTime<Utc>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Numeric view of the cell. Text cells are parsed on demand so a column
    /// that failed numeric typing still yields its numeric cells.
    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            Value::Number(d) => Some(*d),
            Value::Text(s) => parse_decimal(s),
            _ => None,
        }
    }

    /// String view used for codes such as currencies; `None` for nulls.
    pub fn as_text(&self) -> Option<String> {
        match self {
            Value::Null => None,
            other => Some(other.render()),
        }
    }

    /// Serialized form written to staged CSV files. Null renders as an empty cell.
    pub fn render(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Text(s) => s.clone(),
            Value::Number(d) => d.to_string(),
            Value::Timestamp(ts) => ts.format(STAGED_TIMESTAMP_FORMAT).to_string(),
        }
    }
}

pub fn parse_decimal(raw: &str) -> Option<Decimal> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    Decimal::from_str(trimmed)
        .or_else(|_| Decimal::from_scientific(trimmed))
        .ok()
}

pub type Row = Vec<Value>;

/// Ordered rows sharing one schema. Every row holds exactly `schema.len()` cells.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    pub name: DatasetName,
    pub schema: Vec<String>,
    pub rows: Vec<Row>,
}

impl Dataset {
    pub fn new(name: DatasetName, schema: Vec<String>) -> Self {
        Self {
            name,
            schema,
            rows: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.schema.iter().position(|c| c == column)
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.column_index(column).is_some()
    }

    /// Replace the values of `column`, appending it to the schema if absent.
    /// `values` must hold one entry per row.
    pub fn set_column(&mut self, column: &str, values: Vec<Value>) {
        debug_assert_eq!(values.len(), self.rows.len());
        match self.column_index(column) {
            Some(idx) => {
                for (row, value) in self.rows.iter_mut().zip(values) {
                    row[idx] = value;
                }
            }
            None => {
                self.schema.push(column.to_string());
                for (row, value) in self.rows.iter_mut().zip(values) {
                    row.push(value);
                }
            }
        }
    }

    /// Rewrite every cell of `column` in place.
    pub fn map_column<F>(&mut self, column: &str, mut f: F)
    where
        F: FnMut(&Value) -> Value,
    {
        if let Some(idx) = self.column_index(column) {
            for row in &mut self.rows {
                row[idx] = f(&row[idx]);
            }
        }
    }

    /// Append another dataset's rows, aligning its columns by name.
    /// Columns missing from `other` are filled with nulls; new columns are added.
    pub fn append(&mut self, other: Dataset) {
        let mut mapping = Vec::with_capacity(other.schema.len());
        for column in &other.schema {
            let idx = match self.column_index(column) {
                Some(idx) => idx,
                None => {
                    self.schema.push(column.clone());
                    for row in &mut self.rows {
                        row.push(Value::Null);
                    }
                    self.schema.len() - 1
                }
            };
            mapping.push(idx);
        }

        let width = self.schema.len();
        let aligned = mapping.iter().enumerate().all(|(i, idx)| i == *idx) && mapping.len() == width;
        if aligned {
            self.rows.extend(other.rows);
            return;
        }

        for row in other.rows {
            let mut out = vec![Value::Null; width];
            for (value, idx) in row.into_iter().zip(&mapping) {
                out[*idx] = value;
            }
            self.rows.push(out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn text(s: &str) -> Value {
        Value::Text(s.to_string())
    }

    #[test]
    fn test_dataset_name_round_trip() {
        assert_eq!("Transactions".parse::<DatasetName>().unwrap(), DatasetName::Transactions);
        assert_eq!(DatasetName::Clickstream.to_string(), "clickstream");
        assert_eq!(DatasetName::Transactions.timestamp_column(), "txn_time");
        assert!("orders".parse::<DatasetName>().is_err());
    }

    #[test]
    fn test_value_decimal_view() {
        assert_eq!(Value::Number(dec("1.5")).as_decimal(), Some(dec("1.5")));
        assert_eq!(text(" 42 ").as_decimal(), Some(dec("42")));
        assert_eq!(text("1e3").as_decimal(), Some(dec("1000")));
        assert_eq!(text("abc").as_decimal(), None);
        assert_eq!(Value::Null.as_decimal(), None);
    }

    #[test]
    fn test_numbers_render_with_scale() {
        assert_eq!(Value::Number(dec("1.50")).render(), "1.50");
        assert_eq!(Value::Null.render(), "");
    }

    #[test]
    fn test_timestamps_render_with_sub_second_precision() {
        let whole = Utc.with_ymd_and_hms(2025, 9, 12, 10, 0, 0).unwrap();
        assert_eq!(Value::Timestamp(whole).render(), "2025-09-12 10:00:00+00:00");

        let millis = whole + chrono::Duration::milliseconds(250);
        assert_eq!(Value::Timestamp(millis).render(), "2025-09-12 10:00:00.250+00:00");

        let micros = whole + chrono::Duration::microseconds(1);
        assert_eq!(Value::Timestamp(micros).render(), "2025-09-12 10:00:00.000001+00:00");
    }

    #[test]
    fn test_set_column_adds_then_replaces() {
        let mut ds = Dataset::new(DatasetName::Transactions, vec!["a".to_string()]);
        ds.rows.push(vec![text("x")]);
        ds.rows.push(vec![text("y")]);

        ds.set_column("b", vec![Value::Null, text("z")]);
        assert_eq!(ds.schema, vec!["a", "b"]);
        assert_eq!(ds.rows[1], vec![text("y"), text("z")]);

        ds.set_column("a", vec![text("1"), text("2")]);
        assert_eq!(ds.schema.len(), 2);
        assert_eq!(ds.rows[0][0], text("1"));
    }

    #[test]
    fn test_append_aligns_columns_by_name() {
        let mut left = Dataset::new(DatasetName::Clickstream, vec!["a".to_string(), "b".to_string()]);
        left.rows.push(vec![text("1"), text("2")]);

        let mut right = Dataset::new(DatasetName::Clickstream, vec!["b".to_string(), "c".to_string()]);
        right.rows.push(vec![text("3"), text("4")]);

        left.append(right);
        assert_eq!(left.schema, vec!["a", "b", "c"]);
        assert_eq!(left.rows[0], vec![text("1"), text("2"), Value::Null]);
        assert_eq!(left.rows[1], vec![Value::Null, text("3"), text("4")]);
    }
}
