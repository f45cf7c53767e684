use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;

use crate::helpers::standardize_name;

mod csv_file;
mod json_rows;

pub use csv_file::{csv_payload_from_reader, read_csv_payload};
pub use json_rows::{flatten_json_list_values, json_rows_to_payload};

#[derive(thiserror::Error, Debug)]
pub enum PayloadError {
    #[error("duplicate column name '{0}' in payload")]
    DuplicateColumn(String),

    #[error("column '{column}' has {got} rows, expected {expected}")]
    LengthMismatch { column: String, expected: usize, got: usize },

    #[error("cannot add a constant column to an empty payload")]
    EmptyPayload,

    #[error("could not read csv payload: {0}")]
    Csv(#[from] csv::Error),

    #[error("could not read payload file: {0}")]
    Io(#[from] std::io::Error),

    #[error("expected an array of json objects, got {0}")]
    NotRows(String),
}

/// A single typed cell of a tabular payload.
///
/// Payloads are source-agnostic: a CSV file, a decompressed JSON report or a
/// paginated API response flattened to rows all end up as columns of these.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Decimal(Decimal),
    Date(NaiveDate),
    Timestamp(NaiveDateTime),
    TimestampTz(DateTime<FixedOffset>),
    Text(String),
    Json(serde_json::Value),
    Array(Vec<Value>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Best-effort typing of a raw CSV cell: empty -> null, then boolean,
    /// integer, float, falling back to text. Dates are not sniffed here; the
    /// schema synthesizer only coerces timestamps for date-named columns.
    pub fn sniff(raw: &str) -> Value {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Value::Null;
        }
        match trimmed.to_ascii_lowercase().as_str() {
            "true" => return Value::Bool(true),
            "false" => return Value::Bool(false),
            _ => {}
        }
        if let Ok(int) = trimmed.parse::<i64>() {
            return Value::Int(int);
        }
        if let Ok(float) = trimmed.parse::<f64>() {
            return Value::Float(float);
        }
        Value::Text(raw.to_string())
    }

    pub fn from_json(value: &serde_json::Value) -> Value {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => {
                if let Some(int) = n.as_i64() {
                    Value::Int(int)
                } else {
                    Value::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            serde_json::Value::String(s) => Value::Text(s.clone()),
            serde_json::Value::Array(items) => {
                Value::Array(items.iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(_) => Value::Json(value.clone()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Column {
    pub name: String,
    pub values: Vec<Value>,
}

/// A row-oriented tabular dataset with named columns, the unit of data moved
/// between fetch and store steps. Column names are unique and every column
/// holds the same number of rows.
#[derive(Debug, Clone, Default)]
pub struct Payload {
    columns: Vec<Column>,
}

impl Payload {
    pub fn new() -> Self {
        Payload::default()
    }

    pub fn rows(&self) -> usize {
        self.columns.first().map(|c| c.values.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty() || self.rows() == 0
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn push_column(
        &mut self,
        name: impl Into<String>,
        values: Vec<Value>,
    ) -> Result<(), PayloadError> {
        let name = name.into();
        if self.column(&name).is_some() {
            return Err(PayloadError::DuplicateColumn(name));
        }
        if !self.columns.is_empty() && values.len() != self.rows() {
            return Err(PayloadError::LengthMismatch {
                column: name,
                expected: self.rows(),
                got: values.len(),
            });
        }
        self.columns.push(Column { name, values });
        Ok(())
    }

    /// Adds a column holding the same value for every row, the way the fetch
    /// scripts inject `marketplace` and `date` next to a vendor payload.
    pub fn push_constant_column(
        &mut self,
        name: impl Into<String>,
        value: Value,
    ) -> Result<(), PayloadError> {
        if self.columns.is_empty() {
            return Err(PayloadError::EmptyPayload);
        }
        let rows = self.rows();
        self.push_column(name, vec![value; rows])
    }

    /// Runs every column name through the standardizer. Errors if two raw
    /// names collapse to the same identifier.
    pub fn standardize_columns(&mut self) -> Result<(), PayloadError> {
        let mut seen: Vec<String> = Vec::with_capacity(self.columns.len());
        for column in &mut self.columns {
            let standardized = standardize_name(&column.name);
            if seen.contains(&standardized) {
                return Err(PayloadError::DuplicateColumn(standardized));
            }
            seen.push(standardized.clone());
            column.name = standardized;
        }
        Ok(())
    }

    /// Moves named columns to fixed positions, keeping the relative order of
    /// the rest. Unknown names are ignored.
    pub fn reposition_columns(&mut self, positions: &[(&str, usize)]) {
        for (name, position) in positions {
            if let Some(current) = self.columns.iter().position(|c| &c.name == name) {
                let column = self.columns.remove(current);
                let target = (*position).min(self.columns.len());
                self.columns.insert(target, column);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_column_rejects_duplicates() {
        let mut payload = Payload::new();
        payload.push_column("asin", vec![Value::Text("B0001".into())]).unwrap();
        let err = payload.push_column("asin", vec![Value::Null]).unwrap_err();
        assert!(matches!(err, PayloadError::DuplicateColumn(name) if name == "asin"));
    }

    #[test]
    fn test_push_column_rejects_ragged_rows() {
        let mut payload = Payload::new();
        payload.push_column("a", vec![Value::Int(1), Value::Int(2)]).unwrap();
        let err = payload.push_column("b", vec![Value::Int(1)]).unwrap_err();
        assert!(matches!(err, PayloadError::LengthMismatch { expected: 2, got: 1, .. }));
    }

    #[test]
    fn test_constant_column_matches_row_count() {
        let mut payload = Payload::new();
        payload.push_column("asin", vec![Value::Text("a".into()), Value::Text("b".into())]).unwrap();
        payload.push_constant_column("marketplace", Value::Text("US".into())).unwrap();
        assert_eq!(payload.column("marketplace").unwrap().values.len(), 2);

        let mut empty = Payload::new();
        assert!(matches!(
            empty.push_constant_column("marketplace", Value::Null),
            Err(PayloadError::EmptyPayload)
        ));
    }

    #[test]
    fn test_standardize_columns() {
        let mut payload = Payload::new();
        payload.push_column("Keyword Phrase", vec![Value::Null]).unwrap();
        payload.push_column("searchVolume", vec![Value::Null]).unwrap();
        payload.standardize_columns().unwrap();
        assert_eq!(payload.column_names(), vec!["keyword_phrase", "search_volume"]);
    }

    #[test]
    fn test_standardize_columns_detects_collisions() {
        let mut payload = Payload::new();
        payload.push_column("Search Volume", vec![Value::Null]).unwrap();
        payload.push_column("searchVolume", vec![Value::Null]).unwrap();
        assert!(matches!(
            payload.standardize_columns(),
            Err(PayloadError::DuplicateColumn(name)) if name == "search_volume"
        ));
    }

    #[test]
    fn test_reposition_columns() {
        let mut payload = Payload::new();
        payload.push_column("rate", vec![Value::Null]).unwrap();
        payload.push_column("date", vec![Value::Null]).unwrap();
        payload.push_column("marketplace", vec![Value::Null]).unwrap();
        payload.reposition_columns(&[("date", 0), ("marketplace", 1)]);
        assert_eq!(payload.column_names(), vec!["date", "marketplace", "rate"]);
    }

    #[test]
    fn test_sniff() {
        assert_eq!(Value::sniff(""), Value::Null);
        assert_eq!(Value::sniff("true"), Value::Bool(true));
        assert_eq!(Value::sniff("False"), Value::Bool(false));
        assert_eq!(Value::sniff("42"), Value::Int(42));
        assert_eq!(Value::sniff("12.5"), Value::Float(12.5));
        assert_eq!(Value::sniff("45%"), Value::Text("45%".into()));
        assert_eq!(Value::sniff("B0001ABC"), Value::Text("B0001ABC".into()));
    }
}
