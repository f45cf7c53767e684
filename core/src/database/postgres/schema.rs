use chrono::{DateTime, NaiveDate, NaiveDateTime, Timelike};
use tracing::{debug, info};

use crate::{
    database::postgres::client::{split_table_name, PostgresClient, PostgresError},
    helpers::standardize_name,
    payload::{Payload, Value},
};

#[derive(thiserror::Error, Debug)]
pub enum CreateTableError {
    #[error("{0}")]
    Postgres(#[from] PostgresError),
}

/// The closed set of column types the synthesizer can emit. Classification is
/// a pure function over a column's sampled values so it stays unit-testable
/// without a database handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlColumnType {
    Integer,
    BigInt,
    Numeric,
    Date,
    Timestamp,
    TimestampTz,
    Boolean,
    Jsonb,
    TextArray,
    IntArray,
    Text,
}

impl SqlColumnType {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SqlColumnType::Integer => "integer",
            SqlColumnType::BigInt => "bigint",
            SqlColumnType::Numeric => "numeric",
            SqlColumnType::Date => "date",
            SqlColumnType::Timestamp => "timestamp",
            SqlColumnType::TimestampTz => "timestamp with time zone",
            SqlColumnType::Boolean => "boolean",
            SqlColumnType::Jsonb => "jsonb",
            SqlColumnType::TextArray => "text[]",
            SqlColumnType::IntArray => "integer[]",
            SqlColumnType::Text => "text",
        }
    }
}

fn parse_temporal(raw: &str) -> Option<Value> {
    let trimmed = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(Value::TimestampTz(ts));
    }
    if let Ok(ts) = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S%.f") {
        return Some(Value::Timestamp(ts));
    }
    if let Ok(ts) = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(Value::Timestamp(ts));
    }
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return Some(Value::Date(date));
    }
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%m/%d/%Y") {
        return Some(Value::Date(date));
    }
    None
}

/// Attempts to parse every non-null value as a date/timestamp. Returns None
/// when any value resists, leaving the column unchanged.
fn coerce_timestamps(values: &[Value]) -> Option<Vec<Value>> {
    values
        .iter()
        .map(|value| match value {
            Value::Null => Some(Value::Null),
            Value::Date(_) | Value::Timestamp(_) | Value::TimestampTz(_) => Some(value.clone()),
            Value::Text(raw) => parse_temporal(raw),
            _ => None,
        })
        .collect()
}

/// Attempts to parse every non-null value as a number. Booleans are left
/// alone on purpose so boolean columns survive classification.
fn coerce_numeric(values: &[Value]) -> Option<Vec<Value>> {
    values
        .iter()
        .map(|value| match value {
            Value::Null => Some(Value::Null),
            Value::Int(_) | Value::Float(_) | Value::Decimal(_) => Some(value.clone()),
            Value::Text(raw) => {
                let trimmed = raw.trim();
                if let Ok(int) = trimmed.parse::<i64>() {
                    Some(Value::Int(int))
                } else {
                    trimmed.parse::<f64>().ok().map(Value::Float)
                }
            }
            _ => None,
        })
        .collect()
}

fn is_midnight(value: &Value) -> bool {
    match value {
        Value::Date(_) => true,
        Value::Timestamp(ts) => {
            ts.hour() == 0 && ts.minute() == 0 && ts.second() == 0 && ts.nanosecond() == 0
        }
        _ => false,
    }
}

fn classify(values: &[Value]) -> SqlColumnType {
    let non_null: Vec<&Value> = values.iter().filter(|v| !v.is_null()).collect();
    if non_null.is_empty() {
        return SqlColumnType::Text;
    }

    if non_null.iter().all(|v| matches!(v, Value::Int(_))) {
        let max_abs = non_null
            .iter()
            .filter_map(|v| match v {
                Value::Int(i) => Some(i.unsigned_abs()),
                _ => None,
            })
            .max()
            .unwrap_or(0);
        return if max_abs > i32::MAX as u64 {
            SqlColumnType::BigInt
        } else {
            SqlColumnType::Integer
        };
    }

    if non_null
        .iter()
        .all(|v| matches!(v, Value::Int(_) | Value::Float(_) | Value::Decimal(_)))
    {
        return SqlColumnType::Numeric;
    }

    if non_null
        .iter()
        .all(|v| matches!(v, Value::Date(_) | Value::Timestamp(_) | Value::TimestampTz(_)))
    {
        if non_null.iter().any(|v| matches!(v, Value::TimestampTz(_))) {
            return SqlColumnType::TimestampTz;
        }
        return if non_null.iter().all(|v| is_midnight(v)) {
            SqlColumnType::Date
        } else {
            SqlColumnType::Timestamp
        };
    }

    if non_null.iter().all(|v| matches!(v, Value::Bool(_))) {
        return SqlColumnType::Boolean;
    }

    if non_null.iter().all(|v| matches!(v, Value::Json(json) if json.is_object())) {
        return SqlColumnType::Jsonb;
    }

    if non_null.iter().all(|v| matches!(v, Value::Array(_))) {
        let first_element = non_null.iter().find_map(|v| match v {
            Value::Array(items) => items.first(),
            _ => None,
        });
        return match first_element {
            Some(Value::Int(_)) => SqlColumnType::IntArray,
            Some(Value::Json(_)) => SqlColumnType::Jsonb,
            _ => SqlColumnType::TextArray,
        };
    }

    SqlColumnType::Text
}

/// Infers the postgres column type for one payload column.
///
/// Columns whose name contains "date" get a timestamp parse attempt first,
/// everything else a numeric one; columns holding nested lists skip coercion
/// entirely. A failed coercion leaves the values unchanged rather than
/// erroring.
pub fn infer_column_type(name: &str, values: &[Value]) -> SqlColumnType {
    let has_list = values.iter().any(|v| matches!(v, Value::Array(_)));

    let coerced = if has_list {
        None
    } else if name.to_lowercase().contains("date") {
        coerce_timestamps(values)
    } else {
        coerce_numeric(values)
    };

    classify(coerced.as_deref().unwrap_or(values))
}

#[derive(Debug, Clone)]
pub struct CreateTableOptions {
    pub created_at: bool,
    pub updated_at: bool,
    /// Verbatim constraint clause appended to the statement, e.g.
    /// `PRIMARY KEY (date, marketplace, asin)`.
    pub keys: Option<String>,
}

impl Default for CreateTableOptions {
    fn default() -> Self {
        CreateTableOptions { created_at: true, updated_at: true, keys: None }
    }
}

/// Builds the CREATE TABLE statement for a payload, or None when the payload
/// is empty (an empty payload is a no-op, not an error).
pub fn create_table_sql(
    payload: &Payload,
    table_name: &str,
    options: &CreateTableOptions,
) -> Option<String> {
    if payload.is_empty() {
        return None;
    }

    let (schema, table) = split_table_name(table_name);

    let mut definitions: Vec<String> = payload
        .columns()
        .iter()
        .map(|column| {
            let column_type = infer_column_type(&column.name, &column.values);
            format!("{} {}", standardize_name(&column.name), column_type.as_sql())
        })
        .collect();

    if options.created_at {
        definitions.push("created_at timestamp default current_timestamp".to_string());
    }
    if options.updated_at {
        definitions.push("updated_at timestamp default current_timestamp".to_string());
    }
    if let Some(keys) = &options.keys {
        definitions.push(keys.clone());
    }

    Some(format!("CREATE TABLE {}.{} ({})", schema, table, definitions.join(", ")))
}

/// Infers a schema from the payload and creates the target table. The table
/// becomes the single source of truth: later upserts conform data to it and
/// never alter it.
pub async fn create_table(
    client: &PostgresClient,
    payload: &Payload,
    table_name: &str,
    options: &CreateTableOptions,
) -> Result<(), CreateTableError> {
    match create_table_sql(payload, table_name, options) {
        Some(sql) => {
            debug!("Create table statement: {}", sql);
            client.batch_execute(&sql).await?;
            info!("Created table {}", table_name);
            Ok(())
        }
        None => {
            info!("Payload for {} is empty, skipping create table", table_name);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{FixedOffset, TimeZone};
    use serde_json::json;

    use super::*;

    fn texts(values: &[&str]) -> Vec<Value> {
        values.iter().map(|v| Value::Text(v.to_string())).collect()
    }

    #[test]
    fn test_integer_boundary_promotion() {
        let below = vec![Value::Int((i32::MAX) as i64), Value::Int(7)];
        assert_eq!(infer_column_type("quantity", &below), SqlColumnType::Integer);

        let at = vec![Value::Int(2_i64.pow(31)), Value::Int(7)];
        assert_eq!(infer_column_type("quantity", &at), SqlColumnType::BigInt);

        let negative = vec![Value::Int(-(2_i64.pow(31)) - 1)];
        assert_eq!(infer_column_type("quantity", &negative), SqlColumnType::BigInt);
    }

    #[test]
    fn test_numeric_strings_coerce() {
        assert_eq!(infer_column_type("amount", &texts(&["12.5", "3"])), SqlColumnType::Numeric);
        assert_eq!(infer_column_type("units", &texts(&["12", "3"])), SqlColumnType::Integer);
        // percent strings resist numeric coercion and stay text
        assert_eq!(infer_column_type("share", &texts(&["45%"])), SqlColumnType::Text);
    }

    #[test]
    fn test_date_named_columns_coerce() {
        assert_eq!(
            infer_column_type("date", &texts(&["2024-01-01", "2024-01-02"])),
            SqlColumnType::Date
        );
        assert_eq!(
            infer_column_type("Reporting Date", &texts(&["2024-01-01 00:00:00"])),
            SqlColumnType::Date
        );
        assert_eq!(
            infer_column_type("start_date", &texts(&["2024-01-01 10:30:00"])),
            SqlColumnType::Timestamp
        );
        assert_eq!(
            infer_column_type("updated_date", &texts(&["2024-01-01T10:30:00+02:00"])),
            SqlColumnType::TimestampTz
        );
        // unparseable values leave the column as text
        assert_eq!(
            infer_column_type("date", &texts(&["2024-01-01", "last week"])),
            SqlColumnType::Text
        );
    }

    #[test]
    fn test_temporal_values_classify_without_name_hint() {
        let tz = FixedOffset::east_opt(0).unwrap();
        let zoned = vec![Value::TimestampTz(tz.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap())];
        assert_eq!(infer_column_type("recorded_at", &zoned), SqlColumnType::TimestampTz);
    }

    #[test]
    fn test_boolean_json_and_array_columns() {
        assert_eq!(
            infer_column_type("active", &[Value::Bool(true), Value::Null]),
            SqlColumnType::Boolean
        );
        assert_eq!(
            infer_column_type("details", &[Value::Json(json!({"a": 1}))]),
            SqlColumnType::Jsonb
        );
        assert_eq!(
            infer_column_type("tags", &[Value::Array(texts(&["a", "b"]))]),
            SqlColumnType::TextArray
        );
        assert_eq!(
            infer_column_type("ids", &[Value::Array(vec![Value::Int(1), Value::Int(2)])]),
            SqlColumnType::IntArray
        );
        assert_eq!(
            infer_column_type("events", &[Value::Array(vec![Value::Json(json!({"a": 1}))])]),
            SqlColumnType::Jsonb
        );
    }

    #[test]
    fn test_all_null_and_mixed_fall_back_to_text() {
        assert_eq!(infer_column_type("notes", &[Value::Null, Value::Null]), SqlColumnType::Text);
        assert_eq!(
            infer_column_type("mixed", &[Value::Int(1), Value::Bool(true)]),
            SqlColumnType::Text
        );
    }

    #[test]
    fn test_create_table_sql_scenario() {
        let mut payload = Payload::new();
        payload.push_column("date", texts(&["2024-01-01"])).unwrap();
        payload.push_column("amount", vec![Value::Float(12.5)]).unwrap();
        payload.push_column("active", vec![Value::Bool(true)]).unwrap();

        let options = CreateTableOptions {
            keys: Some("PRIMARY KEY (date)".to_string()),
            ..Default::default()
        };
        let sql = create_table_sql(&payload, "finance.daily", &options).unwrap();

        assert_eq!(
            sql,
            "CREATE TABLE finance.daily (date date, amount numeric, active boolean, \
             created_at timestamp default current_timestamp, \
             updated_at timestamp default current_timestamp, PRIMARY KEY (date))"
        );
    }

    #[test]
    fn test_create_table_sql_standardizes_column_names() {
        let mut payload = Payload::new();
        payload.push_column("Keyword Phrase", texts(&["mat"])).unwrap();
        payload.push_column("Search Volume", vec![Value::Int(100)]).unwrap();

        let sql =
            create_table_sql(&payload, "cerebro", &CreateTableOptions::default()).unwrap();
        assert!(sql.starts_with("CREATE TABLE public.cerebro (keyword_phrase text, search_volume integer"));
    }

    #[test]
    fn test_create_table_sql_empty_payload_is_none() {
        assert!(create_table_sql(&Payload::new(), "t", &CreateTableOptions::default()).is_none());
    }
}
