use bytes::Bytes;
use csv::{QuoteStyle, WriterBuilder};
use futures::{pin_mut, SinkExt};
use tokio_postgres::Transaction;
use tracing::{debug, info, warn};

use crate::{
    database::postgres::client::{split_table_name, PostgresClient, PostgresError},
    helpers::{generate_random_id, standardize_name},
    payload::{Payload, Value},
};

#[derive(thiserror::Error, Debug)]
pub enum UpsertError {
    #[error("{0}")]
    Postgres(#[from] PostgresError),

    #[error("no column metadata found for {0}, does the table exist?")]
    UnknownTable(String),

    #[error("payload for {table} is missing primary key column '{column}'")]
    MissingKeyColumn { table: String, column: String },

    #[error("schema column '{0}' has no counterpart in the payload")]
    SchemaMismatch(String),

    #[error("could not cast column '{column}' to {pg_type}: {value}")]
    Cast { column: String, pg_type: String, value: String },

    #[error("could not serialize payload to csv: {0}")]
    Csv(#[from] csv::Error),
}

/// The host-side shape a postgres column type casts through before the CSV
/// buffer is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PgKind {
    Int,
    Float,
    Bool,
    Date,
    Timestamp { with_tz: bool },
    Text,
    Array,
    Jsonb,
}

fn pg_kind(data_type: &str) -> PgKind {
    match data_type {
        "smallint" | "integer" | "bigint" => PgKind::Int,
        "numeric" | "real" | "double precision" => PgKind::Float,
        "boolean" => PgKind::Bool,
        "date" => PgKind::Date,
        "timestamp" | "timestamp without time zone" => PgKind::Timestamp { with_tz: false },
        "timestamptz" | "timestamp with time zone" => PgKind::Timestamp { with_tz: true },
        "ARRAY" => PgKind::Array,
        "json" | "jsonb" => PgKind::Jsonb,
        _ => PgKind::Text,
    }
}

#[derive(Debug, Clone)]
struct TableColumn {
    name: String,
    data_type: String,
    kind: PgKind,
    generated: bool,
}

impl TableColumn {
    fn writable(&self) -> bool {
        !self.generated && self.name != "created_at" && self.name != "updated_at"
    }
}

async fn fetch_table_columns(
    transaction: &Transaction<'_>,
    schema: &str,
    table: &str,
) -> Result<Vec<TableColumn>, UpsertError> {
    let query = r#"
        SELECT column_name, data_type, is_generated, is_identity
        FROM information_schema.columns
        WHERE table_schema = $1 AND table_name = $2
        ORDER BY ordinal_position
    "#;

    let rows = transaction.query(query, &[&schema, &table]).await.map_err(PostgresError::PgError)?;

    Ok(rows
        .iter()
        .map(|row| {
            let name: String = row.get(0);
            let data_type: String = row.get(1);
            let is_generated: String = row.get(2);
            let is_identity: String = row.get(3);
            TableColumn {
                kind: pg_kind(&data_type),
                generated: is_generated == "ALWAYS" || is_identity == "YES",
                name,
                data_type,
            }
        })
        .collect())
}

async fn fetch_primary_key_columns(
    transaction: &Transaction<'_>,
    schema: &str,
    table: &str,
) -> Result<Vec<String>, UpsertError> {
    let query = r#"
        SELECT kcu.column_name
        FROM information_schema.table_constraints tc
        JOIN information_schema.key_column_usage kcu
            ON tc.constraint_name = kcu.constraint_name
            AND tc.table_schema = kcu.table_schema
        WHERE tc.constraint_type = 'PRIMARY KEY'
            AND tc.table_schema = $1
            AND tc.table_name = $2
        ORDER BY kcu.ordinal_position
    "#;

    let rows = transaction.query(query, &[&schema, &table]).await.map_err(PostgresError::PgError)?;

    Ok(rows.iter().map(|row| row.get::<_, String>(0)).collect())
}

async fn fetch_primary_key_constraint(
    transaction: &Transaction<'_>,
    qualified: &str,
) -> Result<Option<String>, UpsertError> {
    let query = "SELECT conname FROM pg_constraint WHERE conrelid = to_regclass($1) AND contype = 'p'";

    let row = transaction
        .query_opt(query, &[&qualified])
        .await
        .map_err(PostgresError::PgError)?;

    Ok(row.map(|row| row.get::<_, String>(0)))
}

fn render_scalar(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Int(i) => i.to_string(),
        Value::Float(f) => f.to_string(),
        Value::Decimal(d) => d.to_string(),
        Value::Date(d) => d.format("%Y-%m-%d").to_string(),
        Value::Timestamp(ts) => ts.format("%Y-%m-%d %H:%M:%S%.f").to_string(),
        Value::TimestampTz(ts) => ts.format("%Y-%m-%d %H:%M:%S%.f%:z").to_string(),
        Value::Text(t) => t.clone(),
        Value::Json(j) => j.to_string(),
        Value::Array(items) => {
            format!("{{{}}}", items.iter().map(render_scalar).collect::<Vec<_>>().join(", "))
        }
    }
}

/// Casts one payload cell to the text form COPY expects for the target column
/// type. The empty string is the NULL sentinel.
fn cast_cell(column: &TableColumn, value: &Value) -> Result<String, UpsertError> {
    if value.is_null() {
        return Ok(String::new());
    }

    if let Value::Text(raw) = value {
        // pandas-era null tokens arriving as text
        if column.kind != PgKind::Int && matches!(raw.trim(), "None" | "nan" | "NaN") {
            return Ok(String::new());
        }
    }

    let cast_err = || UpsertError::Cast {
        column: column.name.clone(),
        pg_type: column.data_type.clone(),
        value: format!("{value:?}"),
    };

    match column.kind {
        PgKind::Int => match value {
            Value::Int(i) => Ok(i.to_string()),
            Value::Float(f) if f.fract() == 0.0 => Ok((*f as i64).to_string()),
            Value::Text(raw) => {
                raw.trim().parse::<i64>().map(|i| i.to_string()).map_err(|_| cast_err())
            }
            _ => Err(cast_err()),
        },
        PgKind::Float => match value {
            Value::Int(i) => Ok(i.to_string()),
            Value::Float(f) => Ok(f.to_string()),
            Value::Decimal(d) => Ok(d.to_string()),
            Value::Text(raw) => {
                let trimmed = raw.trim();
                if let Some(percent) = trimmed.strip_suffix('%') {
                    // report exports hold percentages as "45%"
                    percent
                        .trim()
                        .parse::<f64>()
                        .map(|f| (f / 100.0).to_string())
                        .map_err(|_| cast_err())
                } else {
                    trimmed.parse::<f64>().map(|f| f.to_string()).map_err(|_| cast_err())
                }
            }
            _ => Err(cast_err()),
        },
        PgKind::Bool => match value {
            Value::Bool(b) => Ok(b.to_string()),
            Value::Int(0) => Ok("false".to_string()),
            Value::Int(1) => Ok("true".to_string()),
            // a non-empty string would otherwise truthily cast to true
            Value::Text(raw) => match raw.trim() {
                "False" | "false" | "FALSE" | "0" => Ok("false".to_string()),
                "True" | "true" | "TRUE" | "1" => Ok("true".to_string()),
                _ => Err(cast_err()),
            },
            _ => Err(cast_err()),
        },
        PgKind::Date => match value {
            Value::Date(date) => Ok(date.format("%Y-%m-%d").to_string()),
            Value::Timestamp(ts) => Ok(ts.date().format("%Y-%m-%d").to_string()),
            Value::TimestampTz(ts) => Ok(ts.date_naive().format("%Y-%m-%d").to_string()),
            Value::Text(raw) => Ok(raw.clone()),
            _ => Err(cast_err()),
        },
        PgKind::Timestamp { with_tz } => match value {
            Value::Timestamp(ts) => Ok(ts.format("%Y-%m-%d %H:%M:%S%.f").to_string()),
            Value::TimestampTz(ts) => {
                if with_tz {
                    Ok(ts.format("%Y-%m-%d %H:%M:%S%.f%:z").to_string())
                } else {
                    Ok(ts.naive_local().format("%Y-%m-%d %H:%M:%S%.f").to_string())
                }
            }
            Value::Date(date) => Ok(format!("{} 00:00:00", date.format("%Y-%m-%d"))),
            Value::Text(raw) => Ok(raw.clone()),
            _ => Err(cast_err()),
        },
        PgKind::Array => match value {
            Value::Array(items) => {
                let rendered: Vec<String> = items.iter().map(render_scalar).collect();
                Ok(format!("{{{}}}", rendered.join(", ")))
            }
            Value::Text(raw) => Ok(raw.clone()),
            _ => Err(cast_err()),
        },
        PgKind::Jsonb => match value {
            Value::Json(json) => Ok(json.to_string()),
            Value::Text(raw) => Ok(raw.clone()),
            _ => Err(cast_err()),
        },
        PgKind::Text => Ok(render_scalar(value)),
    }
}

/// Strips the quoting the standardizer wraps around leading-digit
/// identifiers; the catalog reports such names bare.
fn bare_name(name: &str) -> &str {
    name.strip_prefix('"').and_then(|n| n.strip_suffix('"')).unwrap_or(name)
}

/// Re-quotes a catalog column name postgres will not accept bare in SQL.
fn quote_ident(name: &str) -> String {
    if name.starts_with(|c: char| c.is_ascii_digit()) {
        format!("\"{name}\"")
    } else {
        name.to_string()
    }
}

/// Conforms an incoming payload to the live schema: standardizes names,
/// rejects payloads missing a primary key column, drops unknown columns,
/// fills missing writable columns with nulls, casts every cell and reorders
/// to the schema's physical column order. Returns row-major rendered records.
fn conform_payload(
    qualified: &str,
    writable: &[TableColumn],
    pk_columns: &[String],
    payload: &Payload,
) -> Result<Vec<Vec<String>>, UpsertError> {
    let rows = payload.rows();

    let mut incoming: Vec<(String, Vec<Value>)> = payload
        .columns()
        .iter()
        .map(|column| {
            (bare_name(&standardize_name(&column.name)).to_string(), column.values.clone())
        })
        .collect();

    for key in pk_columns {
        if writable.iter().any(|c| &c.name == key) && !incoming.iter().any(|(name, _)| name == key)
        {
            return Err(UpsertError::MissingKeyColumn {
                table: qualified.to_string(),
                column: key.clone(),
            });
        }
    }

    incoming.retain(|(name, _)| {
        let known = writable.iter().any(|c| &c.name == name);
        if !known {
            warn!("Dropping payload column '{}' not present on {}", name, qualified);
        }
        known
    });

    for column in writable {
        if !incoming.iter().any(|(name, _)| name == &column.name) {
            warn!(
                "Payload for {} is missing column '{}', filling with nulls",
                qualified, column.name
            );
            incoming.push((column.name.clone(), vec![Value::Null; rows]));
        }
    }

    let mut rendered: Vec<Vec<String>> = Vec::with_capacity(writable.len());
    for column in writable {
        let (_, values) = incoming
            .iter()
            .find(|(name, _)| name == &column.name)
            .ok_or_else(|| UpsertError::SchemaMismatch(column.name.clone()))?;
        let cells = values
            .iter()
            .map(|value| cast_cell(column, value))
            .collect::<Result<Vec<String>, UpsertError>>()?;
        rendered.push(cells);
    }

    Ok((0..rows).map(|row| rendered.iter().map(|cells| cells[row].clone()).collect()).collect())
}

/// Serializes records to a headerless CSV buffer, quoting non-numeric fields,
/// then strips the `,""` artifact an empty cell leaves behind so COPY reads
/// it as NULL.
fn render_csv_buffer(records: &[Vec<String>]) -> Result<String, UpsertError> {
    let mut raw: Vec<u8> = Vec::new();
    {
        let mut writer = WriterBuilder::new()
            .has_headers(false)
            .quote_style(QuoteStyle::NonNumeric)
            .from_writer(&mut raw);
        for record in records {
            writer.write_record(record)?;
        }
        writer.flush().map_err(csv::Error::from)?;
    }
    Ok(strip_empty_quoted_fields(&String::from_utf8_lossy(&raw)))
}

/// Rewrites the quoted empty fields the writer emits (`""`) as truly empty
/// fields so COPY reads them as NULL. Field boundaries are tracked through
/// quote state, so commas and newlines inside quoted cells are untouched.
fn strip_empty_quoted_fields(buffer: &str) -> String {
    let bytes = buffer.as_bytes();
    let mut out = String::with_capacity(buffer.len());
    let mut i = 0;
    let mut at_field_start = true;
    while i < bytes.len() {
        if at_field_start && bytes[i] == b'"' {
            // consume the whole quoted field, "" inside is an escaped quote
            let start = i;
            i += 1;
            while i < bytes.len() {
                if bytes[i] == b'"' {
                    if bytes.get(i + 1) == Some(&b'"') {
                        i += 2;
                    } else {
                        i += 1;
                        break;
                    }
                } else {
                    i += 1;
                }
            }
            if &buffer[start..i] != "\"\"" {
                out.push_str(&buffer[start..i]);
            }
            at_field_start = false;
        } else {
            at_field_start = matches!(bytes[i], b',' | b'\n');
            let mut next = i + 1;
            while next < bytes.len() && !buffer.is_char_boundary(next) {
                next += 1;
            }
            out.push_str(&buffer[i..next]);
            i = next;
        }
    }
    out
}

fn merge_sql(
    qualified: &str,
    staging: &str,
    columns: &[String],
    pk_constraint: Option<&str>,
) -> String {
    let column_list = columns.join(", ");
    match pk_constraint {
        Some(pk) => {
            let updates = columns
                .iter()
                .map(|column| format!("{column} = EXCLUDED.{column}"))
                .collect::<Vec<_>>()
                .join(", ");
            format!(
                "INSERT INTO {qualified} ({column_list}) SELECT * FROM {staging} \
                 ON CONFLICT ON CONSTRAINT {pk} DO UPDATE SET {updates}"
            )
        }
        None => format!("INSERT INTO {qualified} ({column_list}) SELECT * FROM {staging}"),
    }
}

/// Reconciles a payload against an existing table: bulk-loads it into a
/// session-temporary staging table via COPY and merges it into the target
/// with `ON CONFLICT ON CONSTRAINT <pk> DO UPDATE`, all inside one
/// transaction. Tables without a primary key degrade to a plain append.
///
/// The batch is atomic: any failure propagates uncommitted and the staging
/// table dies with the transaction.
pub async fn upsert_bulk(
    client: &PostgresClient,
    table_name: &str,
    payload: &Payload,
) -> Result<(), UpsertError> {
    if payload.is_empty() {
        info!("Payload for {} is empty, skipping upsert", table_name);
        return Ok(());
    }

    let (schema, table) = split_table_name(table_name);
    let qualified = format!("{schema}.{table}");

    let mut conn = client.connection().await?;
    let transaction = conn.transaction().await.map_err(PostgresError::PgError)?;

    let columns = fetch_table_columns(&transaction, &schema, &table).await?;
    if columns.is_empty() {
        return Err(UpsertError::UnknownTable(qualified));
    }
    let writable: Vec<TableColumn> = columns.iter().filter(|c| c.writable()).cloned().collect();

    let pk_columns = fetch_primary_key_columns(&transaction, &schema, &table).await?;
    let pk_constraint = fetch_primary_key_constraint(&transaction, &qualified).await?;

    let records = conform_payload(&qualified, &writable, &pk_columns, payload)?;
    let buffer = render_csv_buffer(&records)?;

    let staging = format!("{}_staging_{}", table, generate_random_id(6));
    let mut staging_sql = format!("CREATE TEMPORARY TABLE {staging} (LIKE {qualified}) ON COMMIT DROP;");
    for column in &columns {
        if !column.writable() {
            staging_sql.push_str(&format!(
                " ALTER TABLE {} DROP COLUMN IF EXISTS {};",
                staging,
                quote_ident(&column.name)
            ));
        }
    }
    transaction.batch_execute(&staging_sql).await.map_err(PostgresError::PgError)?;

    let column_list: Vec<String> = writable.iter().map(|c| quote_ident(&c.name)).collect();
    let copy_statement =
        format!("COPY {} ({}) FROM STDIN WITH (FORMAT csv)", staging, column_list.join(", "));
    debug!("Bulk copy statement: {}", copy_statement);

    let sink = transaction.copy_in(copy_statement.as_str()).await.map_err(PostgresError::PgError)?;
    pin_mut!(sink);
    sink.send(Bytes::from(buffer.into_bytes())).await.map_err(PostgresError::PgError)?;
    sink.finish().await.map_err(PostgresError::PgError)?;

    if pk_constraint.is_none() {
        warn!("No primary key on {}, falling back to a plain insert", qualified);
    }
    let merge = merge_sql(&qualified, &staging, &column_list, pk_constraint.as_deref());
    debug!("Merge statement: {}", merge);
    let merged = transaction.execute(merge.as_str(), &[]).await.map_err(PostgresError::PgError)?;

    transaction.commit().await.map_err(PostgresError::PgError)?;
    info!("Upserted {} rows into {}", merged, qualified);
    Ok(())
}
