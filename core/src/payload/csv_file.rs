use std::{fs::File, io::Read, path::Path};

use csv::ReaderBuilder;
use tracing::debug;

use super::{Payload, PayloadError, Value};

/// Reads a CSV file into a column-oriented payload. Header names are kept raw;
/// the schema synthesizer and upsert engine standardize them at their own
/// boundaries.
pub fn read_csv_payload(path: &Path) -> Result<Payload, PayloadError> {
    debug!("Reading csv payload from {}", path.display());
    let file = File::open(path)?;
    csv_payload_from_reader(file)
}

pub fn csv_payload_from_reader<R: Read>(reader: R) -> Result<Payload, PayloadError> {
    let mut reader = ReaderBuilder::new().has_headers(true).from_reader(reader);

    let headers: Vec<String> = reader.headers()?.iter().map(|h| h.to_string()).collect();
    let mut columns: Vec<Vec<Value>> = vec![Vec::new(); headers.len()];

    for record in reader.records() {
        let record = record?;
        for (i, cell) in record.iter().enumerate() {
            if let Some(column) = columns.get_mut(i) {
                column.push(Value::sniff(cell));
            }
        }
    }

    let mut payload = Payload::new();
    for (header, values) in headers.into_iter().zip(columns) {
        payload.push_column(header, values)?;
    }
    Ok(payload)
}
