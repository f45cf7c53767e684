use serde_json::{Map, Value as JsonValue};

use super::{Payload, PayloadError, Value};

/// Flattens keys whose values are lists of objects into `key_subkey` columns,
/// the shape vendor reports use for nested per-marketplace breakdowns. Subkeys
/// named in `exclude_keys` are skipped; everything else passes through.
pub fn flatten_json_list_values(
    object: &Map<String, JsonValue>,
    exclude_keys: &[&str],
) -> Map<String, JsonValue> {
    let mut flattened = Map::new();

    for (key, value) in object {
        match value.as_array() {
            Some(items) if items.first().is_some_and(|i| i.is_object()) => {
                for item in items {
                    let Some(nested) = item.as_object() else { continue };
                    for (nested_key, nested_value) in nested {
                        if exclude_keys.contains(&nested_key.as_str()) {
                            continue;
                        }
                        flattened.insert(format!("{key}_{nested_key}"), nested_value.clone());
                    }
                }
            }
            _ => {
                flattened.insert(key.clone(), value.clone());
            }
        }
    }

    flattened
}

/// Converts an array of JSON objects into a payload. Columns are the union of
/// keys in first-seen order; rows missing a key hold null.
pub fn json_rows_to_payload(rows: &[JsonValue]) -> Result<Payload, PayloadError> {
    let mut names: Vec<String> = Vec::new();
    let mut objects: Vec<&Map<String, JsonValue>> = Vec::with_capacity(rows.len());

    for row in rows {
        let object = row
            .as_object()
            .ok_or_else(|| PayloadError::NotRows(row.to_string()))?;
        for key in object.keys() {
            if !names.iter().any(|n| n == key) {
                names.push(key.clone());
            }
        }
        objects.push(object);
    }

    let mut payload = Payload::new();
    for name in names {
        let values = objects
            .iter()
            .map(|object| object.get(&name).map(Value::from_json).unwrap_or(Value::Null))
            .collect();
        payload.push_column(name, values)?;
    }
    Ok(payload)
}
