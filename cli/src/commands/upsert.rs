use std::path::PathBuf;

use marketsync::{payload::read_csv_payload, upsert_bulk, PostgresClient};

use crate::console::{print_error_message, print_success_message, print_warn_message};

pub async fn handle_upsert_command(
    file: PathBuf,
    table: String,
) -> Result<(), Box<dyn std::error::Error>> {
    let payload = read_csv_payload(&file).map_err(|e| {
        print_error_message(&format!("Could not read payload from {}: {}", file.display(), e));
        e
    })?;

    if payload.is_empty() {
        print_warn_message(&format!("{} holds no rows, nothing to upsert.", file.display()));
        return Ok(());
    }

    let client = PostgresClient::new().await.map_err(|e| {
        print_error_message(&format!("Could not connect to postgres: {}", e));
        e
    })?;

    upsert_bulk(&client, &table, &payload).await.map_err(|e| {
        print_error_message(&format!("Could not upsert into {}: {}", table, e));
        e
    })?;

    print_success_message(&format!("Upserted {} rows into {}.", payload.rows(), table));
    Ok(())
}
