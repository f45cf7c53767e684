use std::path::PathBuf;

use marketsync::{
    create_table, install_updated_at_trigger, payload::read_csv_payload, CreateTableOptions,
    PostgresClient,
};

use crate::console::{print_error_message, print_success_message};

pub async fn handle_table_create_command(
    file: PathBuf,
    table: String,
    keys: Option<Vec<String>>,
    created_at: bool,
    updated_at: bool,
    drop_if_exists: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let payload = read_csv_payload(&file).map_err(|e| {
        print_error_message(&format!("Could not read payload from {}: {}", file.display(), e));
        e
    })?;

    let client = PostgresClient::new().await.map_err(|e| {
        print_error_message(&format!("Could not connect to postgres: {}", e));
        e
    })?;

    if drop_if_exists {
        client.batch_execute(&format!("DROP TABLE IF EXISTS {table};")).await.map_err(|e| {
            print_error_message(&format!("Could not drop table {}: {}", table, e));
            e
        })?;
    }

    let keys = keys.map(|keys| format!("PRIMARY KEY ({})", keys.join(", ")));
    let options = CreateTableOptions { created_at, updated_at, keys };

    create_table(&client, &payload, &table, &options).await.map_err(|e| {
        print_error_message(&format!("Could not create table {}: {}", table, e));
        e
    })?;

    if updated_at {
        install_updated_at_trigger(&client, &table).await.map_err(|e| {
            print_error_message(&format!(
                "Could not install the updated_at trigger on {}: {}",
                table, e
            ));
            e
        })?;
    }

    print_success_message(&format!("Created table {}.", table));
    Ok(())
}
