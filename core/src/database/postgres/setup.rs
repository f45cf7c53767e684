use tracing::{debug, info};

use crate::{
    database::postgres::client::{
        split_table_name, PostgresClient, PostgresConnectionError, PostgresError,
    },
    manifest::core::Manifest,
};

#[derive(thiserror::Error, Debug)]
pub enum SetupPostgresError {
    #[error("{0}")]
    PostgresConnection(#[from] PostgresConnectionError),

    #[error("{0}")]
    PostgresError(#[from] PostgresError),
}

/// The function every managed table's BEFORE UPDATE trigger calls. The merge
/// path never touches `updated_at` itself, the trigger owns it.
const SET_UPDATED_AT_FUNCTION: &str = r#"
CREATE OR REPLACE FUNCTION set_updated_at() RETURNS trigger AS $$
BEGIN
    NEW.updated_at = CURRENT_TIMESTAMP;
    RETURN NEW;
END;
$$ LANGUAGE plpgsql;
"#;

pub fn updated_at_trigger_sql(table_name: &str) -> String {
    let (schema, table) = split_table_name(table_name);
    format!(
        "DROP TRIGGER IF EXISTS {table}_set_updated_at ON {schema}.{table}; \
         CREATE TRIGGER {table}_set_updated_at BEFORE UPDATE ON {schema}.{table} \
         FOR EACH ROW EXECUTE FUNCTION set_updated_at();"
    )
}

/// Attaches the `updated_at` audit trigger to a table, replacing any previous
/// install so the call is safe to repeat.
pub async fn install_updated_at_trigger(
    client: &PostgresClient,
    table_name: &str,
) -> Result<(), PostgresError> {
    client.batch_execute(SET_UPDATED_AT_FUNCTION).await?;
    let sql = updated_at_trigger_sql(table_name);
    debug!("{}", sql);
    client.batch_execute(&sql).await?;
    Ok(())
}

/// Connects to postgres and prepares everything the manifest asks for:
/// schemas, the shared audit trigger function and a trigger per managed
/// table.
pub async fn setup_postgres(manifest: &Manifest) -> Result<PostgresClient, SetupPostgresError> {
    info!("Setting up postgres for {}", manifest.name);
    let client = PostgresClient::new().await?;

    for schema in manifest.storage.postgres_schemas() {
        client.batch_execute(&format!("CREATE SCHEMA IF NOT EXISTS {schema};")).await?;
    }

    let tables = manifest.storage.postgres_tables();
    if !tables.is_empty() {
        client.batch_execute(SET_UPDATED_AT_FUNCTION).await?;
        for table in &tables {
            let sql = updated_at_trigger_sql(table);
            debug!("{}", sql);
            client.batch_execute(&sql).await?;
        }
        info!("Installed updated_at triggers on {} tables", tables.len());
    }

    Ok(client)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_updated_at_trigger_sql_qualifies_table() {
        let sql = updated_at_trigger_sql("finance.rates");
        assert!(sql.contains("DROP TRIGGER IF EXISTS rates_set_updated_at ON finance.rates;"));
        assert!(sql.contains("CREATE TRIGGER rates_set_updated_at BEFORE UPDATE ON finance.rates"));
        assert!(sql.contains("EXECUTE FUNCTION set_updated_at()"));
    }

    #[test]
    fn test_updated_at_trigger_sql_defaults_schema() {
        let sql = updated_at_trigger_sql("inventory");
        assert!(sql.contains("ON public.inventory"));
    }
}
