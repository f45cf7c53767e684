// public
pub mod manifest;
pub mod payload;
pub mod sources;

mod database;
pub use database::postgres::{
    client::{connection_string, PostgresClient, PostgresConnectionError, PostgresError, ToSql},
    schema::{create_table, create_table_sql, CreateTableError, CreateTableOptions, SqlColumnType},
    setup::{install_updated_at_trigger, setup_postgres, SetupPostgresError},
    upsert::{upsert_bulk, UpsertError},
};

mod helpers;
pub use helpers::{generate_random_id, standardize, standardize_name};

mod logger;
pub use logger::{setup_info_logger, setup_logger};

pub use payload::{Payload, PayloadError, Value};

// export 3rd party dependencies
pub use rust_decimal::Decimal;
