pub mod client;
pub mod schema;
pub mod setup;
pub mod upsert;
