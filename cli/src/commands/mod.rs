pub mod fetch;
pub mod run;
pub mod table;
pub mod upsert;
