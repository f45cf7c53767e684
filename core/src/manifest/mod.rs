pub mod core;
pub mod source;
pub mod storage;
pub mod yaml;
