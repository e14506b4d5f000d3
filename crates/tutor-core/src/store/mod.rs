pub mod cache_db;
pub mod schema;
pub mod snapshots;
