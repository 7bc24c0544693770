// Local persistence for instance metadata
// This module handles the sqlite-backed list of registered PostgreSQL instances

pub mod database;
pub mod instances;

pub use database::{get_default_db_path, DatabaseManager, StorageError, StorageResult};
pub use instances::{CreateInstanceInput, Instance, STATUS_ACTIVE};
