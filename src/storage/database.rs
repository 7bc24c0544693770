// Database connection manager for the local SQLite metadata store
// Handles data directory resolution, schema setup and serialized connection access

use rusqlite::{Connection, Result as SqliteResult};
use std::path::PathBuf;
use std::sync::Mutex;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Failed to get app data directory")]
    AppDataDir,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("instance {0} not found")]
    NotFound(String),
    #[error("instance {0} already exists")]
    AlreadyExists(String),
    #[error("metadata store lock poisoned")]
    LockPoisoned,
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Database manager for the local SQLite metadata store
pub struct DatabaseManager {
    connection: Mutex<Connection>,
    db_path: PathBuf,
}

impl DatabaseManager {
    /// Open (or create) the store at the given path
    pub fn new(db_path: PathBuf) -> StorageResult<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let connection = Connection::open(&db_path)?;
        connection.execute_batch("PRAGMA foreign_keys = ON;")?;

        let manager = Self {
            connection: Mutex::new(connection),
            db_path,
        };

        manager.init_schema()?;
        tracing::debug!("[Storage] Opened metadata store at {}", manager.db_path.display());

        Ok(manager)
    }

    pub fn db_path(&self) -> &PathBuf {
        &self.db_path
    }

    fn init_schema(&self) -> StorageResult<()> {
        self.with_connection(|conn| {
            conn.execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS instance_registry (
                    id TEXT PRIMARY KEY,
                    name TEXT NOT NULL UNIQUE,
                    database_name TEXT NOT NULL,
                    description TEXT,
                    creator_username TEXT NOT NULL DEFAULT '',
                    status TEXT NOT NULL DEFAULT 'active',
                    created_at TEXT NOT NULL DEFAULT (datetime('now')),
                    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE INDEX IF NOT EXISTS idx_instance_registry_status ON instance_registry(status);
                "#,
            )
        })
    }

    /// Execute a function with database connection access
    pub fn with_connection<F, T>(&self, f: F) -> StorageResult<T>
    where
        F: FnOnce(&Connection) -> SqliteResult<T>,
    {
        let conn = self
            .connection
            .lock()
            .map_err(|_| StorageError::LockPoisoned)?;
        f(&conn).map_err(StorageError::from)
    }
}

/// Default store location in the platform data directory
pub fn get_default_db_path() -> StorageResult<PathBuf> {
    let proj_dirs = directories::ProjectDirs::from("io", "psql-registry", "psql-registry")
        .ok_or(StorageError::AppDataDir)?;

    Ok(proj_dirs.data_dir().join("registry.db"))
}
