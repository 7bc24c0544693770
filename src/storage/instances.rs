// Instance data model and storage operations
// Registered PostgreSQL instances; the registry reads these, only the manager writes them

use rusqlite::{params, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::database::{DatabaseManager, StorageError, StorageResult};

pub const STATUS_ACTIVE: &str = "active";

/// A registered PostgreSQL instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    pub id: String,
    pub name: String,
    pub database_name: String,
    pub description: Option<String>,
    pub creator_username: String,
    pub status: String,
    pub created_at: String,
    pub updated_at: String,
}

impl Instance {
    /// Unsaved active instance; the store assigns the real id and timestamps
    pub fn new(
        name: impl Into<String>,
        database_name: impl Into<String>,
        description: Option<String>,
        creator_username: impl Into<String>,
    ) -> Self {
        Self {
            id: String::new(),
            name: name.into(),
            database_name: database_name.into(),
            description,
            creator_username: creator_username.into(),
            status: STATUS_ACTIVE.to_string(),
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == STATUS_ACTIVE
    }

    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            database_name: row.get(2)?,
            description: row.get(3)?,
            creator_username: row.get(4)?,
            status: row.get(5)?,
            created_at: row.get(6)?,
            updated_at: row.get(7)?,
        })
    }
}

/// Input for registering a new instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateInstanceInput {
    pub name: String,
    pub database_name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub creator_username: Option<String>,
}

const INSTANCE_COLUMNS: &str =
    "id, name, database_name, description, creator_username, status, created_at, updated_at";

impl DatabaseManager {
    /// Create a new instance row
    pub fn create_instance(&self, input: CreateInstanceInput) -> StorageResult<Instance> {
        if self.find_instance(&input.name)?.is_some() {
            return Err(StorageError::AlreadyExists(input.name));
        }

        let id = Uuid::new_v4().to_string();
        let creator = input.creator_username.unwrap_or_default();

        let inserted = self.with_connection(|conn| {
            conn.execute(
                r#"
                INSERT INTO instance_registry (
                    id, name, database_name, description, creator_username,
                    status, created_at, updated_at
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, datetime('now'), datetime('now'))
                "#,
                params![
                    id,
                    input.name,
                    input.database_name,
                    input.description,
                    creator,
                    STATUS_ACTIVE
                ],
            )
        });

        match inserted {
            Ok(_) => {}
            // Lost a race against a concurrent insert of the same name
            Err(StorageError::Sqlite(rusqlite::Error::SqliteFailure(err, _)))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                return Err(StorageError::AlreadyExists(input.name));
            }
            Err(e) => return Err(e),
        }

        tracing::info!("[Storage] Created instance {} ({})", input.name, id);
        self.get_instance_by_name(&input.name)
    }

    /// Get an instance by name, whatever its status
    pub fn get_instance_by_name(&self, name: &str) -> StorageResult<Instance> {
        self.find_instance(name)?
            .ok_or_else(|| StorageError::NotFound(name.to_string()))
    }

    fn find_instance(&self, name: &str) -> StorageResult<Option<Instance>> {
        self.with_connection(|conn| {
            conn.query_row(
                &format!("SELECT {} FROM instance_registry WHERE name = ?1", INSTANCE_COLUMNS),
                params![name],
                Instance::from_row,
            )
            .optional()
        })
    }

    /// All active instances ordered by name
    pub fn list_instances(&self) -> StorageResult<Vec<Instance>> {
        self.with_connection(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM instance_registry WHERE status = ?1 ORDER BY name",
                INSTANCE_COLUMNS
            ))?;
            let instances = stmt
                .query_map(params![STATUS_ACTIVE], Instance::from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(instances)
        })
    }

    /// Change an instance's lifecycle status; returns false if no such instance
    pub fn set_instance_status(&self, name: &str, status: &str) -> StorageResult<bool> {
        let rows_affected = self.with_connection(|conn| {
            conn.execute(
                "UPDATE instance_registry SET status = ?1, updated_at = datetime('now') WHERE name = ?2",
                params![status, name],
            )
        })?;

        if rows_affected > 0 {
            tracing::info!("[Storage] Instance {} is now {}", name, status);
        }
        Ok(rows_affected > 0)
    }
}
