// Diagnostics Client Traits
// Defines the error taxonomy and the seams between registry, router and live PostgreSQL clients

use std::sync::Arc;

use crate::db::types::{
    ActiveQuery, CacheHitRate, CheckpointStats, ConnectionSummary, DatabaseOverview, DatabaseSize,
    IndexStats, LockInfo, SettingInfo, SlowQuery, TableInfo, WalActivity,
};
use crate::db::version::ServerVersion;
use crate::storage::Instance;

/// Common diagnostics error type
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DiagnosticError {
    #[error("configuration for instance '{instance}' not found (missing {key})")]
    ConfigNotFound { instance: String, key: String },

    #[error("failed to create client for instance {instance}: {reason}")]
    ClientCreationFailed { instance: String, reason: String },

    #[error("failed to connect to instance {instance}: {reason}")]
    ConnectFailed { instance: String, reason: String },

    #[error("failed to query PostgreSQL version: {0}")]
    VersionQueryFailed(String),

    #[error("unable to parse version from: {0}")]
    VersionUnparsable(String),

    #[error("{feature} not supported in PostgreSQL {major}.{minor} (requires >= {required})")]
    UnsupportedOnVersion {
        feature: &'static str,
        required: &'static str,
        major: u32,
        minor: u32,
    },

    #[error("extension {0} is not installed")]
    ExtensionMissing(String),

    #[error("database {0} not found")]
    NotFound(String),

    #[error("client not found for instance: {0}")]
    ClientNotFound(String),

    #[error("unsupported action: {0}")]
    UnsupportedAction(String),

    #[error("version not detected, connect the client first")]
    VersionNotDetected,

    #[error("{0}")]
    QueryFailed(String),

    #[error("Pool error: {0}")]
    Pool(String),
}

impl DiagnosticError {
    /// Stable machine-readable error code
    pub fn kind(&self) -> &'static str {
        match self {
            DiagnosticError::ConfigNotFound { .. } => "config_not_found",
            DiagnosticError::ClientCreationFailed { .. } => "client_creation_failed",
            DiagnosticError::ConnectFailed { .. } => "connect_failed",
            DiagnosticError::VersionQueryFailed(_) => "version_query_failed",
            DiagnosticError::VersionUnparsable(_) => "version_unparsable",
            DiagnosticError::UnsupportedOnVersion { .. } => "unsupported_on_version",
            DiagnosticError::ExtensionMissing(_) => "extension_missing",
            DiagnosticError::NotFound(_) => "not_found",
            DiagnosticError::ClientNotFound(_) => "client_not_found",
            DiagnosticError::UnsupportedAction(_) => "unsupported_action",
            DiagnosticError::VersionNotDetected => "version_not_detected",
            DiagnosticError::QueryFailed(_) => "query_failed",
            DiagnosticError::Pool(_) => "pool_error",
        }
    }

    pub(crate) fn query(context: &str, err: impl std::fmt::Display) -> Self {
        DiagnosticError::QueryFailed(format!("failed to {}: {}", context, err))
    }
}

impl<E: std::error::Error + 'static> From<bb8::RunError<E>> for DiagnosticError {
    fn from(err: bb8::RunError<E>) -> Self {
        DiagnosticError::Pool(err.to_string())
    }
}

/// Lifecycle of an instance client
#[derive(Debug, Clone, PartialEq)]
pub enum ClientState {
    Created,
    Connecting,
    Ready(ServerVersion),
    Failed(String),
}

impl ClientState {
    pub fn is_ready(&self) -> bool {
        matches!(self, ClientState::Ready(_))
    }

    pub fn version(&self) -> Option<&ServerVersion> {
        match self {
            ClientState::Ready(version) => Some(version),
            _ => None,
        }
    }
}

/// Diagnostics client trait - one implementation talks to a live server,
/// tests substitute their own
#[async_trait::async_trait]
pub trait DiagnosticsClient: Send + Sync {
    /// Name of the instance this client serves
    fn instance_name(&self) -> &str;

    // --- Lifecycle ---
    /// Ping the server, detect and cache its version
    async fn connect(&self) -> Result<(), DiagnosticError>;

    /// Current lifecycle state
    async fn state(&self) -> ClientState;

    async fn is_ready(&self) -> bool {
        self.state().await.is_ready()
    }

    /// Cached server version
    async fn version(&self) -> Result<ServerVersion, DiagnosticError> {
        self.state()
            .await
            .version()
            .cloned()
            .ok_or(DiagnosticError::VersionNotDetected)
    }

    // --- Diagnostics ---
    async fn database_overview(&self, db_name: &str) -> Result<DatabaseOverview, DiagnosticError>;

    /// Global hit rate when `db_name` is `None`
    async fn cache_hit_rate(&self, db_name: Option<&str>) -> Result<CacheHitRate, DiagnosticError>;

    async fn checkpoint_stats(&self) -> Result<CheckpointStats, DiagnosticError>;

    async fn wal_activity(&self) -> Result<WalActivity, DiagnosticError>;

    async fn tables_info(&self, limit: i64) -> Result<Vec<TableInfo>, DiagnosticError>;

    async fn locking_info(&self, db_name: &str) -> Result<Vec<LockInfo>, DiagnosticError>;

    async fn changed_settings(&self) -> Result<Vec<SettingInfo>, DiagnosticError>;

    async fn index_stats(&self, limit: i64) -> Result<Vec<IndexStats>, DiagnosticError>;

    async fn active_queries(
        &self,
        db_name: &str,
        min_duration_secs: i64,
    ) -> Result<Vec<ActiveQuery>, DiagnosticError>;

    async fn connection_stats(&self) -> Result<ConnectionSummary, DiagnosticError>;

    async fn slow_queries(&self, limit: i64) -> Result<Vec<SlowQuery>, DiagnosticError>;

    async fn database_sizes(&self) -> Result<Vec<DatabaseSize>, DiagnosticError>;
}

/// Builds (but does not connect) a client for a registered instance
pub trait ClientFactory: Send + Sync {
    fn create_client(
        &self,
        instance: &Instance,
    ) -> Result<Arc<dyn DiagnosticsClient>, DiagnosticError>;
}
