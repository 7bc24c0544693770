// Diagnostic Operations
// DiagnosticsClient implementation for InstanceClient: version gating, SQL selection and row mapping

use tokio_postgres::Row;

use crate::db::client::InstanceClient;
use crate::db::queries::*;
use crate::db::traits::{ClientState, DiagnosticError, DiagnosticsClient};
use crate::db::types::{
    ActiveQuery, BufferAllocation, CacheHitRate, CheckpointCounters, CheckpointStats,
    ConnectionSummary, DatabaseOverview, DatabaseSize, IndexStats, LockInfo, SettingInfo,
    SlowQuery, TableInfo, WalActivity,
};
use crate::db::version::ServerVersion;

pub const DEFAULT_TABLES_LIMIT: i64 = 200;
pub const DEFAULT_INDEX_LIMIT: i64 = 100;
pub const DEFAULT_SLOW_QUERIES_LIMIT: i64 = 20;
pub const DEFAULT_MIN_DURATION_SECS: i64 = 5;

/// Non-positive limits fall back to the action default
pub fn effective_limit(limit: i64, default: i64) -> i64 {
    if limit <= 0 {
        default
    } else {
        limit
    }
}

/// Negative thresholds fall back to the default; zero lists everything running
pub fn effective_min_duration(secs: i64) -> i64 {
    if secs < 0 {
        DEFAULT_MIN_DURATION_SECS
    } else {
        secs
    }
}

/// pg_stat_checkpointer on 17+, pg_stat_bgwriter before
pub(crate) fn checkpoint_stats_query(version: &ServerVersion) -> &'static str {
    if version.supports_checkpointer_view() {
        SELECT_CHECKPOINTS_CHECKPOINTER
    } else {
        SELECT_CHECKPOINTS_LEGACY
    }
}

pub(crate) fn slow_queries_query(version: &ServerVersion) -> &'static str {
    if version.supports_exec_time_columns() {
        SELECT_SLOW_QUERIES
    } else {
        SELECT_SLOW_QUERIES_LEGACY
    }
}

/// Maps one result row into a diagnostic record
trait FromPgRow: Sized {
    fn from_row(row: &Row) -> Result<Self, tokio_postgres::Error>;
}

fn map_rows<T: FromPgRow>(rows: &[Row], context: &str) -> Result<Vec<T>, DiagnosticError> {
    rows.iter()
        .map(T::from_row)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| DiagnosticError::query(context, e))
}

impl FromPgRow for DatabaseOverview {
    fn from_row(row: &Row) -> Result<Self, tokio_postgres::Error> {
        Ok(Self {
            xact_commit: row.try_get("xact_commit")?,
            xact_rollback: row.try_get("xact_rollback")?,
            blks_read: row.try_get("blks_read")?,
            blks_hit: row.try_get("blks_hit")?,
            tup_returned: row.try_get("tup_returned")?,
            tup_fetched: row.try_get("tup_fetched")?,
            tup_inserted: row.try_get("tup_inserted")?,
            tup_updated: row.try_get("tup_updated")?,
            tup_deleted: row.try_get("tup_deleted")?,
            conflicts: row.try_get("conflicts")?,
            temp_files: row.try_get("temp_files")?,
            temp_bytes: row.try_get("temp_bytes")?,
            deadlocks: row.try_get("deadlocks")?,
            blk_read_time: row.try_get("blk_read_time")?,
            blk_write_time: row.try_get("blk_write_time")?,
        })
    }
}

impl FromPgRow for CheckpointCounters {
    fn from_row(row: &Row) -> Result<Self, tokio_postgres::Error> {
        Ok(Self {
            checkpoints_timed: row.try_get("checkpoints_timed")?,
            checkpoints_req: row.try_get("checkpoints_req")?,
            checkpoint_write_time: row.try_get("checkpoint_write_time")?,
            checkpoint_sync_time: row.try_get("checkpoint_sync_time")?,
        })
    }
}

impl FromPgRow for BufferAllocation {
    fn from_row(row: &Row) -> Result<Self, tokio_postgres::Error> {
        Ok(Self {
            buffers_checkpoint: row.try_get("buffers_checkpoint")?,
            buffers_backend: row.try_get("buffers_backend")?,
            buffers_backend_fsync: row.try_get("buffers_backend_fsync")?,
            buffers_alloc: row.try_get("buffers_alloc")?,
        })
    }
}

impl FromPgRow for WalActivity {
    fn from_row(row: &Row) -> Result<Self, tokio_postgres::Error> {
        Ok(Self {
            wal_records: row.try_get("wal_records")?,
            wal_fpi: row.try_get("wal_fpi")?,
            wal_bytes: row.try_get("wal_bytes")?,
            wal_buffers_full: row.try_get("wal_buffers_full")?,
            stats_reset: row.try_get("stats_reset")?,
        })
    }
}

impl FromPgRow for TableInfo {
    fn from_row(row: &Row) -> Result<Self, tokio_postgres::Error> {
        Ok(Self {
            schema_name: row.try_get("schema_name")?,
            table_name: row.try_get("table_name")?,
            total_bytes: row.try_get("total_bytes")?,
            n_live_tup: row.try_get("n_live_tup")?,
            n_dead_tup: row.try_get("n_dead_tup")?,
            seq_scan: row.try_get("seq_scan")?,
            idx_scan: row.try_get("idx_scan")?,
            last_vacuum: row.try_get("last_vacuum")?,
            last_autovacuum: row.try_get("last_autovacuum")?,
            last_analyze: row.try_get("last_analyze")?,
            last_autoanalyze: row.try_get("last_autoanalyze")?,
        })
    }
}

impl FromPgRow for LockInfo {
    fn from_row(row: &Row) -> Result<Self, tokio_postgres::Error> {
        let blocking_pids: Option<Vec<i32>> = row.try_get("blocking_pids")?;
        Ok(Self {
            pid: row.try_get("pid")?,
            username: row.try_get("username")?,
            database: row.try_get("database")?,
            wait_event_type: row.try_get("wait_event_type")?,
            wait_event: row.try_get("wait_event")?,
            state: row.try_get("state")?,
            query_start: row.try_get("query_start")?,
            blocking_pids: blocking_pids.unwrap_or_default(),
        })
    }
}

impl FromPgRow for SettingInfo {
    fn from_row(row: &Row) -> Result<Self, tokio_postgres::Error> {
        let pending_restart: Option<bool> = row.try_get("pending_restart")?;
        Ok(Self {
            name: row.try_get("name")?,
            setting: row.try_get("setting")?,
            unit: row.try_get("unit")?,
            source: row.try_get("source")?,
            pending_restart: pending_restart.unwrap_or(false),
        })
    }
}

impl FromPgRow for IndexStats {
    fn from_row(row: &Row) -> Result<Self, tokio_postgres::Error> {
        Ok(Self {
            schema_name: row.try_get("schema_name")?,
            table_name: row.try_get("table_name")?,
            index_name: row.try_get("index_name")?,
            idx_scan: row.try_get("idx_scan")?,
            idx_tup_read: row.try_get("idx_tup_read")?,
            idx_tup_fetch: row.try_get("idx_tup_fetch")?,
            size_bytes: row.try_get("size_bytes")?,
        })
    }
}

impl FromPgRow for ActiveQuery {
    fn from_row(row: &Row) -> Result<Self, tokio_postgres::Error> {
        Ok(Self {
            pid: row.try_get("pid")?,
            username: row.try_get("username")?,
            database: row.try_get("database")?,
            state: row.try_get("state")?,
            duration_seconds: row.try_get("duration_seconds")?,
            wait_event_type: row.try_get("wait_event_type")?,
            wait_event: row.try_get("wait_event")?,
            query: row.try_get("query")?,
        })
    }
}

impl FromPgRow for ConnectionSummary {
    fn from_row(row: &Row) -> Result<Self, tokio_postgres::Error> {
        Ok(Self {
            total_connections: row.try_get("total_connections")?,
            active: row.try_get("active")?,
            idle: row.try_get("idle")?,
            idle_in_transaction: row.try_get("idle_in_transaction")?,
            waiting: row.try_get("waiting")?,
            max_connections: row.try_get("max_connections")?,
        })
    }
}

impl FromPgRow for SlowQuery {
    fn from_row(row: &Row) -> Result<Self, tokio_postgres::Error> {
        let query: Option<String> = row.try_get("query")?;
        Ok(Self {
            query: query.unwrap_or_default(),
            calls: row.try_get("calls")?,
            total_exec_time: row.try_get("total_exec_time")?,
            mean_exec_time: row.try_get("mean_exec_time")?,
            stddev_exec_time: row.try_get("stddev_exec_time")?,
            rows: row.try_get("rows")?,
            cache_hit_percent: row.try_get("cache_hit_percent")?,
        })
    }
}

impl FromPgRow for DatabaseSize {
    fn from_row(row: &Row) -> Result<Self, tokio_postgres::Error> {
        Ok(Self {
            database_name: row.try_get("database_name")?,
            size_bytes: row.try_get("size_bytes")?,
        })
    }
}

impl InstanceClient {
    async fn extension_installed(&self, name: &str) -> Result<bool, DiagnosticError> {
        let conn = self.pool()?.get().await?;
        let row = conn
            .query_one(SELECT_EXTENSION_INSTALLED, &[&name])
            .await
            .map_err(|e| DiagnosticError::query("check extension", e))?;
        row.try_get(0)
            .map_err(|e| DiagnosticError::query("check extension", e))
    }
}

#[async_trait::async_trait]
impl DiagnosticsClient for InstanceClient {
    fn instance_name(&self) -> &str {
        self.name()
    }

    async fn connect(&self) -> Result<(), DiagnosticError> {
        self.establish().await
    }

    async fn state(&self) -> ClientState {
        self.current_state().await
    }

    async fn database_overview(&self, db_name: &str) -> Result<DatabaseOverview, DiagnosticError> {
        self.version().await?;
        let conn = self.pool()?.get().await?;

        let row = conn
            .query_opt(SELECT_DATABASE_OVERVIEW, &[&db_name])
            .await
            .map_err(|e| DiagnosticError::query("get database overview", e))?
            .ok_or_else(|| DiagnosticError::NotFound(db_name.to_string()))?;

        DatabaseOverview::from_row(&row).map_err(|e| DiagnosticError::query("scan database overview", e))
    }

    async fn cache_hit_rate(&self, db_name: Option<&str>) -> Result<CacheHitRate, DiagnosticError> {
        self.version().await?;
        let conn = self.pool()?.get().await?;

        let row = match db_name {
            Some(db_name) => conn
                .query_opt(SELECT_CACHE_HIT_RATE_DB, &[&db_name])
                .await
                .map_err(|e| DiagnosticError::query("get cache hit rate", e))?
                .ok_or_else(|| DiagnosticError::NotFound(db_name.to_string()))?,
            None => conn
                .query_one(SELECT_CACHE_HIT_RATE_GLOBAL, &[])
                .await
                .map_err(|e| DiagnosticError::query("get cache hit rate", e))?,
        };

        let hit_rate: Option<f64> = row
            .try_get("hit_rate")
            .map_err(|e| DiagnosticError::query("scan cache hit rate", e))?;
        Ok(CacheHitRate { hit_rate })
    }

    async fn checkpoint_stats(&self) -> Result<CheckpointStats, DiagnosticError> {
        let version = self.version().await?;
        let conn = self.pool()?.get().await?;

        let row = conn
            .query_one(checkpoint_stats_query(&version), &[])
            .await
            .map_err(|e| DiagnosticError::query("get checkpoint stats", e))?;

        let scan = |e: tokio_postgres::Error| DiagnosticError::query("scan checkpoint stats", e);
        let counters = CheckpointCounters::from_row(&row).map_err(scan)?;
        if version.supports_checkpointer_view() {
            Ok(CheckpointStats::Modern { counters })
        } else {
            Ok(CheckpointStats::Legacy {
                counters,
                buffers: BufferAllocation::from_row(&row).map_err(scan)?,
            })
        }
    }

    async fn wal_activity(&self) -> Result<WalActivity, DiagnosticError> {
        let version = self.version().await?;
        version.require(version.supports_wal_stats(), "WAL statistics", "14")?;

        let conn = self.pool()?.get().await?;
        let row = conn
            .query_one(SELECT_WAL_ACTIVITY, &[])
            .await
            .map_err(|e| DiagnosticError::query("get WAL activity", e))?;

        WalActivity::from_row(&row).map_err(|e| DiagnosticError::query("scan WAL activity", e))
    }

    async fn tables_info(&self, limit: i64) -> Result<Vec<TableInfo>, DiagnosticError> {
        self.version().await?;
        let limit = effective_limit(limit, DEFAULT_TABLES_LIMIT);
        let conn = self.pool()?.get().await?;

        let rows = conn
            .query(SELECT_TABLES_INFO, &[&limit])
            .await
            .map_err(|e| DiagnosticError::query("get tables info", e))?;
        map_rows(&rows, "scan tables info")
    }

    async fn locking_info(&self, db_name: &str) -> Result<Vec<LockInfo>, DiagnosticError> {
        let version = self.version().await?;
        version.require(
            version.supports_blocking_pid_function(),
            "lock blocking analysis",
            "9.6",
        )?;

        let conn = self.pool()?.get().await?;
        let rows = conn
            .query(SELECT_LOCKING_NOW, &[&db_name])
            .await
            .map_err(|e| DiagnosticError::query("get locking info", e))?;
        map_rows(&rows, "scan locking info")
    }

    async fn changed_settings(&self) -> Result<Vec<SettingInfo>, DiagnosticError> {
        self.version().await?;
        let conn = self.pool()?.get().await?;

        let rows = conn
            .query(SELECT_CHANGED_SETTINGS, &[])
            .await
            .map_err(|e| DiagnosticError::query("get changed settings", e))?;
        map_rows(&rows, "scan changed settings")
    }

    async fn index_stats(&self, limit: i64) -> Result<Vec<IndexStats>, DiagnosticError> {
        self.version().await?;
        let limit = effective_limit(limit, DEFAULT_INDEX_LIMIT);
        let conn = self.pool()?.get().await?;

        let rows = conn
            .query(SELECT_INDEX_STATS, &[&limit])
            .await
            .map_err(|e| DiagnosticError::query("get index stats", e))?;
        map_rows(&rows, "scan index stats")
    }

    async fn active_queries(
        &self,
        db_name: &str,
        min_duration_secs: i64,
    ) -> Result<Vec<ActiveQuery>, DiagnosticError> {
        self.version().await?;
        let threshold = effective_min_duration(min_duration_secs) as f64;
        let conn = self.pool()?.get().await?;

        let rows = conn
            .query(SELECT_ACTIVE_QUERIES, &[&db_name, &threshold])
            .await
            .map_err(|e| DiagnosticError::query("get active queries", e))?;
        map_rows(&rows, "scan active queries")
    }

    async fn connection_stats(&self) -> Result<ConnectionSummary, DiagnosticError> {
        self.version().await?;
        let conn = self.pool()?.get().await?;

        let row = conn
            .query_one(SELECT_CONNECTION_STATS, &[])
            .await
            .map_err(|e| DiagnosticError::query("get connection stats", e))?;
        ConnectionSummary::from_row(&row).map_err(|e| DiagnosticError::query("scan connection stats", e))
    }

    async fn slow_queries(&self, limit: i64) -> Result<Vec<SlowQuery>, DiagnosticError> {
        let version = self.version().await?;

        if !self.extension_installed(STAT_STATEMENTS_EXTENSION).await? {
            return Err(DiagnosticError::ExtensionMissing(
                STAT_STATEMENTS_EXTENSION.to_string(),
            ));
        }

        let sql = slow_queries_query(&version);
        let limit = effective_limit(limit, DEFAULT_SLOW_QUERIES_LIMIT);
        let conn = self.pool()?.get().await?;

        let rows = conn
            .query(sql, &[&limit])
            .await
            .map_err(|e| DiagnosticError::query("get slow queries", e))?;
        map_rows(&rows, "scan slow queries")
    }

    async fn database_sizes(&self) -> Result<Vec<DatabaseSize>, DiagnosticError> {
        self.version().await?;
        let conn = self.pool()?.get().await?;

        let rows = conn
            .query(SELECT_DATABASE_SIZES, &[])
            .await
            .map_err(|e| DiagnosticError::query("get database sizes", e))?;
        map_rows(&rows, "scan database sizes")
    }
}
