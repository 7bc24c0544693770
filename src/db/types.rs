// Diagnostic Result Types
// Row shapes returned by instance clients, serialized as the envelope's data payload

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Database-wide counters from pg_stat_database
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatabaseOverview {
    pub xact_commit: i64,
    pub xact_rollback: i64,
    pub blks_read: i64,
    pub blks_hit: i64,
    pub tup_returned: i64,
    pub tup_fetched: i64,
    pub tup_inserted: i64,
    pub tup_updated: i64,
    pub tup_deleted: i64,
    pub conflicts: i64,
    pub temp_files: i64,
    pub temp_bytes: i64,
    pub deadlocks: i64,
    pub blk_read_time: f64,
    pub blk_write_time: f64,
}

/// Buffer cache hit ratio; `None` when there were no block accesses at all
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheHitRate {
    pub hit_rate: Option<f64>,
}

/// Counters shared by both checkpoint views
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CheckpointCounters {
    pub checkpoints_timed: i64,
    pub checkpoints_req: i64,
    pub checkpoint_write_time: f64,
    pub checkpoint_sync_time: f64,
}

/// Buffer counters only pg_stat_bgwriter reports (PG <= 16)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BufferAllocation {
    pub buffers_checkpoint: i64,
    pub buffers_backend: i64,
    pub buffers_backend_fsync: i64,
    pub buffers_alloc: i64,
}

/// Checkpoint statistics, shaped by the server version
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum CheckpointStats {
    /// pg_stat_bgwriter
    Legacy {
        #[serde(flatten)]
        counters: CheckpointCounters,
        #[serde(flatten)]
        buffers: BufferAllocation,
    },
    /// pg_stat_checkpointer
    Modern {
        #[serde(flatten)]
        counters: CheckpointCounters,
    },
}

impl CheckpointStats {
    pub fn counters(&self) -> &CheckpointCounters {
        match self {
            CheckpointStats::Legacy { counters, .. } | CheckpointStats::Modern { counters } => {
                counters
            }
        }
    }

    pub fn buffers(&self) -> Option<&BufferAllocation> {
        match self {
            CheckpointStats::Legacy { buffers, .. } => Some(buffers),
            CheckpointStats::Modern { .. } => None,
        }
    }
}

/// pg_stat_wal (PG >= 14)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WalActivity {
    pub wal_records: i64,
    pub wal_fpi: i64,
    pub wal_bytes: i64,
    pub wal_buffers_full: i64,
    pub stats_reset: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableInfo {
    pub schema_name: String,
    pub table_name: String,
    pub total_bytes: i64,
    pub n_live_tup: Option<i64>,
    pub n_dead_tup: Option<i64>,
    pub seq_scan: Option<i64>,
    pub idx_scan: Option<i64>,
    pub last_vacuum: Option<DateTime<Utc>>,
    pub last_autovacuum: Option<DateTime<Utc>>,
    pub last_analyze: Option<DateTime<Utc>>,
    pub last_autoanalyze: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LockInfo {
    pub pid: i32,
    pub username: Option<String>,
    pub database: Option<String>,
    pub wait_event_type: Option<String>,
    pub wait_event: Option<String>,
    pub state: Option<String>,
    pub query_start: Option<DateTime<Utc>>,
    pub blocking_pids: Vec<i32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SettingInfo {
    pub name: String,
    pub setting: String,
    pub unit: Option<String>,
    pub source: String,
    pub pending_restart: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexStats {
    pub schema_name: String,
    pub table_name: String,
    pub index_name: String,
    pub idx_scan: Option<i64>,
    pub idx_tup_read: Option<i64>,
    pub idx_tup_fetch: Option<i64>,
    pub size_bytes: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActiveQuery {
    pub pid: i32,
    pub username: Option<String>,
    pub database: Option<String>,
    pub state: Option<String>,
    pub duration_seconds: Option<f64>,
    pub wait_event_type: Option<String>,
    pub wait_event: Option<String>,
    pub query: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConnectionSummary {
    pub total_connections: i32,
    pub active: i32,
    pub idle: i32,
    pub idle_in_transaction: i32,
    pub waiting: i32,
    pub max_connections: i32,
}

/// One pg_stat_statements entry
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SlowQuery {
    pub query: String,
    pub calls: i64,
    pub total_exec_time: f64,
    pub mean_exec_time: f64,
    pub stddev_exec_time: f64,
    pub rows: i64,
    pub cache_hit_percent: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatabaseSize {
    pub database_name: String,
    pub size_bytes: i64,
}
