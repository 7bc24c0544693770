// Diagnostic SQL
// Statement text per action; version-specific variants sit side by side

pub const SELECT_VERSION: &str = "SELECT version()";

pub const SELECT_PING: &str = "SELECT 1";

/// Transaction, buffer, tuple and temp counters for one database.
/// blk_*_time stay 0 unless track_io_timing is on.
pub const SELECT_DATABASE_OVERVIEW: &str = r#"
SELECT
  xact_commit,
  xact_rollback,
  blks_read,
  blks_hit,
  tup_returned,
  tup_fetched,
  tup_inserted,
  tup_updated,
  tup_deleted,
  conflicts,
  temp_files,
  temp_bytes,
  deadlocks,
  blk_read_time,
  blk_write_time
FROM pg_stat_database
WHERE datname = $1
"#;

pub const SELECT_CACHE_HIT_RATE_GLOBAL: &str = r#"
SELECT
  CASE WHEN sum(blks_hit + blks_read) = 0 THEN NULL
       ELSE sum(blks_hit)::float8 / NULLIF(sum(blks_hit + blks_read), 0) END AS hit_rate
FROM pg_stat_database
WHERE datname NOT IN ('template0', 'template1')
"#;

pub const SELECT_CACHE_HIT_RATE_DB: &str = r#"
SELECT
  CASE WHEN (blks_hit + blks_read) = 0 THEN NULL
       ELSE blks_hit::float8 / NULLIF(blks_hit + blks_read, 0) END AS hit_rate
FROM pg_stat_database
WHERE datname = $1
"#;

/// PG <= 16: checkpoint counters share pg_stat_bgwriter with the buffer counters
pub const SELECT_CHECKPOINTS_LEGACY: &str = r#"
SELECT
  checkpoints_timed,
  checkpoints_req,
  checkpoint_write_time,
  checkpoint_sync_time,
  buffers_checkpoint,
  buffers_backend,
  buffers_backend_fsync,
  buffers_alloc
FROM pg_stat_bgwriter
"#;

/// PG >= 17
pub const SELECT_CHECKPOINTS_CHECKPOINTER: &str = r#"
SELECT
  num_timed      AS checkpoints_timed,
  num_requested  AS checkpoints_req,
  write_time     AS checkpoint_write_time,
  sync_time      AS checkpoint_sync_time
FROM pg_stat_checkpointer
"#;

/// PG >= 14. wal_bytes is numeric upstream.
pub const SELECT_WAL_ACTIVITY: &str = r#"
SELECT
  wal_records,
  wal_fpi,
  wal_bytes::int8 AS wal_bytes,
  wal_buffers_full,
  stats_reset
FROM pg_stat_wal
"#;

pub const SELECT_TABLES_INFO: &str = r#"
SELECT
  schemaname::text              AS schema_name,
  relname::text                 AS table_name,
  pg_total_relation_size(relid) AS total_bytes,
  n_live_tup,
  n_dead_tup,
  seq_scan,
  idx_scan,
  last_vacuum,
  last_autovacuum,
  last_analyze,
  last_autoanalyze
FROM pg_stat_user_tables
WHERE (n_live_tup + COALESCE(seq_scan, 0) + COALESCE(idx_scan, 0)) > 0
ORDER BY total_bytes DESC
LIMIT $1
"#;

/// Backends waiting on a heavyweight lock plus the backends blocking them.
/// Idle sessions (ClientRead and friends) are not lock waits.
pub const SELECT_LOCKING_NOW: &str = r#"
SELECT
  a.pid,
  a.usename::text    AS username,
  a.datname::text    AS database,
  a.wait_event_type,
  a.wait_event,
  a.state,
  a.query_start,
  pg_blocking_pids(a.pid) AS blocking_pids
FROM pg_stat_activity a
WHERE a.datname = $1
  AND a.pid <> pg_backend_pid()
  AND (
    a.wait_event_type = 'Lock'
    OR a.pid IN (
      SELECT unnest(pg_blocking_pids(w.pid))
      FROM pg_stat_activity w
      WHERE w.wait_event_type = 'Lock'
    )
  )
ORDER BY a.query_start ASC NULLS LAST
"#;

pub const SELECT_CHANGED_SETTINGS: &str = r#"
SELECT
  name,
  setting,
  unit,
  source,
  pending_restart
FROM pg_settings
WHERE source <> 'default'
ORDER BY name
"#;

/// Least used first, then largest
pub const SELECT_INDEX_STATS: &str = r#"
SELECT
  schemaname::text              AS schema_name,
  relname::text                 AS table_name,
  indexrelname::text            AS index_name,
  idx_scan,
  idx_tup_read,
  idx_tup_fetch,
  pg_relation_size(indexrelid)  AS size_bytes
FROM pg_stat_user_indexes
ORDER BY idx_scan ASC NULLS FIRST, size_bytes DESC
LIMIT $1
"#;

pub const SELECT_ACTIVE_QUERIES: &str = r#"
SELECT
  pid,
  usename::text AS username,
  datname::text AS database,
  state,
  EXTRACT(EPOCH FROM (now() - query_start))::float8 AS duration_seconds,
  wait_event_type,
  wait_event,
  query
FROM pg_stat_activity
WHERE datname = $1
  AND state IS DISTINCT FROM 'idle'
  AND pid <> pg_backend_pid()
  AND query_start IS NOT NULL
  AND now() - query_start > make_interval(secs => $2)
ORDER BY query_start ASC
"#;

pub const SELECT_CONNECTION_STATS: &str = r#"
SELECT
  count(*)::int4                                                     AS total_connections,
  (count(*) FILTER (WHERE state = 'active'))::int4                   AS active,
  (count(*) FILTER (WHERE state = 'idle'))::int4                     AS idle,
  (count(*) FILTER (WHERE state = 'idle in transaction'))::int4      AS idle_in_transaction,
  (count(*) FILTER (WHERE wait_event_type = 'Lock'))::int4           AS waiting,
  current_setting('max_connections')::int4                           AS max_connections
FROM pg_stat_activity
WHERE datname IS NOT NULL
"#;

pub const SELECT_EXTENSION_INSTALLED: &str =
    "SELECT EXISTS (SELECT 1 FROM pg_extension WHERE extname = $1)";

pub const STAT_STATEMENTS_EXTENSION: &str = "pg_stat_statements";

/// pg_stat_statements on PG >= 13
pub const SELECT_SLOW_QUERIES: &str = r#"
SELECT
  query,
  calls,
  total_exec_time,
  mean_exec_time,
  stddev_exec_time,
  rows,
  100.0::float8 * shared_blks_hit / NULLIF(shared_blks_hit + shared_blks_read, 0) AS cache_hit_percent
FROM pg_stat_statements
ORDER BY total_exec_time DESC
LIMIT $1
"#;

/// pg_stat_statements on PG <= 12
pub const SELECT_SLOW_QUERIES_LEGACY: &str = r#"
SELECT
  query,
  calls,
  total_time   AS total_exec_time,
  mean_time    AS mean_exec_time,
  stddev_time  AS stddev_exec_time,
  rows,
  100.0::float8 * shared_blks_hit / NULLIF(shared_blks_hit + shared_blks_read, 0) AS cache_hit_percent
FROM pg_stat_statements
ORDER BY total_time DESC
LIMIT $1
"#;

pub const SELECT_DATABASE_SIZES: &str = r#"
SELECT
  datname::text                 AS database_name,
  pg_database_size(datname)     AS size_bytes
FROM pg_database
WHERE datallowconn
"#;
