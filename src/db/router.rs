// Query Router
// Decodes an action request once, dispatches it to the instance's client and wraps the outcome in an envelope

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::db::operations::{
    effective_limit, effective_min_duration, DEFAULT_INDEX_LIMIT, DEFAULT_MIN_DURATION_SECS,
    DEFAULT_SLOW_QUERIES_LIMIT, DEFAULT_TABLES_LIMIT,
};
use crate::db::registry::InstanceRegistry;
use crate::db::traits::{DiagnosticError, DiagnosticsClient};
use crate::storage::Instance;

pub const DEFAULT_DB_NAME: &str = "postgres";

/// Closed set of diagnostic actions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    DatabasesOverview,
    CacheHitRate,
    CheckpointsStats,
    WalActivity,
    TablesInfo,
    LockingInfo,
    ChangedSettings,
    Version,
    IndexStats,
    ActiveQueries,
    ConnectionStats,
    SlowQueries,
    DatabaseSizes,
}

impl Action {
    pub const ALL: [Action; 13] = [
        Action::DatabasesOverview,
        Action::CacheHitRate,
        Action::CheckpointsStats,
        Action::WalActivity,
        Action::TablesInfo,
        Action::LockingInfo,
        Action::ChangedSettings,
        Action::Version,
        Action::IndexStats,
        Action::ActiveQueries,
        Action::ConnectionStats,
        Action::SlowQueries,
        Action::DatabaseSizes,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::DatabasesOverview => "databases_overview",
            Action::CacheHitRate => "cache_hit_rate",
            Action::CheckpointsStats => "checkpoints_stats",
            Action::WalActivity => "wal_activity",
            Action::TablesInfo => "tables_info",
            Action::LockingInfo => "locking_info",
            Action::ChangedSettings => "changed_settings",
            Action::Version => "version",
            Action::IndexStats => "index_stats",
            Action::ActiveQueries => "active_queries",
            Action::ConnectionStats => "connection_stats",
            Action::SlowQueries => "slow_queries",
            Action::DatabaseSizes => "database_sizes",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Action::DatabasesOverview => "Transaction, block, tuple and temp-file totals for one database",
            Action::CacheHitRate => "Buffer cache hit ratio, global or for one database",
            Action::CheckpointsStats => "Checkpoint counters (plus buffer counters before PostgreSQL 17)",
            Action::WalActivity => "WAL record, full-page-image and byte counters (PostgreSQL 14+)",
            Action::TablesInfo => "Per-table size, tuple, scan and maintenance stats, largest first",
            Action::LockingInfo => "Waiting or blocked backends with their blocking pids",
            Action::ChangedSettings => "Settings whose value differs from the built-in default",
            Action::Version => "Detected server version",
            Action::IndexStats => "Per-index usage and size, least used first",
            Action::ActiveQueries => "Queries running longer than a threshold",
            Action::ConnectionStats => "Connection counts by state against max_connections",
            Action::SlowQueries => "Top statements by total execution time (pg_stat_statements)",
            Action::DatabaseSizes => "Size of every database",
        }
    }

    /// Parameters the action reads from the request bag
    pub fn parameters(&self) -> Vec<ParamSpec> {
        match self {
            Action::DatabasesOverview | Action::LockingInfo => vec![ParamSpec::db_name()],
            Action::CacheHitRate => vec![ParamSpec {
                name: PARAM_DB_NAME,
                kind: ParamKind::String,
                default: Value::Null,
            }],
            Action::TablesInfo => vec![ParamSpec::limit(DEFAULT_TABLES_LIMIT)],
            Action::IndexStats => vec![ParamSpec::limit(DEFAULT_INDEX_LIMIT)],
            Action::SlowQueries => vec![ParamSpec::limit(DEFAULT_SLOW_QUERIES_LIMIT)],
            Action::ActiveQueries => vec![
                ParamSpec::db_name(),
                ParamSpec {
                    name: PARAM_MIN_DURATION,
                    kind: ParamKind::Integer,
                    default: Value::from(DEFAULT_MIN_DURATION_SECS),
                },
            ],
            Action::CheckpointsStats
            | Action::WalActivity
            | Action::ChangedSettings
            | Action::Version
            | Action::ConnectionStats
            | Action::DatabaseSizes => Vec::new(),
        }
    }

    /// Full catalogue, in declaration order
    pub fn catalogue() -> Vec<ActionSpec> {
        Action::ALL
            .iter()
            .map(|action| ActionSpec {
                action: *action,
                description: action.description(),
                parameters: action.parameters(),
            })
            .collect()
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = DiagnosticError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Action::ALL
            .iter()
            .find(|action| action.as_str() == s)
            .copied()
            .ok_or_else(|| DiagnosticError::UnsupportedAction(s.to_string()))
    }
}

const PARAM_DB_NAME: &str = "db_name";
const PARAM_DB_NAME_ALIAS: &str = "dbName";
const PARAM_LIMIT: &str = "limit";
const PARAM_MIN_DURATION: &str = "min_duration_seconds";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamKind {
    String,
    Integer,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParamSpec {
    pub name: &'static str,
    pub kind: ParamKind,
    pub default: Value,
}

impl ParamSpec {
    fn db_name() -> Self {
        Self {
            name: PARAM_DB_NAME,
            kind: ParamKind::String,
            default: Value::from(DEFAULT_DB_NAME),
        }
    }

    fn limit(default: i64) -> Self {
        Self {
            name: PARAM_LIMIT,
            kind: ParamKind::Integer,
            default: Value::from(default),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionSpec {
    pub action: Action,
    pub description: &'static str,
    pub parameters: Vec<ParamSpec>,
}

/// An action with its parameters decoded and defaulted
#[derive(Debug, Clone, PartialEq)]
pub enum ActionRequest {
    DatabasesOverview { db_name: String },
    /// `None` means all databases
    CacheHitRate { db_name: Option<String> },
    CheckpointsStats,
    WalActivity,
    TablesInfo { limit: i64 },
    LockingInfo { db_name: String },
    ChangedSettings,
    Version,
    IndexStats { limit: i64 },
    ActiveQueries { db_name: String, min_duration_secs: i64 },
    ConnectionStats,
    SlowQueries { limit: i64 },
    DatabaseSizes,
}

impl ActionRequest {
    /// Decode the untyped parameter bag for `action`. Missing or mistyped
    /// values fall back to the action's defaults.
    pub fn decode(action: Action, params: &Map<String, Value>) -> Self {
        match action {
            Action::DatabasesOverview => ActionRequest::DatabasesOverview {
                db_name: db_name_param(params),
            },
            Action::CacheHitRate => ActionRequest::CacheHitRate {
                db_name: string_param(params).filter(|name| !name.is_empty()),
            },
            Action::CheckpointsStats => ActionRequest::CheckpointsStats,
            Action::WalActivity => ActionRequest::WalActivity,
            Action::TablesInfo => ActionRequest::TablesInfo {
                limit: limit_param(params, DEFAULT_TABLES_LIMIT),
            },
            Action::LockingInfo => ActionRequest::LockingInfo {
                db_name: db_name_param(params),
            },
            Action::ChangedSettings => ActionRequest::ChangedSettings,
            Action::Version => ActionRequest::Version,
            Action::IndexStats => ActionRequest::IndexStats {
                limit: limit_param(params, DEFAULT_INDEX_LIMIT),
            },
            Action::ActiveQueries => ActionRequest::ActiveQueries {
                db_name: db_name_param(params),
                min_duration_secs: effective_min_duration(
                    int_param(params, PARAM_MIN_DURATION).unwrap_or(DEFAULT_MIN_DURATION_SECS),
                ),
            },
            Action::ConnectionStats => ActionRequest::ConnectionStats,
            Action::SlowQueries => ActionRequest::SlowQueries {
                limit: limit_param(params, DEFAULT_SLOW_QUERIES_LIMIT),
            },
            Action::DatabaseSizes => ActionRequest::DatabaseSizes,
        }
    }
}

fn string_param(params: &Map<String, Value>) -> Option<String> {
    [PARAM_DB_NAME, PARAM_DB_NAME_ALIAS]
        .iter()
        .find_map(|key| params.get(*key).and_then(Value::as_str))
        .map(str::to_string)
}

fn db_name_param(params: &Map<String, Value>) -> String {
    string_param(params).unwrap_or_else(|| DEFAULT_DB_NAME.to_string())
}

/// Integers, or floats truncated toward zero
fn int_param(params: &Map<String, Value>, key: &str) -> Option<i64> {
    let value = params.get(key)?;
    value
        .as_i64()
        .or_else(|| value.as_f64().map(|f| f.trunc() as i64))
}

fn limit_param(params: &Map<String, Value>, default: i64) -> i64 {
    effective_limit(int_param(params, PARAM_LIMIT).unwrap_or(default), default)
}

/// Inbound request from a protocol adapter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryRequest {
    #[serde(alias = "instance")]
    pub instance_name: String,
    pub action: String,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub parameters: Map<String, Value>,
}

impl QueryRequest {
    pub fn new(instance_name: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            instance_name: instance_name.into(),
            action: action.into(),
            parameters: Map::new(),
        }
    }

    pub fn with_param(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.parameters.insert(key.to_string(), value.into());
        self
    }
}

/// Uniform response envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResponse {
    pub instance: String,
    pub action: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl QueryResponse {
    fn succeeded(instance: &str, action: &str, data: Value) -> Self {
        Self {
            instance: instance.to_string(),
            action: action.to_string(),
            success: true,
            data: Some(data),
            error: None,
        }
    }

    fn failed(instance: &str, action: &str, error: &DiagnosticError) -> Self {
        Self {
            instance: instance.to_string(),
            action: action.to_string(),
            success: false,
            data: None,
            error: Some(error.to_string()),
        }
    }
}

/// A failed route: the envelope to hand back plus the error behind it
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{source}")]
pub struct RouteError {
    pub response: QueryResponse,
    pub source: DiagnosticError,
}

impl RouteError {
    fn new(instance: &str, action: &str, source: DiagnosticError) -> Self {
        Self {
            response: QueryResponse::failed(instance, action, &source),
            source,
        }
    }
}

/// Routes query requests to registered instance clients
pub struct QueryRouter {
    registry: Arc<InstanceRegistry>,
}

impl QueryRouter {
    pub fn new(registry: Arc<InstanceRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<InstanceRegistry> {
        &self.registry
    }

    /// Run `request` against `instance`. Every outcome carries an envelope;
    /// failures also carry the underlying error.
    pub async fn route_query(
        &self,
        request: &QueryRequest,
        instance: &Instance,
    ) -> Result<QueryResponse, RouteError> {
        let name = instance.name.as_str();
        let action_name = request.action.as_str();

        let client = self
            .registry
            .get_instance_client(instance)
            .await
            .ok_or_else(|| {
                RouteError::new(name, action_name, DiagnosticError::ClientNotFound(name.to_string()))
            })?;

        let action: Action = action_name
            .parse()
            .map_err(|e| RouteError::new(name, action_name, e))?;

        let decoded = ActionRequest::decode(action, &request.parameters);
        tracing::debug!(instance = %name, "[Router] {} {:?}", action, decoded);

        match dispatch(client.as_ref(), decoded).await {
            Ok(data) => Ok(QueryResponse::succeeded(name, action_name, data)),
            Err(e) => {
                tracing::debug!(instance = %name, "[Router] {} failed: {}", action, e);
                Err(RouteError::new(name, action_name, e))
            }
        }
    }
}

fn to_data<T: Serialize>(value: T) -> Result<Value, DiagnosticError> {
    serde_json::to_value(value).map_err(|e| DiagnosticError::query("encode result", e))
}

async fn dispatch(client: &dyn DiagnosticsClient, request: ActionRequest) -> Result<Value, DiagnosticError> {
    match request {
        ActionRequest::DatabasesOverview { db_name } => to_data(client.database_overview(&db_name).await?),
        ActionRequest::CacheHitRate { db_name } => to_data(client.cache_hit_rate(db_name.as_deref()).await?),
        ActionRequest::CheckpointsStats => to_data(client.checkpoint_stats().await?),
        ActionRequest::WalActivity => to_data(client.wal_activity().await?),
        ActionRequest::TablesInfo { limit } => to_data(client.tables_info(limit).await?),
        ActionRequest::LockingInfo { db_name } => to_data(client.locking_info(&db_name).await?),
        ActionRequest::ChangedSettings => to_data(client.changed_settings().await?),
        ActionRequest::Version => to_data(client.version().await?),
        ActionRequest::IndexStats { limit } => to_data(client.index_stats(limit).await?),
        ActionRequest::ActiveQueries {
            db_name,
            min_duration_secs,
        } => to_data(client.active_queries(&db_name, min_duration_secs).await?),
        ActionRequest::ConnectionStats => to_data(client.connection_stats().await?),
        ActionRequest::SlowQueries { limit } => to_data(client.slow_queries(limit).await?),
        ActionRequest::DatabaseSizes => to_data(client.database_sizes().await?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::fakes::{instance, FakeFactory};
    use serde_json::json;

    async fn router_with(factory: FakeFactory, names: &[&str]) -> (QueryRouter, Arc<FakeFactory>) {
        let factory = Arc::new(factory);
        let instances: Vec<Instance> = names.iter().map(|n| instance(n)).collect();
        let registry = InstanceRegistry::build(&instances, factory.clone()).await;
        (QueryRouter::new(Arc::new(registry)), factory)
    }

    async fn route_ok(router: &QueryRouter, request: QueryRequest) -> QueryResponse {
        let inst = instance(&request.instance_name);
        router.route_query(&request, &inst).await.unwrap()
    }

    #[tokio::test]
    async fn test_every_action_on_unregistered_instance() {
        let (router, _) = router_with(FakeFactory::new().with_unreachable("down"), &["down"]).await;

        for action in Action::ALL {
            let request = QueryRequest::new("down", action.as_str());
            let err = router.route_query(&request, &instance("down")).await.unwrap_err();

            assert_eq!(err.source, DiagnosticError::ClientNotFound("down".to_string()));
            assert!(!err.response.success);
            assert_eq!(
                err.response.error.as_deref(),
                Some("client not found for instance: down")
            );
            assert_eq!(err.response.action, action.as_str());
            assert!(err.response.data.is_none());
        }
    }

    #[tokio::test]
    async fn test_unknown_action() {
        let (router, _) = router_with(FakeFactory::new().with_server("db1", 16, 0), &["db1"]).await;

        let err = router
            .route_query(&QueryRequest::new("db1", "drop_everything"), &instance("db1"))
            .await
            .unwrap_err();

        assert_eq!(err.source.kind(), "unsupported_action");
        assert_eq!(
            err.response.error.as_deref(),
            Some("unsupported action: drop_everything")
        );
    }

    #[tokio::test]
    async fn test_wal_activity_on_13_is_unsupported() {
        let (router, _) =
            router_with(FakeFactory::new().with_server("analytics", 13, 9), &["analytics"]).await;

        let err = router
            .route_query(&QueryRequest::new("analytics", "wal_activity"), &instance("analytics"))
            .await
            .unwrap_err();

        assert!(!err.response.success);
        let message = err.response.error.unwrap();
        assert!(message.contains("requires"));
        assert!(message.contains("13.9"));
        assert_eq!(err.source.kind(), "unsupported_on_version");
    }

    #[tokio::test]
    async fn test_wal_activity_on_14() {
        let (router, _) = router_with(FakeFactory::new().with_server("db", 14, 0), &["db"]).await;
        let response = route_ok(&router, QueryRequest::new("db", "wal_activity")).await;
        assert!(response.success);
        assert!(response.error.is_none());
    }

    #[tokio::test]
    async fn test_checkpoint_shape_follows_version() {
        let (router, _) = router_with(
            FakeFactory::new()
                .with_server("new", 17, 0)
                .with_server("old", 16, 4),
            &["new", "old"],
        )
        .await;

        let modern = route_ok(&router, QueryRequest::new("new", "checkpoints_stats")).await;
        let modern = modern.data.unwrap();
        assert_eq!(modern["source"], json!("modern"));
        assert!(modern.get("buffers_alloc").is_none());

        let legacy = route_ok(&router, QueryRequest::new("old", "checkpoints_stats")).await;
        let legacy = legacy.data.unwrap();
        assert_eq!(legacy["source"], json!("legacy"));
        assert_eq!(legacy["buffers_alloc"], json!(0));
        assert_eq!(legacy["checkpoints_timed"], json!(7));
    }

    #[tokio::test]
    async fn test_tables_limit_defaulting() {
        let (router, factory) = router_with(FakeFactory::new().with_server("db", 15, 0), &["db"]).await;

        route_ok(&router, QueryRequest::new("db", "tables_info")).await;
        route_ok(&router, QueryRequest::new("db", "tables_info").with_param("limit", -5)).await;
        route_ok(&router, QueryRequest::new("db", "tables_info").with_param("limit", 0)).await;
        route_ok(&router, QueryRequest::new("db", "tables_info").with_param("limit", 200)).await;

        let calls = factory.last_client("db").unwrap().calls();
        assert_eq!(calls, vec!["tables_info(200)"; 4]);
    }

    #[tokio::test]
    async fn test_limit_accepts_floats_and_ignores_strings() {
        let (router, factory) = router_with(FakeFactory::new().with_server("db", 15, 0), &["db"]).await;

        route_ok(&router, QueryRequest::new("db", "index_stats").with_param("limit", 12.9)).await;
        route_ok(&router, QueryRequest::new("db", "index_stats").with_param("limit", "12")).await;
        route_ok(&router, QueryRequest::new("db", "index_stats").with_param("limit", -3.7)).await;

        let calls = factory.last_client("db").unwrap().calls();
        assert_eq!(calls, vec!["index_stats(12)", "index_stats(100)", "index_stats(100)"]);
    }

    #[tokio::test]
    async fn test_db_name_defaults_and_alias() {
        let (router, factory) = router_with(FakeFactory::new().with_server("db", 15, 0), &["db"]).await;

        route_ok(&router, QueryRequest::new("db", "databases_overview")).await;
        route_ok(&router, QueryRequest::new("db", "databases_overview").with_param("dbName", "app")).await;
        route_ok(&router, QueryRequest::new("db", "locking_info").with_param("db_name", 17)).await;

        let calls = factory.last_client("db").unwrap().calls();
        assert_eq!(
            calls,
            vec![
                "database_overview(postgres)",
                "database_overview(app)",
                "locking_info(postgres)"
            ]
        );
    }

    #[tokio::test]
    async fn test_cache_hit_rate_scope() {
        let (router, factory) = router_with(FakeFactory::new().with_server("db", 15, 0), &["db"]).await;

        route_ok(&router, QueryRequest::new("db", "cache_hit_rate")).await;
        route_ok(&router, QueryRequest::new("db", "cache_hit_rate").with_param("db_name", "")).await;
        let scoped =
            route_ok(&router, QueryRequest::new("db", "cache_hit_rate").with_param("db_name", "app")).await;

        assert_eq!(scoped.data, Some(json!({ "hit_rate": 0.99 })));
        let calls = factory.last_client("db").unwrap().calls();
        assert_eq!(calls, vec!["cache_hit_rate(*)", "cache_hit_rate(*)", "cache_hit_rate(app)"]);
    }

    #[tokio::test]
    async fn test_active_queries_threshold() {
        let (router, factory) = router_with(FakeFactory::new().with_server("db", 15, 0), &["db"]).await;

        route_ok(&router, QueryRequest::new("db", "active_queries")).await;
        route_ok(
            &router,
            QueryRequest::new("db", "active_queries").with_param("min_duration_seconds", -1),
        )
        .await;
        route_ok(
            &router,
            QueryRequest::new("db", "active_queries")
                .with_param("min_duration_seconds", 0)
                .with_param("db_name", "app"),
        )
        .await;

        let calls = factory.last_client("db").unwrap().calls();
        assert_eq!(
            calls,
            vec![
                "active_queries(postgres, 5)",
                "active_queries(postgres, 5)",
                "active_queries(app, 0)"
            ]
        );
    }

    #[tokio::test]
    async fn test_version_action() {
        let (router, _) = router_with(FakeFactory::new().with_server("db", 16, 3), &["db"]).await;

        let response = route_ok(&router, QueryRequest::new("db", "version")).await;
        let data = response.data.unwrap();
        assert_eq!(data["major"], json!(16));
        assert_eq!(data["minor"], json!(3));
        assert_eq!(data["patch"], json!(0));
    }

    #[tokio::test]
    async fn test_client_errors_are_enveloped() {
        let (router, _) = router_with(FakeFactory::new().with_server("db", 15, 0), &["db"]).await;

        let err = router
            .route_query(&QueryRequest::new("db", "slow_queries"), &instance("db"))
            .await
            .unwrap_err();
        assert_eq!(err.source.kind(), "extension_missing");
        assert_eq!(err.response.instance, "db");
        assert_eq!(err.response.action, "slow_queries");

        let err = router
            .route_query(
                &QueryRequest::new("db", "databases_overview").with_param("db_name", "missing"),
                &instance("db"),
            )
            .await
            .unwrap_err();
        assert_eq!(err.response.error.as_deref(), Some("database missing not found"));
    }

    #[test]
    fn test_action_names_round_trip() {
        for action in Action::ALL {
            assert_eq!(action.as_str().parse::<Action>().unwrap(), action);
            assert_eq!(serde_json::to_value(action).unwrap(), json!(action.as_str()));
        }
        assert!("VERSION".parse::<Action>().is_err());
    }

    #[test]
    fn test_catalogue_defaults() {
        let catalogue = Action::catalogue();
        assert_eq!(catalogue.len(), 13);

        let tables = catalogue
            .iter()
            .find(|spec| spec.action == Action::TablesInfo)
            .unwrap();
        assert_eq!(tables.parameters[0].name, "limit");
        assert_eq!(tables.parameters[0].default, json!(200));
    }

    #[test]
    fn test_request_without_parameters() {
        let request: QueryRequest =
            serde_json::from_value(json!({ "instance_name": "db", "action": "version" })).unwrap();
        assert!(request.parameters.is_empty());
    }

    #[test]
    fn test_success_envelope_omits_error() {
        let response = QueryResponse::succeeded("db", "version", json!({}));
        let value = serde_json::to_value(&response).unwrap();
        assert!(value.get("error").is_none());
        assert_eq!(value["success"], json!(true));
    }
}
