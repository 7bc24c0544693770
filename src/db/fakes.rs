// In-memory diagnostics clients for registry, router and API tests

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::RwLock;

use crate::db::traits::{ClientFactory, ClientState, DiagnosticError, DiagnosticsClient};
use crate::db::types::*;
use crate::db::version::ServerVersion;
use crate::storage::Instance;

/// Client answering from canned data; records every diagnostic call
pub struct FakeClient {
    name: String,
    server: Option<ServerVersion>,
    state: RwLock<ClientState>,
    calls: Mutex<Vec<String>>,
}

impl FakeClient {
    /// Reachable server reporting the given major.minor
    pub fn reachable(name: &str, major: u32, minor: u32) -> Self {
        let raw = format!("PostgreSQL {}.{} on x86_64-pc-linux-gnu", major, minor);
        Self::with_server(name, Some(ServerVersion::new(major, minor, 0, raw)))
    }

    pub fn unreachable(name: &str) -> Self {
        Self::with_server(name, None)
    }

    fn with_server(name: &str, server: Option<ServerVersion>) -> Self {
        Self {
            name: name.to_string(),
            server,
            state: RwLock::new(ClientState::Created),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    fn record(&self, call: String) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
    }
}

#[async_trait::async_trait]
impl DiagnosticsClient for FakeClient {
    fn instance_name(&self) -> &str {
        &self.name
    }

    async fn connect(&self) -> Result<(), DiagnosticError> {
        let mut state = self.state.write().await;
        match &*state {
            ClientState::Ready(_) => return Ok(()),
            ClientState::Failed(reason) => {
                return Err(DiagnosticError::ConnectFailed {
                    instance: self.name.clone(),
                    reason: reason.clone(),
                })
            }
            ClientState::Created | ClientState::Connecting => {}
        }

        match &self.server {
            Some(version) => {
                *state = ClientState::Ready(version.clone());
                Ok(())
            }
            None => {
                let reason = "connection refused".to_string();
                *state = ClientState::Failed(reason.clone());
                Err(DiagnosticError::ConnectFailed {
                    instance: self.name.clone(),
                    reason,
                })
            }
        }
    }

    async fn state(&self) -> ClientState {
        self.state.read().await.clone()
    }

    async fn database_overview(&self, db_name: &str) -> Result<DatabaseOverview, DiagnosticError> {
        self.version().await?;
        self.record(format!("database_overview({})", db_name));
        if db_name == "missing" {
            return Err(DiagnosticError::NotFound(db_name.to_string()));
        }
        Ok(DatabaseOverview {
            xact_commit: 42,
            ..Default::default()
        })
    }

    async fn cache_hit_rate(&self, db_name: Option<&str>) -> Result<CacheHitRate, DiagnosticError> {
        self.version().await?;
        self.record(format!("cache_hit_rate({})", db_name.unwrap_or("*")));
        Ok(CacheHitRate {
            hit_rate: Some(0.99),
        })
    }

    async fn checkpoint_stats(&self) -> Result<CheckpointStats, DiagnosticError> {
        let version = self.version().await?;
        self.record("checkpoint_stats".to_string());
        let counters = CheckpointCounters {
            checkpoints_timed: 7,
            ..Default::default()
        };
        if version.supports_checkpointer_view() {
            Ok(CheckpointStats::Modern { counters })
        } else {
            Ok(CheckpointStats::Legacy {
                counters,
                buffers: BufferAllocation::default(),
            })
        }
    }

    async fn wal_activity(&self) -> Result<WalActivity, DiagnosticError> {
        let version = self.version().await?;
        version.require(version.supports_wal_stats(), "WAL statistics", "14")?;
        self.record("wal_activity".to_string());
        Ok(WalActivity::default())
    }

    async fn tables_info(&self, limit: i64) -> Result<Vec<TableInfo>, DiagnosticError> {
        self.version().await?;
        self.record(format!("tables_info({})", limit));
        Ok(Vec::new())
    }

    async fn locking_info(&self, db_name: &str) -> Result<Vec<LockInfo>, DiagnosticError> {
        let version = self.version().await?;
        version.require(
            version.supports_blocking_pid_function(),
            "lock blocking analysis",
            "9.6",
        )?;
        self.record(format!("locking_info({})", db_name));
        Ok(Vec::new())
    }

    async fn changed_settings(&self) -> Result<Vec<SettingInfo>, DiagnosticError> {
        self.version().await?;
        self.record("changed_settings".to_string());
        Ok(Vec::new())
    }

    async fn index_stats(&self, limit: i64) -> Result<Vec<IndexStats>, DiagnosticError> {
        self.version().await?;
        self.record(format!("index_stats({})", limit));
        Ok(Vec::new())
    }

    async fn active_queries(
        &self,
        db_name: &str,
        min_duration_secs: i64,
    ) -> Result<Vec<ActiveQuery>, DiagnosticError> {
        self.version().await?;
        self.record(format!("active_queries({}, {})", db_name, min_duration_secs));
        Ok(Vec::new())
    }

    async fn connection_stats(&self) -> Result<ConnectionSummary, DiagnosticError> {
        self.version().await?;
        self.record("connection_stats".to_string());
        Ok(ConnectionSummary {
            max_connections: 100,
            ..Default::default()
        })
    }

    async fn slow_queries(&self, limit: i64) -> Result<Vec<SlowQuery>, DiagnosticError> {
        self.version().await?;
        self.record(format!("slow_queries({})", limit));
        Err(DiagnosticError::ExtensionMissing(
            "pg_stat_statements".to_string(),
        ))
    }

    async fn database_sizes(&self) -> Result<Vec<DatabaseSize>, DiagnosticError> {
        self.version().await?;
        self.record("database_sizes".to_string());
        Ok(vec![DatabaseSize {
            database_name: "postgres".to_string(),
            size_bytes: 8_000_000,
        }])
    }
}

/// Factory handing out fake clients by instance name; unknown names have no config
#[derive(Default)]
pub struct FakeFactory {
    servers: HashMap<String, Option<(u32, u32)>>,
    created: Mutex<Vec<Arc<FakeClient>>>,
}

impl FakeFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_server(mut self, name: &str, major: u32, minor: u32) -> Self {
        self.servers.insert(name.to_string(), Some((major, minor)));
        self
    }

    pub fn with_unreachable(mut self, name: &str) -> Self {
        self.servers.insert(name.to_string(), None);
        self
    }

    /// Most recently created client for `name`
    pub fn last_client(&self, name: &str) -> Option<Arc<FakeClient>> {
        let created = self.created.lock().ok()?;
        created.iter().rev().find(|c| c.name == name).cloned()
    }

    pub fn created_count(&self) -> usize {
        self.created.lock().map(|c| c.len()).unwrap_or(0)
    }
}

impl ClientFactory for FakeFactory {
    fn create_client(&self, instance: &Instance) -> Result<Arc<dyn DiagnosticsClient>, DiagnosticError> {
        let server = self
            .servers
            .get(&instance.name)
            .ok_or_else(|| DiagnosticError::ConfigNotFound {
                instance: instance.name.clone(),
                key: format!("PSQL_INSTANCE_{}_HOST", instance.name.to_uppercase()),
            })?;

        let client = Arc::new(match server {
            Some((major, minor)) => FakeClient::reachable(&instance.name, *major, *minor),
            None => FakeClient::unreachable(&instance.name),
        });

        if let Ok(mut created) = self.created.lock() {
            created.push(Arc::clone(&client));
        }
        Ok(client as Arc<dyn DiagnosticsClient>)
    }
}

pub fn instance(name: &str) -> Instance {
    let mut instance = Instance::new(name, "postgres", None, "tester");
    instance.id = format!("id-{}", name);
    instance
}
