// PostgreSQL Instance Client
// One bb8 pool per registered instance, plus the lifecycle state and detected version

use bb8::{ManageConnection, Pool};
use bb8_postgres::PostgresConnectionManager;
use std::sync::{Arc, OnceLock};
use tokio::sync::{Mutex, RwLock};
use tokio_postgres::NoTls;

use crate::db::config::{ConfigResolver, ConnectionConfig};
use crate::db::queries::SELECT_PING;
use crate::db::traits::{ClientFactory, ClientState, DiagnosticError, DiagnosticsClient};
use crate::db::version::{detect_version, ServerVersion};
use crate::storage::Instance;

pub type PostgresPool = Pool<PostgresConnectionManager<NoTls>>;

/// Live client for one PostgreSQL instance
pub struct InstanceClient {
    name: String,
    config: ConnectionConfig,
    pg_config: tokio_postgres::Config,
    /// Opened by the first successful connect
    pool: OnceLock<PostgresPool>,
    state: RwLock<ClientState>,
    connecting: Mutex<()>,
}

impl InstanceClient {
    /// Validate the connection parameters. Nothing touches the network until `connect`.
    pub fn new(name: impl Into<String>, config: ConnectionConfig) -> Result<Self, DiagnosticError> {
        let name = name.into();
        let pg_config = config
            .connection_string()
            .parse::<tokio_postgres::Config>()
            .map_err(|e| DiagnosticError::ClientCreationFailed {
                instance: name.clone(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            name,
            config,
            pg_config,
            pool: OnceLock::new(),
            state: RwLock::new(ClientState::Created),
            connecting: Mutex::new(()),
        })
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    async fn set_state(&self, state: ClientState) {
        let mut current = self.state.write().await;
        *current = state;
    }

    fn connect_failed(&self, reason: String) -> DiagnosticError {
        DiagnosticError::ConnectFailed {
            instance: self.name.clone(),
            reason,
        }
    }

    fn connection_manager(&self) -> PostgresConnectionManager<NoTls> {
        PostgresConnectionManager::new(self.pg_config.clone(), NoTls)
    }

    /// Ping over one dedicated connection and read the version
    async fn ping_and_detect(&self) -> Result<ServerVersion, DiagnosticError> {
        let conn = self
            .connection_manager()
            .connect()
            .await
            .map_err(|e| self.connect_failed(e.to_string()))?;

        conn.simple_query(SELECT_PING)
            .await
            .map_err(|e| DiagnosticError::query("ping server", e))?;

        detect_version(&conn).await
    }

    fn open_pool(&self) -> PostgresPool {
        let max_size = self.config.max_open_conns.max(1);
        let min_idle = self.config.max_idle_conns.min(max_size);

        Pool::builder()
            .max_size(max_size)
            .min_idle(Some(min_idle))
            .max_lifetime(Some(self.config.conn_max_lifetime))
            .connection_timeout(self.config.connect_timeout)
            .build_unchecked(self.connection_manager())
    }

    /// Pool for diagnostic queries; only present once the client is `Ready`
    pub(crate) fn pool(&self) -> Result<&PostgresPool, DiagnosticError> {
        self.pool
            .get()
            .ok_or_else(|| DiagnosticError::Pool(format!("no open pool for instance {}", self.name)))
    }

    pub(crate) async fn current_state(&self) -> ClientState {
        self.state.read().await.clone()
    }

    /// Created -> Connecting -> Ready | Failed. Both outcomes are final:
    /// a ready client keeps its version, a failed one keeps its reason.
    pub(crate) async fn establish(&self) -> Result<(), DiagnosticError> {
        let _connecting = self.connecting.lock().await;

        match self.current_state().await {
            ClientState::Ready(_) => return Ok(()),
            ClientState::Failed(reason) => return Err(self.connect_failed(reason)),
            ClientState::Created | ClientState::Connecting => {}
        }

        self.set_state(ClientState::Connecting).await;
        tracing::debug!(
            "[Client] Connecting to {} at {}:{}/{}",
            self.name,
            self.config.host,
            self.config.port,
            self.config.database
        );

        match self.ping_and_detect().await {
            Ok(version) => {
                let _ = self.pool.set(self.open_pool());
                tracing::info!("[Client] {} connected, PostgreSQL {}", self.name, version);
                self.set_state(ClientState::Ready(version)).await;
                Ok(())
            }
            Err(e) => {
                let reason = match e {
                    DiagnosticError::ConnectFailed { reason, .. } => reason,
                    other => other.to_string(),
                };
                tracing::warn!("[Client] {} failed to connect: {}", self.name, reason);
                self.set_state(ClientState::Failed(reason.clone())).await;
                Err(self.connect_failed(reason))
            }
        }
    }

    /// Skip the handshake and pretend the server answered with `version`
    #[cfg(test)]
    pub(crate) async fn assume_ready(&self, version: ServerVersion) {
        self.set_state(ClientState::Ready(version)).await;
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }
}

/// Factory producing pooled clients from environment-resolved configuration
pub struct PgClientFactory {
    resolver: ConfigResolver,
}

impl PgClientFactory {
    pub fn new(resolver: ConfigResolver) -> Self {
        Self { resolver }
    }
}

impl Default for PgClientFactory {
    fn default() -> Self {
        Self::new(ConfigResolver::from_env())
    }
}

impl ClientFactory for PgClientFactory {
    fn create_client(&self, instance: &Instance) -> Result<Arc<dyn DiagnosticsClient>, DiagnosticError> {
        let config = self.resolver.resolve(&instance.name)?;
        tracing::debug!("[Client] Resolved config for {}: {:?}", instance.name, config);

        let client: Arc<dyn DiagnosticsClient> =
            Arc::new(InstanceClient::new(instance.name.clone(), config)?);
        Ok(client)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::config::MapSource;

    fn instance(name: &str) -> Instance {
        Instance::new(name, "postgres", None, "tester")
    }

    #[tokio::test]
    async fn test_new_client_starts_created() {
        let client = InstanceClient::new("local", ConnectionConfig::with_host("localhost")).unwrap();

        assert_eq!(client.instance_name(), "local");
        assert_eq!(client.state().await, ClientState::Created);
        assert!(!client.is_ready().await);
        assert_eq!(
            client.version().await.unwrap_err(),
            DiagnosticError::VersionNotDetected
        );
    }

    #[tokio::test]
    async fn test_operations_require_connect() {
        let client = InstanceClient::new("local", ConnectionConfig::with_host("localhost")).unwrap();
        let err = client.wal_activity().await.unwrap_err();
        assert_eq!(err.kind(), "version_not_detected");
    }

    #[tokio::test]
    async fn test_new_client_opens_no_pool() {
        let mut config = ConnectionConfig::with_host("localhost");
        config.max_open_conns = 4;
        config.max_idle_conns = 9;
        let client = InstanceClient::new("local", config).unwrap();

        assert_eq!(client.config().max_idle_conns, 9);
        assert!(client.pool().is_err());
    }

    #[tokio::test]
    async fn test_factory_missing_config() {
        let factory = PgClientFactory::new(ConfigResolver::new(MapSource::new()));
        let err = factory.create_client(&instance("ghost")).err().unwrap();
        assert_eq!(err.kind(), "config_not_found");
    }

    #[tokio::test]
    async fn test_factory_builds_unconnected_client() {
        let source = MapSource::new().with("PSQL_INSTANCE_REPORTING_HOST", "127.0.0.1");
        let factory = PgClientFactory::new(ConfigResolver::new(source));

        let client = factory.create_client(&instance("reporting")).unwrap();
        assert_eq!(client.instance_name(), "reporting");
        assert_eq!(client.state().await, ClientState::Created);
    }

    fn unreachable_config() -> ConnectionConfig {
        let mut config = ConnectionConfig::with_host("127.0.0.1");
        // Port 1 is never a PostgreSQL server
        config.port = 1;
        config.connect_timeout = std::time::Duration::from_secs(2);
        config
    }

    #[tokio::test]
    async fn test_connect_unreachable_marks_failed() {
        let client = InstanceClient::new("down", unreachable_config()).unwrap();

        let err = client.connect().await.unwrap_err();
        assert_eq!(err.kind(), "connect_failed");
        assert!(matches!(client.state().await, ClientState::Failed(_)));
        assert_eq!(client.pool().err().map(|e| e.kind()), Some("pool_error"));
    }

    #[tokio::test]
    async fn test_failed_client_stays_failed() {
        let client = InstanceClient::new("down", unreachable_config()).unwrap();

        let first = client.connect().await.unwrap_err();
        let ClientState::Failed(reason) = client.state().await else {
            panic!("expected Failed state");
        };

        let second = client.connect().await.unwrap_err();
        assert_eq!(second, first);
        assert_eq!(
            second,
            DiagnosticError::ConnectFailed {
                instance: "down".to_string(),
                reason: reason.clone(),
            }
        );
        assert_eq!(client.state().await, ClientState::Failed(reason));
    }

    #[tokio::test]
    async fn test_connect_on_ready_client_keeps_version() {
        // Any real handshake against this config would fail
        let client = InstanceClient::new("steady", unreachable_config()).unwrap();
        let version = ServerVersion::parse("PostgreSQL 16.2 on x86_64-pc-linux-gnu").unwrap();
        client.assume_ready(version.clone()).await;

        client.connect().await.unwrap();
        client.connect().await.unwrap();

        assert_eq!(client.state().await, ClientState::Ready(version.clone()));
        assert_eq!(client.version().await.unwrap(), version);
    }

    #[tokio::test]
    async fn test_concurrent_connects_settle_on_one_outcome() {
        let client = Arc::new(InstanceClient::new("down", unreachable_config()).unwrap());

        let (a, b) = tokio::join!(client.connect(), client.connect());

        assert_eq!(a.unwrap_err(), b.unwrap_err());
        assert!(matches!(client.state().await, ClientState::Failed(_)));
    }

    #[test]
    fn test_verifying_sslmode_builds_client() {
        let mut config = ConnectionConfig::with_host("localhost");
        config.sslmode = "verify-ca".to_string();
        assert!(InstanceClient::new("tls", config).is_ok());
    }
}
