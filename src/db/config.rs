// Connection Config Resolution
// Turns an instance name into pool/connection parameters via PSQL_INSTANCE_<NAME>_* lookups

use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;

use crate::db::traits::DiagnosticError;

pub const ENV_PREFIX: &str = "PSQL_INSTANCE_";

pub const DEFAULT_PORT: u16 = 5432;
pub const DEFAULT_USER: &str = "postgres";
pub const DEFAULT_DATABASE: &str = "postgres";
pub const DEFAULT_SSLMODE: &str = "disable";
pub const DEFAULT_MAX_OPEN_CONNS: u32 = 10;
pub const DEFAULT_MAX_IDLE_CONNS: u32 = 5;
pub const DEFAULT_CONN_MAX_LIFETIME: Duration = Duration::from_secs(30 * 60);
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Connection configuration for one PostgreSQL instance
#[derive(Clone, Serialize)]
pub struct ConnectionConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    #[serde(skip_serializing)]
    pub password: String,
    pub database: String,
    pub sslmode: String,
    pub max_open_conns: u32,
    pub max_idle_conns: u32,
    pub conn_max_lifetime: Duration,
    pub connect_timeout: Duration,
}

impl ConnectionConfig {
    /// Config with every default applied for the given host
    pub fn with_host(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_PORT,
            user: DEFAULT_USER.to_string(),
            password: String::new(),
            database: DEFAULT_DATABASE.to_string(),
            sslmode: DEFAULT_SSLMODE.to_string(),
            max_open_conns: DEFAULT_MAX_OPEN_CONNS,
            max_idle_conns: DEFAULT_MAX_IDLE_CONNS,
            conn_max_lifetime: DEFAULT_CONN_MAX_LIFETIME,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// libpq-style connection string understood by tokio-postgres
    pub fn connection_string(&self) -> String {
        format!(
            "host={} port={} user={} password={} dbname={} sslmode={} connect_timeout={}",
            quote_value(&self.host),
            self.port,
            quote_value(&self.user),
            quote_value(&self.password),
            quote_value(&self.database),
            self.driver_sslmode(),
            self.connect_timeout.as_secs()
        )
    }

    /// tokio-postgres knows only disable/prefer/require. The verifying modes
    /// still demand TLS, so they surface as a connect failure, not a parse error.
    pub fn driver_sslmode(&self) -> &'static str {
        match self.sslmode.trim().to_ascii_lowercase().as_str() {
            "disable" => "disable",
            "allow" | "prefer" | "" => "prefer",
            _ => "require",
        }
    }
}

impl std::fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("database", &self.database)
            .field("sslmode", &self.sslmode)
            .field("max_open_conns", &self.max_open_conns)
            .field("max_idle_conns", &self.max_idle_conns)
            .field("conn_max_lifetime", &self.conn_max_lifetime)
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

/// Quote a connection string value so spaces and quotes survive
fn quote_value(value: &str) -> String {
    if !value.is_empty() && !value.contains([' ', '\'', '\\']) {
        return value.to_string();
    }
    let escaped = value.replace('\\', "\\\\").replace('\'', "\\'");
    format!("'{}'", escaped)
}

/// Where named parameters are looked up
pub trait ParamSource: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
}

/// Reads the process environment
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvSource;

impl ParamSource for EnvSource {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

/// Fixed key/value parameters
#[derive(Debug, Clone, Default)]
pub struct MapSource {
    values: HashMap<String, String>,
}

impl MapSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }
}

impl ParamSource for MapSource {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }
}

/// Resolves instance names to connection configs
pub struct ConfigResolver {
    source: Box<dyn ParamSource>,
}

impl ConfigResolver {
    pub fn new(source: impl ParamSource + 'static) -> Self {
        Self {
            source: Box::new(source),
        }
    }

    pub fn from_env() -> Self {
        Self::new(EnvSource)
    }

    /// Key prefix for an instance, e.g. `PSQL_INSTANCE_ANALYTICS_`
    pub fn key_prefix(instance_name: &str) -> String {
        format!("{}{}_", ENV_PREFIX, instance_name.to_uppercase())
    }

    pub fn resolve(&self, instance_name: &str) -> Result<ConnectionConfig, DiagnosticError> {
        let prefix = Self::key_prefix(instance_name);
        let host_key = format!("{}HOST", prefix);

        if instance_name.is_empty() {
            return Err(DiagnosticError::ConfigNotFound {
                instance: String::new(),
                key: host_key,
            });
        }

        let host = self
            .lookup(&prefix, "HOST")
            .ok_or_else(|| DiagnosticError::ConfigNotFound {
                instance: instance_name.to_string(),
                key: host_key,
            })?;

        let mut config = ConnectionConfig::with_host(host);

        if let Some(port) = self.lookup_parsed(&prefix, "PORT") {
            config.port = port;
        }
        if let Some(user) = self.lookup(&prefix, "USER") {
            config.user = user;
        }
        if let Some(password) = self.lookup(&prefix, "PASSWORD") {
            config.password = password;
        }
        if let Some(database) = self.lookup(&prefix, "DATABASE") {
            config.database = database;
        }
        if let Some(sslmode) = self.lookup(&prefix, "SSLMODE") {
            config.sslmode = sslmode;
        }
        if let Some(max_open) = self.lookup_parsed(&prefix, "MAX_OPEN_CONNS") {
            config.max_open_conns = max_open;
        }
        if let Some(max_idle) = self.lookup_parsed(&prefix, "MAX_IDLE_CONNS") {
            config.max_idle_conns = max_idle;
        }

        Ok(config)
    }

    fn lookup(&self, prefix: &str, param: &str) -> Option<String> {
        self.source
            .get(&format!("{}{}", prefix, param))
            .filter(|value| !value.is_empty())
    }

    /// Unparsable numbers keep the default
    fn lookup_parsed<T: std::str::FromStr>(&self, prefix: &str, param: &str) -> Option<T> {
        self.lookup(prefix, param)?.trim().parse().ok()
    }
}

impl Default for ConfigResolver {
    fn default() -> Self {
        Self::from_env()
    }
}
