// Process configuration
// Metadata store location and the HTTP / MCP listen addresses, read from the environment

use std::path::PathBuf;
use thiserror::Error;

use crate::db::config::{EnvSource, ParamSource};
use crate::storage::{get_default_db_path, StorageError};

pub const ENV_DB_PATH: &str = "REGISTRY_DB_PATH";
pub const ENV_HTTP_HOST: &str = "HTTP_API_HOST";
pub const ENV_HTTP_PORT: &str = "HTTP_API_PORT";
pub const ENV_MCP_PORT: &str = "MCP_PORT";

pub const DEFAULT_HTTP_HOST: &str = "0.0.0.0";
pub const DEFAULT_HTTP_PORT: u16 = 8080;
pub const DEFAULT_MCP_PORT: u16 = 3000;

#[derive(Error, Debug)]
pub enum AppConfigError {
    #[error("invalid {key} value {value:?}: expected a port number")]
    InvalidPort { key: &'static str, value: String },
    #[error("cannot resolve metadata store path: {0}")]
    DbPath(#[from] StorageError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub db_path: PathBuf,
    pub http_host: String,
    pub http_port: u16,
    /// MCP streamable HTTP endpoint, served on the same host
    pub mcp_port: u16,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, AppConfigError> {
        Self::from_source(&EnvSource)
    }

    pub fn from_source(source: &dyn ParamSource) -> Result<Self, AppConfigError> {
        let non_empty = |key: &str| source.get(key).filter(|v| !v.trim().is_empty());

        let db_path = match non_empty(ENV_DB_PATH) {
            Some(path) => PathBuf::from(path),
            None => get_default_db_path()?,
        };

        let http_host = non_empty(ENV_HTTP_HOST).unwrap_or_else(|| DEFAULT_HTTP_HOST.to_string());

        let port = |key: &'static str, default: u16| match non_empty(key) {
            Some(value) => value
                .trim()
                .parse()
                .map_err(|_| AppConfigError::InvalidPort { key, value }),
            None => Ok(default),
        };

        Ok(Self {
            db_path,
            http_host,
            http_port: port(ENV_HTTP_PORT, DEFAULT_HTTP_PORT)?,
            mcp_port: port(ENV_MCP_PORT, DEFAULT_MCP_PORT)?,
        })
    }

    /// `host:port` for the HTTP listener; host names are resolved at bind time
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.http_host, self.http_port)
    }

    pub fn mcp_listen_addr(&self) -> String {
        format!("{}:{}", self.http_host, self.mcp_port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::config::MapSource;

    #[test]
    fn test_explicit_values() {
        let source = MapSource::new()
            .with(ENV_DB_PATH, "/tmp/registry-test.db")
            .with(ENV_HTTP_HOST, "127.0.0.1")
            .with(ENV_HTTP_PORT, "9090")
            .with(ENV_MCP_PORT, "3100");

        let config = AppConfig::from_source(&source).unwrap();
        assert_eq!(config.db_path, PathBuf::from("/tmp/registry-test.db"));
        assert_eq!(config.listen_addr(), "127.0.0.1:9090");
        assert_eq!(config.mcp_listen_addr(), "127.0.0.1:3100");
    }

    #[test]
    fn test_defaults() {
        let source = MapSource::new().with(ENV_DB_PATH, "registry.db");
        let config = AppConfig::from_source(&source).unwrap();

        assert_eq!(config.http_host, "0.0.0.0");
        assert_eq!(config.http_port, 8080);
        assert_eq!(config.mcp_port, 3000);
    }

    #[test]
    fn test_invalid_port() {
        let source = MapSource::new()
            .with(ENV_DB_PATH, "registry.db")
            .with(ENV_HTTP_PORT, "eighty");

        let err = AppConfig::from_source(&source).unwrap_err();
        assert!(matches!(err, AppConfigError::InvalidPort { .. }));
        assert!(err.to_string().contains("eighty"));

        let source = MapSource::new()
            .with(ENV_DB_PATH, "registry.db")
            .with(ENV_MCP_PORT, "99999");
        let err = AppConfig::from_source(&source).unwrap_err();
        assert!(matches!(err, AppConfigError::InvalidPort { key: ENV_MCP_PORT, .. }));
    }
}
