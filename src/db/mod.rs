// Database Module
// PostgreSQL instance clients, version detection, the instance registry and the query router

pub mod client;
pub mod config;
pub mod operations;
pub mod queries;
pub mod registry;
pub mod router;
pub mod traits;
pub mod types;
pub mod version;

#[cfg(test)]
pub(crate) mod fakes;

pub use client::{InstanceClient, PgClientFactory, PostgresPool};
pub use config::{ConfigResolver, ConnectionConfig, EnvSource, MapSource, ParamSource};
pub use registry::InstanceRegistry;
pub use router::{Action, ActionRequest, ActionSpec, QueryRequest, QueryResponse, QueryRouter, RouteError};
pub use traits::{ClientFactory, ClientState, DiagnosticError, DiagnosticsClient};
pub use types::*;
pub use version::ServerVersion;
