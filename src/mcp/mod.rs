// MCP Server
// Model Context Protocol front end over rmcp's streamable HTTP transport

pub mod handler;

use axum::Router;
use rmcp::transport::streamable_http_server::{
    session::local::LocalSessionManager, StreamableHttpServerConfig, StreamableHttpService,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::manager::InstanceManager;

pub use handler::{RegistryMcpHandler, INSTANCES_RESOURCE_URI};

pub const MCP_PATH: &str = "/mcp";

/// axum router with the MCP endpoint nested under `/mcp`
pub fn router(manager: Arc<InstanceManager>, shutdown: CancellationToken) -> Router {
    let handler = RegistryMcpHandler::new(manager);

    let service = StreamableHttpService::new(
        move || {
            tracing::debug!("[Mcp] Creating handler for new session");
            Ok(handler.clone())
        },
        LocalSessionManager::default().into(),
        StreamableHttpServerConfig {
            stateful_mode: true,
            sse_keep_alive: Some(std::time::Duration::from_secs(30)),
            cancellation_token: shutdown,
            ..Default::default()
        },
    );

    Router::new().nest_service(MCP_PATH, service)
}

/// Serve MCP sessions until `shutdown` is cancelled
pub async fn serve(
    listener: TcpListener,
    manager: Arc<InstanceManager>,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!("[Mcp] Listening on http://{}{}", addr, MCP_PATH);
    }

    axum::serve(listener, router(manager, shutdown.child_token()))
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
}
