// HTTP API
// axum routes exposing instance registration and the query router

pub mod handlers;
pub mod models;

use axum::{
    routing::{get, post},
    Router,
};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;

use crate::manager::InstanceManager;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<InstanceManager>,
}

impl AppState {
    pub fn new(manager: Arc<InstanceManager>) -> Self {
        Self { manager }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route(
            "/api/v1/instances",
            post(handlers::register_instance).get(handlers::list_instances),
        )
        .route("/api/v1/instances/{name}", get(handlers::get_instance))
        .route("/api/v1/query", post(handlers::query))
        .route("/api/v1/actions", get(handlers::list_actions))
        .with_state(state)
}

/// Serve until `shutdown` resolves, then drain in-flight requests
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        tracing::info!("[Api] Listening on http://{}", addr);
    }

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
}
