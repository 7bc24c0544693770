// HTTP handlers for the registry API

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use tracing::{debug, error, info, warn};

use super::models::{ErrorResponse, HealthResponse, InstanceView, RegisterInstanceRequest};
use super::AppState;
use crate::db::router::{Action, QueryRequest, QueryResponse};
use crate::db::traits::DiagnosticError;
use crate::manager::ManagerError;

fn error_response(status: StatusCode, error: &str, message: impl Into<String>) -> Response {
    (status, Json(ErrorResponse::new(error, message))).into_response()
}

/// HTTP status for a failed route
pub fn status_for(err: &DiagnosticError) -> StatusCode {
    match err {
        DiagnosticError::ClientNotFound(_) | DiagnosticError::NotFound(_) => StatusCode::NOT_FOUND,
        DiagnosticError::UnsupportedAction(_) => StatusCode::BAD_REQUEST,
        DiagnosticError::UnsupportedOnVersion { .. } | DiagnosticError::ExtensionMissing(_) => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        _ => StatusCode::BAD_GATEWAY,
    }
}

/// `GET /health`
pub async fn health() -> Json<HealthResponse> {
    debug!("[Api] Health check");
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// `POST /api/v1/instances`
pub async fn register_instance(
    State(state): State<AppState>,
    body: Result<Json<RegisterInstanceRequest>, JsonRejection>,
) -> Response {
    let Json(req) = match body {
        Ok(body) => body,
        Err(rejection) => {
            return error_response(StatusCode::BAD_REQUEST, "invalid_request", rejection.body_text())
        }
    };

    if let Some(field) = req.missing_field() {
        return error_response(
            StatusCode::BAD_REQUEST,
            "invalid_request",
            format!("{} is required", field),
        );
    }

    match state.manager.register_instance(req.into()).await {
        Ok(instance) => {
            info!("[Api] Registered instance {}", instance.name);
            let view = InstanceView {
                instance,
                connected: true,
            };
            (StatusCode::CREATED, Json(view)).into_response()
        }
        Err(ManagerError::AlreadyExists(_)) => error_response(
            StatusCode::CONFLICT,
            "instance_already_exists",
            "An instance with this name already exists",
        ),
        Err(e) => {
            warn!("[Api] Registration failed: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "registration_failed", e.to_string())
        }
    }
}

/// `GET /api/v1/instances`
pub async fn list_instances(State(state): State<AppState>) -> Response {
    let instances = match state.manager.list_instances() {
        Ok(instances) => instances,
        Err(e) => {
            error!("[Api] Failed to list instances: {}", e);
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "storage_error", e.to_string());
        }
    };

    let registry = state.manager.registry();
    let mut views = Vec::with_capacity(instances.len());
    for instance in instances {
        let connected = registry.contains(&instance.name).await;
        views.push(InstanceView { instance, connected });
    }

    Json(views).into_response()
}

/// `GET /api/v1/instances/{name}`
pub async fn get_instance(State(state): State<AppState>, Path(name): Path<String>) -> Response {
    match state.manager.get_instance(&name) {
        Ok(instance) => {
            let connected = state.manager.registry().contains(&instance.name).await;
            Json(InstanceView { instance, connected }).into_response()
        }
        Err(ManagerError::InstanceNotFound(_)) => error_response(
            StatusCode::NOT_FOUND,
            "instance_not_found",
            format!("instance {} not found", name),
        ),
        Err(e) => {
            error!("[Api] Failed to load instance {}: {}", name, e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "storage_error", e.to_string())
        }
    }
}

/// `POST /api/v1/query`: always answers with the envelope
pub async fn query(
    State(state): State<AppState>,
    body: Result<Json<QueryRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match body {
        Ok(body) => body,
        Err(rejection) => {
            return error_response(StatusCode::BAD_REQUEST, "invalid_request", rejection.body_text())
        }
    };

    match state.manager.query(&request).await {
        Ok(response) => Json(response).into_response(),
        Err(ManagerError::Route(route)) => {
            (status_for(&route.source), Json(route.response)).into_response()
        }
        Err(ManagerError::InstanceNotFound(name)) => {
            let envelope = QueryResponse {
                instance: name.clone(),
                action: request.action,
                success: false,
                data: None,
                error: Some(DiagnosticError::ClientNotFound(name).to_string()),
            };
            (StatusCode::NOT_FOUND, Json(envelope)).into_response()
        }
        Err(e) => {
            error!("[Api] Query on {} failed: {}", request.instance_name, e);
            let envelope = QueryResponse {
                instance: request.instance_name,
                action: request.action,
                success: false,
                data: None,
                error: Some(e.to_string()),
            };
            (StatusCode::INTERNAL_SERVER_ERROR, Json(envelope)).into_response()
        }
    }
}

/// `GET /api/v1/actions`
pub async fn list_actions() -> Response {
    Json(Action::catalogue()).into_response()
}
