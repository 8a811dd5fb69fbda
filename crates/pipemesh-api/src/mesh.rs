//! Discovery endpoints polled by sidecar proxies, plus service
//! registration and on-demand health checks.
//!
//! Discovery documents are returned bare, not wrapped in the API
//! envelope, since the proxy parses them directly.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracing::{debug, info};

use pipemesh_health::check_service;
use pipemesh_mesh::{ClusterConfig, RouteConfig, ServiceConfig};
use pipemesh_state::{ServiceRegistryEntry, ServiceStatus};

use crate::ManagerState;
use crate::response::{ApiResponse, error_response};

/// Cluster list for the proxy of `node`. The cluster type segment is
/// part of the proxy's request shape only.
pub async fn clusters(
    State(state): State<ManagerState>,
    Path((cluster_type, node)): Path<(String, String)>,
) -> Json<ClusterConfig> {
    debug!(%cluster_type, %node, "cluster discovery");
    let snapshot = state.registry.snapshot();
    Json(state.generator.clusters(&snapshot, &node))
}

/// Route table for the proxy of `node`.
pub async fn routes(
    State(state): State<ManagerState>,
    Path((config, cluster_type, node)): Path<(String, String, String)>,
) -> Json<RouteConfig> {
    debug!(%config, %cluster_type, %node, "route discovery");
    let snapshot = state.registry.snapshot();
    Json(state.generator.routes(&snapshot, &node))
}

/// Hosts of the service named by `[http-]{type}-{name}`.
pub async fn registration(
    State(state): State<ManagerState>,
    Path(key): Path<String>,
) -> Json<ServiceConfig> {
    let services = state.services.snapshot();
    Json(state.generator.registration(&services, &key))
}

/// Register a service. It stays `DOWN` until a health check passes.
pub async fn register_service(
    State(state): State<ManagerState>,
    Json(entry): Json<ServiceRegistryEntry>,
) -> impl IntoResponse {
    if entry.service_id.is_empty() || entry.service_name.is_empty() {
        return error_response("service_id and service_name are required", StatusCode::BAD_REQUEST);
    }
    let stored = state.services.register(entry);
    info!(service = %stored.service_id, name = %stored.logical_name(), "service registered");
    ApiResponse::ok(stored).into_response()
}

pub async fn unregister_service(
    State(state): State<ManagerState>,
    Path(service_id): Path<String>,
) -> impl IntoResponse {
    if state.services.unregister(&service_id) {
        ApiResponse::ok("unregistered").into_response()
    } else {
        error_response(&format!("service {service_id} not found"), StatusCode::NOT_FOUND)
    }
}

/// Probe `service_id` now and record the outcome: 200 when `UP`, 503
/// when `DOWN`.
pub async fn health(
    State(state): State<ManagerState>,
    Path(service_id): Path<String>,
) -> Response {
    let status = check_service(
        &state.services,
        &state.self_service_id,
        &service_id,
        state.health_timeout,
    )
    .await;
    match status {
        Some(ServiceStatus::Up) => (StatusCode::OK, ApiResponse::ok(ServiceStatus::Up)).into_response(),
        Some(ServiceStatus::Down) => {
            (StatusCode::SERVICE_UNAVAILABLE, ApiResponse::ok(ServiceStatus::Down)).into_response()
        }
        None => error_response(&format!("service {service_id} not found"), StatusCode::NOT_FOUND),
    }
}
