//! REST handlers for pipeline and runtime management.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracing::{info, warn};

use pipemesh_state::{PipelineDefinition, RuntimeDefinition, RuntimeInstance, StateError};

use crate::ManagerState;
use crate::response::{ApiResponse, error_response, registry_error};

fn state_error(e: &StateError) -> Response {
    error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR)
}

// ── Pipelines ──────────────────────────────────────────────────────

pub async fn list_pipelines(State(state): State<ManagerState>) -> impl IntoResponse {
    match state.store.list_pipelines() {
        Ok(pipelines) => ApiResponse::ok(pipelines).into_response(),
        Err(e) => state_error(&e),
    }
}

pub async fn get_pipeline(
    State(state): State<ManagerState>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    match state.store.get_pipeline(&name) {
        Ok(Some(pipeline)) => ApiResponse::ok(pipeline).into_response(),
        Ok(None) => error_response(&format!("pipeline {name} not found"), StatusCode::NOT_FOUND),
        Err(e) => state_error(&e),
    }
}

/// Create or replace a pipeline. Gateways pick it up on their next sync.
pub async fn put_pipeline(
    State(state): State<ManagerState>,
    Json(pipeline): Json<PipelineDefinition>,
) -> impl IntoResponse {
    if pipeline.name.trim().is_empty() {
        return error_response("pipeline name must not be empty", StatusCode::BAD_REQUEST);
    }
    if pipeline.chain.is_empty() || pipeline.chain.iter().any(|d| d.trim().is_empty()) {
        return error_response(
            "pipeline chain needs at least one non-empty destination",
            StatusCode::BAD_REQUEST,
        );
    }
    match state.store.put_pipeline(&pipeline) {
        Ok(()) => {
            info!(pipeline = %pipeline.name, hops = pipeline.chain.len(), "pipeline stored");
            (StatusCode::CREATED, ApiResponse::ok(pipeline)).into_response()
        }
        Err(e) => state_error(&e),
    }
}

pub async fn delete_pipeline(
    State(state): State<ManagerState>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    match state.store.delete_pipeline(&name) {
        Ok(true) => ApiResponse::ok("deleted").into_response(),
        Ok(false) => error_response(&format!("pipeline {name} not found"), StatusCode::NOT_FOUND),
        Err(e) => state_error(&e),
    }
}

// ── Runtimes ───────────────────────────────────────────────────────

pub async fn list_runtimes(State(state): State<ManagerState>) -> impl IntoResponse {
    ApiResponse::ok(state.registry.runtimes()).into_response()
}

pub async fn get_runtime(
    State(state): State<ManagerState>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    match state.registry.by_name(&name) {
        Some(runtime) => ApiResponse::ok(runtime).into_response(),
        None => error_response(&format!("runtime {name} not found"), StatusCode::NOT_FOUND),
    }
}

pub async fn get_runtime_by_id(
    State(state): State<ManagerState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.registry.by_id(&id) {
        Some(runtime) => ApiResponse::ok(runtime).into_response(),
        None => error_response(&format!("runtime id {id} not found"), StatusCode::NOT_FOUND),
    }
}

/// Deploy a runtime. Every runtime learns where the manager is through
/// `MANAGER_HOST` / `MANAGER_PORT` in its environment.
pub async fn deploy_runtime(
    State(state): State<ManagerState>,
    Json(mut definition): Json<RuntimeDefinition>,
) -> impl IntoResponse {
    definition
        .environment
        .insert("MANAGER_HOST".to_string(), state.exposed_host.clone());
    definition
        .environment
        .insert("MANAGER_PORT".to_string(), state.exposed_port.to_string());

    match state.registry.deploy(definition).await {
        Ok(deployed) => {
            info!(runtime = %deployed.name, id = %deployed.id, "runtime deployed");
            (StatusCode::CREATED, ApiResponse::ok(deployed)).into_response()
        }
        Err(e) => {
            warn!(error = %e, "runtime deploy failed");
            registry_error(&e)
        }
    }
}

pub async fn delete_runtime(
    State(state): State<ManagerState>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    let Some(runtime) = state.registry.by_name(&name) else {
        return error_response(&format!("runtime {name} not found"), StatusCode::NOT_FOUND);
    };
    match state.registry.delete(&runtime.id).await {
        Ok(_) => ApiResponse::ok("deleted").into_response(),
        Err(e) => registry_error(&e),
    }
}

// ── Instances ──────────────────────────────────────────────────────

/// A starting process announces itself; visible to readers immediately.
pub async fn register_instance(
    State(state): State<ManagerState>,
    Json(instance): Json<RuntimeInstance>,
) -> impl IntoResponse {
    if instance.id.is_empty() || instance.host.is_empty() {
        return error_response("instance id and host are required", StatusCode::BAD_REQUEST);
    }
    if let Err(e) = state.driver.register_instance(&instance) {
        return registry_error(&e);
    }
    match state.registry.refresh().await {
        Ok(_) => ApiResponse::ok(instance).into_response(),
        Err(e) => registry_error(&e),
    }
}

pub async fn list_instances(
    State(state): State<ManagerState>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    if state.registry.by_name(&name).is_none() {
        return error_response(&format!("runtime {name} not found"), StatusCode::NOT_FOUND);
    }
    ApiResponse::ok(state.registry.instances_for_service(&name)).into_response()
}

pub async fn deregister_instance(
    State(state): State<ManagerState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.driver.deregister_instance(&id) {
        Ok(true) => {}
        Ok(false) => {
            return error_response(&format!("instance {id} not found"), StatusCode::NOT_FOUND);
        }
        Err(e) => return registry_error(&e),
    }
    match state.registry.refresh().await {
        Ok(_) => ApiResponse::ok("deregistered").into_response(),
        Err(e) => registry_error(&e),
    }
}
