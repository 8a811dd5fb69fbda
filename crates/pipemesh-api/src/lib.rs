//! pipemesh-api — HTTP surfaces of the three daemon modes.
//!
//! # Manager routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/v1/clusters/{cluster_type}/{node}` | Proxy cluster list |
//! | GET | `/v1/routes/{config}/{cluster_type}/{node}` | Proxy virtual hosts |
//! | GET | `/v1/registration/{service_key}` | Sidecar hosts of a service |
//! | PUT | `/v1/registration` | Register a service |
//! | DELETE | `/v1/registration/{service_id}` | Unregister a service |
//! | GET | `/v1/health/{service_id}` | Probe and record service health |
//! | GET/POST | `/api/v1/pipelines` | List / create-or-update pipelines |
//! | GET/DELETE | `/api/v1/pipelines/{name}` | Get / delete a pipeline |
//! | GET/POST | `/api/v1/runtime` | List / deploy runtimes |
//! | GET/DELETE | `/api/v1/runtime/{name}` | Get / delete a runtime |
//! | GET | `/api/v1/runtime/by-id/{id}` | Get a runtime by id |
//! | PUT | `/api/v1/runtime/instances` | Register a runtime instance |
//! | GET | `/api/v1/runtime/instances/{name}` | Instances of a runtime |
//! | DELETE | `/api/v1/runtime/instances/{id}` | Deregister an instance |
//!
//! # Gateway routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | POST | `/serve/{endpoint}` | Run a pipeline |
//! | GET | `/health` | Liveness |
//!
//! # Runtime routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | POST | `/{*action}` | Execute the stage action (HTTP-chain hop) |
//! | GET | `/health` | Liveness |

pub mod handlers;
pub mod mesh;
mod response;
pub mod serve;

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::routing::{get, post, put};

use pipemesh_mesh::MeshConfigGenerator;
use pipemesh_pipeline::{Dispatcher, StageAction};
use pipemesh_registry::{RuntimeRegistry, ServiceRegistry, StoreDriver};
use pipemesh_state::StateStore;

/// Shared state of the manager's handlers.
#[derive(Clone)]
pub struct ManagerState {
    pub store: StateStore,
    pub driver: StoreDriver,
    pub registry: Arc<RuntimeRegistry>,
    pub services: Arc<ServiceRegistry>,
    pub generator: MeshConfigGenerator,
    /// Service id of the manager itself; its health check needs no probe.
    pub self_service_id: String,
    pub health_timeout: Duration,
    /// `MANAGER_HOST` / `MANAGER_PORT` handed to deployed runtimes.
    pub exposed_host: String,
    pub exposed_port: u16,
}

/// Shared state of the gateway's handlers.
#[derive(Clone)]
pub struct GatewayState {
    pub dispatcher: Arc<Dispatcher>,
}

/// Shared state of a runtime's HTTP handlers.
#[derive(Clone)]
pub struct RuntimeState {
    pub action: Arc<StageAction>,
}

/// Discovery, registration, health, pipeline and runtime management.
pub fn manager_router(state: ManagerState) -> Router {
    let mesh_routes = Router::new()
        .route("/clusters/{cluster_type}/{node}", get(mesh::clusters))
        .route("/routes/{config}/{cluster_type}/{node}", get(mesh::routes))
        .route("/registration", put(mesh::register_service))
        .route(
            "/registration/{key}",
            get(mesh::registration).delete(mesh::unregister_service),
        )
        .route("/health/{service_id}", get(mesh::health));

    let api_routes = Router::new()
        .route(
            "/pipelines",
            get(handlers::list_pipelines).post(handlers::put_pipeline),
        )
        .route(
            "/pipelines/{name}",
            get(handlers::get_pipeline).delete(handlers::delete_pipeline),
        )
        .route(
            "/runtime",
            get(handlers::list_runtimes).post(handlers::deploy_runtime),
        )
        .route(
            "/runtime/{name}",
            get(handlers::get_runtime).delete(handlers::delete_runtime),
        )
        .route("/runtime/by-id/{id}", get(handlers::get_runtime_by_id))
        .route("/runtime/instances", put(handlers::register_instance))
        .route(
            "/runtime/instances/{key}",
            get(handlers::list_instances).delete(handlers::deregister_instance),
        );

    Router::new()
        .nest("/v1", mesh_routes)
        .nest("/api/v1", api_routes)
        .route("/health", get(serve::health))
        .with_state(state)
}

/// The gateway's public surface.
pub fn gateway_router(state: GatewayState) -> Router {
    Router::new()
        .route("/serve/{endpoint}", post(serve::serve))
        .route("/health", get(serve::health))
        .with_state(state)
}

/// A runtime's HTTP surface for HTTP-chain hops.
pub fn runtime_router(state: RuntimeState) -> Router {
    Router::new()
        .route("/health", get(serve::health))
        .route("/{*action}", post(serve::execute_stage))
        .with_state(state)
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    pub(crate) fn manager_state() -> ManagerState {
        let store = StateStore::open_in_memory().unwrap();
        let driver = StoreDriver::new(store.clone());
        ManagerState {
            store,
            registry: Arc::new(RuntimeRegistry::new(Arc::new(driver.clone()))),
            driver,
            services: Arc::new(ServiceRegistry::new()),
            generator: MeshConfigGenerator::new("gateway", 500),
            self_service_id: "manager-1".to_string(),
            health_timeout: Duration::from_millis(200),
            exposed_host: "10.1.0.1".to_string(),
            exposed_port: 9090,
        }
    }
}
