//! Manager mode — the control plane.
//!
//! In this mode, the daemon:
//! 1. Opens the state store (pipelines, runtimes, instances)
//! 2. Builds the runtime registry over the store-backed driver
//! 3. Runs the registry refresh loop and the service health monitor
//! 4. Serves discovery, registration and management endpoints

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{info, warn};

use pipemesh_api::ManagerState;
use pipemesh_core::PipemeshConfig;
use pipemesh_health::{MonitorSettings, ServiceHealthMonitor};
use pipemesh_mesh::MeshConfigGenerator;
use pipemesh_registry::{RuntimeRegistry, ServiceRegistry, StoreDriver};
use pipemesh_state::StateStore;

/// Assemble the manager's state from an opened store.
pub(crate) fn build_state(config: &PipemeshConfig, store: StateStore) -> ManagerState {
    let driver = StoreDriver::new(store.clone());
    ManagerState {
        store,
        registry: Arc::new(RuntimeRegistry::new(Arc::new(driver.clone()))),
        driver,
        services: Arc::new(ServiceRegistry::new()),
        generator: MeshConfigGenerator::new(
            config.manager.gateway_service_name.clone(),
            config.manager.connect_timeout_ms,
        ),
        self_service_id: config.node.service_id.clone(),
        health_timeout: config.health_timeout(),
        exposed_host: config.manager.exposed_host.clone(),
        exposed_port: config.manager.exposed_port,
    }
}

pub async fn run_manager(config: PipemeshConfig, port: u16, data_dir: PathBuf) -> anyhow::Result<()> {
    info!("pipemesh manager starting");

    std::fs::create_dir_all(&data_dir)?;
    let db_path = data_dir.join("pipemesh.redb");
    let store = StateStore::open(&db_path)?;
    info!(path = ?db_path, "state store opened");

    let state = build_state(&config, store);

    // Prime the snapshot before serving.
    if let Err(e) = state.registry.refresh().await {
        warn!(error = %e, "initial registry refresh failed");
    }

    // ── Shutdown signal ────────────────────────────────────────
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // ── Background tasks ───────────────────────────────────────
    let registry = Arc::clone(&state.registry);
    let interval = config.refresh_interval();
    let registry_shutdown = shutdown_rx.clone();
    let registry_handle = tokio::spawn(async move {
        registry.run(interval, registry_shutdown).await;
    });

    let monitor = Arc::new(ServiceHealthMonitor::new(
        Arc::clone(&state.services),
        MonitorSettings {
            self_service_id: config.node.service_id.clone(),
            interval: config.health_interval(),
            timeout: config.health_timeout(),
            unhealthy_threshold: config.health.unhealthy_threshold,
        },
    ));
    let monitor_shutdown = shutdown_rx.clone();
    let monitor_handle = tokio::spawn(async move {
        monitor.run(monitor_shutdown).await;
    });

    // ── API server ─────────────────────────────────────────────
    let router = pipemesh_api::manager_router(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "manager API starting");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tokio::spawn(crate::shutdown_signal(shutdown_tx));
    axum::serve(listener, router)
        .with_graceful_shutdown(crate::wait_for_shutdown(shutdown_rx))
        .await?;

    let _ = registry_handle.await;
    let _ = monitor_handle.await;

    info!("pipemesh manager stopped");
    Ok(())
}
