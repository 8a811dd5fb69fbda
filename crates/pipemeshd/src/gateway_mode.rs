//! Gateway mode — the pipeline entry point.
//!
//! In this mode, the daemon:
//! 1. Syncs pipeline definitions from the manager (or a local store)
//! 2. Serves `POST /serve/{endpoint}` and drives HTTP chains itself
//! 3. Accepts returning gRPC envelopes and completes pending requests
//! 4. Registers itself as a gateway instance while running

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{info, warn};

use pipemesh_api::GatewayState;
use pipemesh_core::PipemeshConfig;
use pipemesh_pipeline::{
    Dispatcher, DispatcherConfig, GrpcSender, ManagerSource, PipelineCatalog, PipelineGrpc,
    PipelineSource, SidecarHttpHops, StoreSource,
};
use pipemesh_state::StateStore;

use crate::announce::InstanceAnnouncer;

const SWEEP_INTERVAL: Duration = Duration::from_secs(5);

pub async fn run_gateway(
    config: PipemeshConfig,
    http_port: u16,
    grpc_port: u16,
    data_dir: Option<PathBuf>,
) -> anyhow::Result<()> {
    info!(node = %config.node.service_id, "pipemesh gateway starting");
    let request_timeout = config.request_timeout();

    // ── Pipeline catalog ───────────────────────────────────────
    let source: Arc<dyn PipelineSource> = match data_dir {
        Some(dir) => {
            let db_path = dir.join("pipemesh.redb");
            let store = StateStore::open(&db_path)?;
            info!(path = ?db_path, "reading pipelines from local store");
            Arc::new(StoreSource::new(store))
        }
        None => Arc::new(ManagerSource::new(
            config.manager.address.clone(),
            config.health_timeout(),
        )),
    };
    let catalog = Arc::new(PipelineCatalog::new());
    match catalog.sync_from(source.as_ref()).await {
        Ok(count) => info!(count, "initial pipeline catalog loaded"),
        Err(e) => warn!(error = %e, "initial pipeline sync failed"),
    }

    // ── Dispatcher ─────────────────────────────────────────────
    let dispatcher = Arc::new(Dispatcher::new(
        DispatcherConfig {
            node_id: config.node.service_id.clone(),
            request_timeout,
        },
        Arc::clone(&catalog),
        Arc::new(SidecarHttpHops::new(config.sidecar_http_addr(), request_timeout)),
        Arc::new(GrpcSender::new(config.sidecar_grpc_addr(), request_timeout)),
    ));

    // ── Shutdown signal ────────────────────────────────────────
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // ── Background tasks ───────────────────────────────────────
    let sync_handle = tokio::spawn(Arc::clone(&catalog).run_sync(
        source,
        config.pipeline_sync_interval(),
        shutdown_rx.clone(),
    ));
    let sweep_handle = tokio::spawn(
        dispatcher
            .correlation()
            .clone()
            .run_sweeper(SWEEP_INTERVAL, shutdown_rx.clone()),
    );

    // ── gRPC server (returning envelopes) ──────────────────────
    let grpc_addr = SocketAddr::from(([0, 0, 0, 0], grpc_port));
    let grpc_service = PipelineGrpc::new(dispatcher.clone()).into_service();
    let grpc_shutdown = shutdown_rx.clone();
    info!(%grpc_addr, "gRPC server starting");
    let grpc_handle = tokio::spawn(async move {
        if let Err(e) = tonic::transport::Server::builder()
            .add_service(grpc_service)
            .serve_with_shutdown(grpc_addr, crate::wait_for_shutdown(grpc_shutdown))
            .await
        {
            tracing::error!(error = %e, "gRPC server error");
        }
    });

    // ── Self-registration ──────────────────────────────────────
    let announcer = InstanceAnnouncer::new(config.manager.address.clone(), config.health_timeout());
    let announced = match announcer
        .announce(
            &config.node.service_name,
            &config.node.service_id,
            &config.node.host,
            grpc_port,
        )
        .await
    {
        Ok(_) => true,
        Err(e) => {
            warn!(error = %e, "instance registration failed; continuing unregistered");
            false
        }
    };

    // ── API server ─────────────────────────────────────────────
    let router = pipemesh_api::gateway_router(GatewayState { dispatcher });
    let addr = SocketAddr::from(([0, 0, 0, 0], http_port));
    info!(%addr, "gateway API starting");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tokio::spawn(crate::shutdown_signal(shutdown_tx));
    axum::serve(listener, router)
        .with_graceful_shutdown(crate::wait_for_shutdown(shutdown_rx))
        .await?;

    if announced {
        if let Err(e) = announcer.withdraw(&config.node.service_id).await {
            warn!(error = %e, "instance deregistration failed");
        }
    }

    let _ = grpc_handle.await;
    let _ = sync_handle.await;
    let _ = sweep_handle.await;

    info!("pipemesh gateway stopped");
    Ok(())
}
