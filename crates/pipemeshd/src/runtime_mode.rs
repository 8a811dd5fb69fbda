//! Runtime mode — one pipeline stage.
//!
//! Envelopes arrive over gRPC, run through the configured stage action
//! and are forwarded to the next destination (or back to the gateway).
//! HTTP-chain hops arrive on the HTTP listener and are answered inline.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{info, warn};

use pipemesh_api::RuntimeState;
use pipemesh_core::PipemeshConfig;
use pipemesh_pipeline::{Forwarder, GrpcSender, PipelineGrpc, StageAction};

use crate::announce::InstanceAnnouncer;

pub async fn run_runtime(config: PipemeshConfig, http_port: u16, grpc_port: u16) -> anyhow::Result<()> {
    info!(
        node = %config.node.service_id,
        runtime = %config.node.service_name,
        executor = %config.runtime.executor,
        "pipemesh runtime starting"
    );

    let action = StageAction::from_config(&config.runtime, &config.node, config.request_timeout())?;
    let forwarder = Arc::new(Forwarder::new(
        config.node.service_name.clone(),
        action.clone(),
        Arc::new(GrpcSender::new(config.sidecar_grpc_addr(), config.request_timeout())),
        config.runtime.max_concurrency,
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // ── gRPC server (envelope hops) ────────────────────────────
    let grpc_addr = SocketAddr::from(([0, 0, 0, 0], grpc_port));
    let grpc_service = PipelineGrpc::new(forwarder).into_service();
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

    // ── HTTP server (HTTP-chain hops) ──────────────────────────
    let router = pipemesh_api::runtime_router(RuntimeState {
        action: Arc::new(action),
    });
    let addr = SocketAddr::from(([0, 0, 0, 0], http_port));
    info!(%addr, "runtime HTTP listener starting");

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

    info!("pipemesh runtime stopped");
    Ok(())
}
