//! pipemeshd — the pipemesh daemon.
//!
//! One binary, three modes:
//! - `manager`: runtime registry, proxy discovery documents, service
//!   registration and health, pipeline and runtime management API
//! - `gateway`: pipeline entry point; drives HTTP chains and correlates
//!   gRPC chains
//! - `runtime`: executes one stage per envelope and forwards it on
//!
//! # Usage
//!
//! ```text
//! pipemeshd manager --port 9090 --data-dir /var/lib/pipemesh
//! pipemeshd gateway --config gateway.toml --http-port 8000 --grpc-port 9000
//! pipemeshd runtime --config model.toml --http-port 8001 --grpc-port 9001
//! ```

mod announce;
mod gateway_mode;
mod manager_mode;
mod runtime_mode;

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tracing::info;

use pipemesh_core::PipemeshConfig;

#[derive(Parser)]
#[command(name = "pipemeshd", about = "pipemesh daemon")]
struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the control plane.
    Manager {
        /// Path to pipemesh.toml.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Port to listen on.
        #[arg(long, default_value = "9090")]
        port: u16,

        /// Data directory for persistent state.
        #[arg(long, default_value = "/var/lib/pipemesh")]
        data_dir: PathBuf,
    },
    /// Run a pipeline gateway.
    Gateway {
        #[arg(long)]
        config: Option<PathBuf>,

        /// Port of the public `/serve` API.
        #[arg(long, default_value = "8000")]
        http_port: u16,

        /// Port envelopes are delivered back on.
        #[arg(long, default_value = "9000")]
        grpc_port: u16,

        /// Read pipelines from a local store instead of the manager.
        #[arg(long)]
        data_dir: Option<PathBuf>,

        /// Manager address, overriding `[manager] address`.
        #[arg(long)]
        manager: Option<String>,
    },
    /// Run a pipeline stage.
    Runtime {
        #[arg(long)]
        config: Option<PathBuf>,

        /// Port for HTTP-chain hops.
        #[arg(long, default_value = "8001")]
        http_port: u16,

        /// Port for gRPC-chain envelopes.
        #[arg(long, default_value = "9001")]
        grpc_port: u16,

        /// Stage executor, overriding `[runtime] executor`.
        #[arg(long)]
        executor: Option<String>,

        #[arg(long)]
        manager: Option<String>,
    },
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,pipemeshd=debug,pipemesh=debug"));
    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<PipemeshConfig> {
    match path {
        Some(path) => {
            let config = PipemeshConfig::from_file(path)?;
            info!(path = ?path, "configuration loaded");
            Ok(config)
        }
        None => Ok(PipemeshConfig::default()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match cli.command {
        Command::Manager {
            config,
            port,
            data_dir,
        } => {
            let config = load_config(config.as_deref())?;
            manager_mode::run_manager(config, port, data_dir).await
        }
        Command::Gateway {
            config,
            http_port,
            grpc_port,
            data_dir,
            manager,
        } => {
            let mut config = load_config(config.as_deref())?;
            if let Some(manager) = manager {
                config.manager.address = manager;
            }
            gateway_mode::run_gateway(config, http_port, grpc_port, data_dir).await
        }
        Command::Runtime {
            config,
            http_port,
            grpc_port,
            executor,
            manager,
        } => {
            let mut config = load_config(config.as_deref())?;
            if let Some(executor) = executor {
                config.runtime.executor = executor;
            }
            if let Some(manager) = manager {
                config.manager.address = manager;
            }
            runtime_mode::run_runtime(config, http_port, grpc_port).await
        }
    }
}

/// Resolves once Ctrl-C is received and tells background tasks to stop.
async fn shutdown_signal(shutdown_tx: tokio::sync::watch::Sender<bool>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl-c");
    }
    info!("shutdown signal received");
    let _ = shutdown_tx.send(true);
}

/// Completes when the shutdown flag flips.
async fn wait_for_shutdown(mut shutdown_rx: tokio::sync::watch::Receiver<bool>) {
    let _ = shutdown_rx.wait_for(|stop| *stop).await;
}
