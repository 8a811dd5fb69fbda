//! The gateway's view of pipeline definitions and how it is kept fresh.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use async_trait::async_trait;
use http::Method;
use serde::Deserialize;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use pipemesh_core::TraceHeaders;
use pipemesh_core::http::{self as mesh_http, HttpCall};
use pipemesh_state::{PipelineDefinition, StateStore};

use crate::error::{PipelineError, PipelineResult};

/// Name → definition, replaced wholesale on every sync.
#[derive(Default)]
pub struct PipelineCatalog {
    pipelines: ArcSwap<BTreeMap<String, PipelineDefinition>>,
}

impl PipelineCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<PipelineDefinition> {
        self.pipelines.load().get(name).cloned()
    }

    pub fn list(&self) -> Vec<PipelineDefinition> {
        self.pipelines.load().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.pipelines.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Publish a new set of definitions.
    pub fn replace(&self, pipelines: Vec<PipelineDefinition>) {
        let map = pipelines.into_iter().map(|p| (p.name.clone(), p)).collect();
        self.pipelines.store(Arc::new(map));
    }

    /// Pull from `source` once. On failure the catalog is left unchanged.
    pub async fn sync_from(&self, source: &dyn PipelineSource) -> PipelineResult<usize> {
        let pipelines = source.fetch().await?;
        let count = pipelines.len();
        self.replace(pipelines);
        debug!(count, "pipeline catalog synced");
        Ok(count)
    }

    /// Sync on every tick until `shutdown` flips.
    pub async fn run_sync(
        self: Arc<Self>,
        source: Arc<dyn PipelineSource>,
        interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut ticker = tokio::time::interval(interval);
        info!(?interval, "pipeline catalog sync started");
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.sync_from(source.as_ref()).await {
                        warn!(error = %e, "pipeline sync failed, keeping previous catalog");
                    }
                }
                _ = shutdown.changed() => {
                    info!("pipeline catalog sync shutting down");
                    break;
                }
            }
        }
    }
}

/// Where pipeline definitions come from.
#[async_trait]
pub trait PipelineSource: Send + Sync {
    async fn fetch(&self) -> PipelineResult<Vec<PipelineDefinition>>;
}

/// Reads the local state store (gateway co-located with the manager).
pub struct StoreSource {
    store: StateStore,
}

impl StoreSource {
    pub fn new(store: StateStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl PipelineSource for StoreSource {
    async fn fetch(&self) -> PipelineResult<Vec<PipelineDefinition>> {
        self.store
            .list_pipelines()
            .map_err(|e| PipelineError::Transport(e.to_string()))
    }
}

/// Polls the manager's `GET /api/v1/pipelines`.
pub struct ManagerSource {
    address: String,
    timeout: Duration,
}

impl ManagerSource {
    pub fn new(address: impl Into<String>, timeout: Duration) -> Self {
        Self {
            address: address.into(),
            timeout,
        }
    }
}

/// Envelope of every manager API response.
#[derive(Deserialize)]
struct ApiEnvelope<T> {
    success: bool,
    data: Option<T>,
    error: Option<String>,
}

#[async_trait]
impl PipelineSource for ManagerSource {
    async fn fetch(&self) -> PipelineResult<Vec<PipelineDefinition>> {
        let call = HttpCall::new(Method::GET, &self.address, "/api/v1/pipelines", self.timeout);
        let reply = mesh_http::send(call, &TraceHeaders::default()).await?;
        if !reply.is_success() {
            return Err(PipelineError::Transport(format!(
                "manager answered {}",
                reply.status
            )));
        }
        let body: ApiEnvelope<Vec<PipelineDefinition>> = serde_json::from_slice(&reply.body)?;
        match (body.success, body.data) {
            (true, Some(pipelines)) => Ok(pipelines),
            _ => Err(PipelineError::Transport(
                body.error.unwrap_or_else(|| "manager returned no data".to_string()),
            )),
        }
    }
}
