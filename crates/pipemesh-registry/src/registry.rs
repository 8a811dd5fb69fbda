//! RuntimeRegistry — periodically refreshed, lock-free readable snapshot.

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use tokio::sync::{Mutex, watch};
use tracing::{debug, info, warn};

use pipemesh_state::{RuntimeDefinition, RuntimeInstance};

use crate::driver::OrchestratorDriver;
use crate::error::RegistryResult;
use crate::snapshot::RegistrySnapshot;

/// Multiple-reader, single-writer view of the orchestrator's runtimes.
///
/// Readers never lock. Refreshes are serialized by `writer`, which also
/// holds the last published generation, so a snapshot read from the
/// driver earlier can never replace one read later.
pub struct RuntimeRegistry {
    driver: Arc<dyn OrchestratorDriver>,
    current: ArcSwap<RegistrySnapshot>,
    writer: Mutex<u64>,
}

impl RuntimeRegistry {
    /// Create a registry with an empty snapshot. Call [`refresh`](Self::refresh)
    /// or [`run`](Self::run) to populate it.
    pub fn new(driver: Arc<dyn OrchestratorDriver>) -> Self {
        Self {
            driver,
            current: ArcSwap::from_pointee(RegistrySnapshot::default()),
            writer: Mutex::new(0),
        }
    }

    pub fn driver(&self) -> &Arc<dyn OrchestratorDriver> {
        &self.driver
    }

    /// Pull everything from the driver and publish a new snapshot.
    ///
    /// On failure the current snapshot stays published untouched.
    pub async fn refresh(&self) -> RegistryResult<u64> {
        let mut last = self.writer.lock().await;
        let runtimes = self.driver.list_runtimes().await?;
        let instances = self.driver.list_instances().await?;

        let generation = *last + 1;
        let snapshot = RegistrySnapshot::build(generation, runtimes, instances);
        debug!(
            generation,
            runtimes = snapshot.runtimes().len(),
            instances = snapshot.instance_count(),
            "registry snapshot built"
        );
        self.current.store(Arc::new(snapshot));
        *last = generation;
        Ok(generation)
    }

    /// Refresh on every tick until `shutdown` flips.
    pub async fn run(self: Arc<Self>, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(interval);
        info!(?interval, "registry refresher started");
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.refresh().await {
                        warn!(error = %e, "registry refresh failed, keeping previous snapshot");
                    }
                }
                _ = shutdown.changed() => {
                    info!("registry refresher shutting down");
                    break;
                }
            }
        }
    }

    /// The currently published snapshot. Stays consistent for as long as it is held.
    pub fn snapshot(&self) -> Arc<RegistrySnapshot> {
        self.current.load_full()
    }

    pub fn by_name(&self, name: &str) -> Option<RuntimeDefinition> {
        self.current.load().by_name(name).cloned()
    }

    pub fn by_id(&self, id: &str) -> Option<RuntimeDefinition> {
        self.current.load().by_id(id).cloned()
    }

    pub fn instances_for_service(&self, name: &str) -> Vec<RuntimeInstance> {
        self.current.load().instances_for_service(name).to_vec()
    }

    pub fn instance_by_id(&self, id: &str) -> Option<RuntimeInstance> {
        self.current.load().instance_by_id(id).cloned()
    }

    pub fn runtimes(&self) -> Vec<RuntimeDefinition> {
        self.current.load().runtimes().to_vec()
    }

    /// Deploy through the driver, then refresh so readers see it at once.
    pub async fn deploy(&self, definition: RuntimeDefinition) -> RegistryResult<RuntimeDefinition> {
        let deployed = self.driver.deploy(definition).await?;
        self.refresh().await?;
        Ok(deployed)
    }

    /// Delete through the driver, then refresh.
    pub async fn delete(&self, id: &str) -> RegistryResult<bool> {
        let existed = self.driver.delete(id).await?;
        self.refresh().await?;
        Ok(existed)
    }
}
