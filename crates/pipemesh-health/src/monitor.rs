//! Service health monitor: background probing of registered services.
//!
//! `ServiceHealthMonitor` keeps one probe task per registered service.
//! A reconcile pass on every interval starts tasks for new registrations
//! and stops the tasks of removed ones.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{RwLock, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use pipemesh_registry::ServiceRegistry;
use pipemesh_state::ServiceStatus;

use crate::checker::{HealthTracker, ProbeResult, http_probe, probe_target};

struct MonitorSlot {
    handle: JoinHandle<()>,
    shutdown_tx: watch::Sender<bool>,
}

#[derive(Debug, Clone)]
pub struct MonitorSettings {
    /// Id of the local service; never probed, always `UP`.
    pub self_service_id: String,
    pub interval: Duration,
    pub timeout: Duration,
    pub unhealthy_threshold: u32,
}

pub struct ServiceHealthMonitor {
    services: Arc<ServiceRegistry>,
    settings: MonitorSettings,
    /// service_id → slot.
    monitors: Arc<RwLock<HashMap<String, MonitorSlot>>>,
}

impl ServiceHealthMonitor {
    pub fn new(services: Arc<ServiceRegistry>, settings: MonitorSettings) -> Self {
        Self {
            services,
            settings,
            monitors: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Start or stop per-service tasks to match the registry.
    pub async fn reconcile(&self) {
        let registered = self.services.snapshot();
        let mut monitors = self.monitors.write().await;

        let stale: Vec<String> = monitors
            .keys()
            .filter(|id| !registered.contains_key(*id))
            .cloned()
            .collect();
        for id in stale {
            if let Some(slot) = monitors.remove(&id) {
                let _ = slot.shutdown_tx.send(true);
                slot.handle.abort();
                debug!(service_id = %id, "health monitor stopped");
            }
        }

        for id in registered.keys() {
            if monitors.contains_key(id) {
                continue;
            }
            if *id == self.settings.self_service_id {
                self.services.set_status(id, ServiceStatus::Up);
                continue;
            }
            let (shutdown_tx, shutdown_rx) = watch::channel(false);
            let handle = tokio::spawn(run_probe_loop(
                id.clone(),
                self.services.clone(),
                self.settings.clone(),
                shutdown_rx,
            ));
            monitors.insert(id.clone(), MonitorSlot { handle, shutdown_tx });
            debug!(service_id = %id, "health monitor started");
        }
    }

    /// Reconcile on every interval until `shutdown` flips, then stop all tasks.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.settings.interval);
        info!(interval = ?self.settings.interval, "service health monitor started");
        loop {
            tokio::select! {
                _ = ticker.tick() => self.reconcile().await,
                _ = shutdown.changed() => break,
            }
        }
        self.stop_all().await;
    }

    /// Stop all monitors (for graceful shutdown).
    pub async fn stop_all(&self) {
        let mut monitors = self.monitors.write().await;
        for (_, slot) in monitors.drain() {
            let _ = slot.shutdown_tx.send(true);
            slot.handle.abort();
        }
        info!("all health monitors stopped");
    }

    /// Service ids with an active monitor.
    pub async fn active_monitors(&self) -> Vec<String> {
        let monitors = self.monitors.read().await;
        let mut ids: Vec<String> = monitors.keys().cloned().collect();
        ids.sort();
        ids
    }
}

async fn run_probe_loop(
    service_id: String,
    services: Arc<ServiceRegistry>,
    settings: MonitorSettings,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut tracker = HealthTracker::new(settings.unhealthy_threshold, settings.interval);
    loop {
        let Some(entry) = services.get(&service_id) else {
            break;
        };
        let (address, authority) = probe_target(&entry);
        let result = http_probe(&address, &authority, settings.timeout).await;
        let before = tracker.status();
        if let Some(status) = tracker.record(result) {
            if before != Some(status) || entry.last_known_status != status {
                services.set_status(&service_id, status);
                info!(%service_id, %status, "service health changed");
            }
        }
        if result != ProbeResult::Healthy {
            debug!(%service_id, failures = tracker.consecutive_failures(), "health probe failed");
        }

        tokio::select! {
            _ = tokio::time::sleep(tracker.next_interval()) => {}
            _ = shutdown.changed() => break,
        }
    }
}
