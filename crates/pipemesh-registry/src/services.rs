//! Legacy service registrations, keyed by service id.

use std::collections::BTreeMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use tracing::{debug, info};

use pipemesh_state::{RuntimeKind, ServiceRegistryEntry, ServiceStatus, stable_name};

/// Directly registered services.
///
/// Readers get a consistent copy-on-write map; every write swaps in a
/// new map.
#[derive(Default)]
pub struct ServiceRegistry {
    entries: ArcSwap<BTreeMap<String, ServiceRegistryEntry>>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a registration.
    ///
    /// A fresh registration starts `DOWN` until a health probe succeeds,
    /// and gets its stable short id derived from the logical name.
    pub fn register(&self, mut entry: ServiceRegistryEntry) -> ServiceRegistryEntry {
        entry.last_known_status = ServiceStatus::Down;
        entry.service_uuid = stable_name(&entry.logical_name());
        let stored = entry.clone();
        self.entries.rcu(|current| {
            let mut next = BTreeMap::clone(current);
            next.insert(entry.service_id.clone(), entry.clone());
            next
        });
        info!(service_id = %stored.service_id, logical = %stored.logical_name(), "service registered");
        stored
    }

    /// Remove a registration. Returns true if it existed.
    pub fn unregister(&self, service_id: &str) -> bool {
        let previous = self.entries.rcu(|current| {
            let mut next = BTreeMap::clone(current);
            next.remove(service_id);
            next
        });
        let existed = previous.contains_key(service_id);
        if existed {
            info!(%service_id, "service unregistered");
        }
        existed
    }

    /// Record the outcome of a health probe. Returns false for unknown ids.
    pub fn set_status(&self, service_id: &str, status: ServiceStatus) -> bool {
        if !self.entries.load().contains_key(service_id) {
            return false;
        }
        self.entries.rcu(|current| {
            let mut next = BTreeMap::clone(current);
            if let Some(entry) = next.get_mut(service_id) {
                entry.last_known_status = status;
            }
            next
        });
        debug!(%service_id, %status, "service status updated");
        true
    }

    pub fn get(&self, service_id: &str) -> Option<ServiceRegistryEntry> {
        self.entries.load().get(service_id).cloned()
    }

    /// All registrations, ordered by service id.
    pub fn list(&self) -> Vec<ServiceRegistryEntry> {
        self.entries.load().values().cloned().collect()
    }

    /// Registrations of one logical service, ordered by service id.
    pub fn find(&self, service_type: RuntimeKind, service_name: &str) -> Vec<ServiceRegistryEntry> {
        self.entries
            .load()
            .values()
            .filter(|e| e.service_type == service_type && e.service_name == service_name)
            .cloned()
            .collect()
    }

    /// The current map; consistent for as long as it is held.
    pub fn snapshot(&self) -> Arc<BTreeMap<String, ServiceRegistryEntry>> {
        self.entries.load_full()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipemesh_state::MAX_CLUSTER_NAME_LEN;

    fn entry(id: &str, name: &str) -> ServiceRegistryEntry {
        ServiceRegistryEntry {
            service_id: id.to_string(),
            service_type: RuntimeKind::Model,
            service_name: name.to_string(),
            service_version: None,
            ip: "10.0.0.9".to_string(),
            host_ip: None,
            sidecar_admin_port: None,
            sidecar_http_port: 8080,
            sidecar_grpc_port: 8081,
            service_http_port: 9090,
            service_grpc_port: 9091,
            uses_http: true,
            uses_grpc: false,
            last_known_status: ServiceStatus::Up,
            service_uuid: String::new(),
        }
    }

    #[test]
    fn register_starts_down_with_stable_uuid() {
        let registry = ServiceRegistry::new();
        let stored = registry.register(entry("a", "iris"));
        assert_eq!(stored.last_known_status, ServiceStatus::Down);
        assert_eq!(stored.service_uuid, stable_name("model-iris"));
        assert!(stored.service_uuid.len() <= MAX_CLUSTER_NAME_LEN);

        let again = registry.register(entry("b", "iris"));
        assert_eq!(again.service_uuid, stored.service_uuid);
    }

    #[test]
    fn set_status_and_unregister() {
        let registry = ServiceRegistry::new();
        registry.register(entry("a", "iris"));
        assert!(registry.set_status("a", ServiceStatus::Up));
        assert!(!registry.set_status("zzz", ServiceStatus::Up));
        assert_eq!(registry.get("a").unwrap().last_known_status, ServiceStatus::Up);

        assert!(registry.unregister("a"));
        assert!(!registry.unregister("a"));
        assert!(registry.list().is_empty());
    }

    #[test]
    fn find_matches_type_and_name() {
        let registry = ServiceRegistry::new();
        registry.register(entry("a", "iris"));
        registry.register(entry("b", "wine"));
        let mut gateway = entry("c", "iris");
        gateway.service_type = RuntimeKind::Gateway;
        registry.register(gateway);

        let found = registry.find(RuntimeKind::Model, "iris");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].service_id, "a");
    }
}
