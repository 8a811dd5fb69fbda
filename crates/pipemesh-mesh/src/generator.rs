//! Cluster, route and registration generation over one registry snapshot.

use std::collections::BTreeMap;

use tracing::debug;

use pipemesh_registry::RegistrySnapshot;
use pipemesh_state::{
    RuntimeDefinition, RuntimeKind, RuntimeInstance, ServiceRegistryEntry, ServiceStatus,
    stable_name,
};

use crate::documents::*;
use crate::service_key::{ServiceKey, ServiceTransport};

const LOOPBACK: &str = "127.0.0.1";

/// Name of the catch-all virtual host.
pub const CATCH_ALL_VHOST: &str = "all";

/// Derives proxy documents. Holds configuration only, no state.
#[derive(Debug, Clone)]
pub struct MeshConfigGenerator {
    gateway_service_name: String,
    connect_timeout_ms: u64,
}

impl MeshConfigGenerator {
    pub fn new(gateway_service_name: impl Into<String>, connect_timeout_ms: u64) -> Self {
        Self {
            gateway_service_name: gateway_service_name.into(),
            connect_timeout_ms,
        }
    }

    /// Resolve the requesting node to the runtime it is an instance of.
    fn resolve_self<'a>(&self, snapshot: &'a RegistrySnapshot, node: &str) -> Option<&'a RuntimeDefinition> {
        let instance = snapshot.instance_by_id(node)?;
        snapshot.by_id(&instance.runtime_id)
    }

    /// Live gateway instances, in id order.
    fn live_gateways<'a>(&self, snapshot: &'a RegistrySnapshot) -> impl Iterator<Item = &'a RuntimeInstance> {
        snapshot
            .instances_for_service(&self.gateway_service_name)
            .iter()
            .filter(|i| i.is_up())
    }

    fn cluster(&self, name: &str, cluster_type: &str) -> Cluster {
        Cluster {
            name: name.to_string(),
            cluster_type: cluster_type.to_string(),
            connect_timeout_ms: self.connect_timeout_ms,
            lb_type: LB_ROUND_ROBIN.to_string(),
            hosts: None,
            service_name: None,
        }
    }

    /// Clusters for the sidecar of instance `node`.
    ///
    /// An unknown node gets an empty list: it is not configured yet.
    pub fn clusters(&self, snapshot: &RegistrySnapshot, node: &str) -> ClusterConfig {
        let Some(me) = self.resolve_self(snapshot, node) else {
            debug!(%node, "clusters requested by unknown node");
            return ClusterConfig::default();
        };

        let mut clusters: Vec<Cluster> = snapshot
            .runtimes()
            .iter()
            .map(|rt| {
                let mut cluster = if rt.name == me.name {
                    let mut c = self.cluster(&rt.name, CLUSTER_TYPE_STATIC);
                    c.hosts = Some(vec![ClusterHost::tcp(LOOPBACK, rt.app_port)]);
                    c
                } else {
                    self.cluster(&rt.name, CLUSTER_TYPE_LOGICAL)
                };
                cluster.service_name = Some(rt.name.clone());
                cluster
            })
            .collect();

        if me.kind == RuntimeKind::Model {
            let gateway_app_port = snapshot
                .by_name(&self.gateway_service_name)
                .map(|rt| rt.app_port);
            for instance in self.live_gateways(snapshot) {
                let host = match gateway_app_port {
                    Some(port) if instance.id == node => ClusterHost::tcp(LOOPBACK, port),
                    _ => ClusterHost::tcp(&instance.host, instance.port),
                };
                let mut c = self.cluster(&stable_name(&instance.id), CLUSTER_TYPE_STATIC);
                c.hosts = Some(vec![host]);
                clusters.push(c);
            }
        }

        debug!(%node, runtime = %me.name, count = clusters.len(), "clusters generated");
        ClusterConfig { clusters }
    }

    /// Virtual hosts for the sidecar of instance `node`. Per-gateway-instance
    /// virtual hosts are emitted only for model nodes, matching [`Self::clusters`].
    pub fn routes(&self, snapshot: &RegistrySnapshot, node: &str) -> RouteConfig {
        let Some(me) = self.resolve_self(snapshot, node) else {
            debug!(%node, "routes requested by unknown node");
            return RouteConfig::default();
        };

        let mut virtual_hosts: Vec<VirtualHost> = snapshot
            .runtimes()
            .iter()
            .filter(|rt| rt.name != me.name)
            .map(|rt| VirtualHost::single(&rt.name, &rt.name, &rt.name))
            .collect();

        // Per-instance gateway routes exist exactly where their clusters do.
        if me.kind == RuntimeKind::Model {
            for instance in self.live_gateways(snapshot) {
                let cluster = stable_name(&instance.id);
                virtual_hosts.push(VirtualHost::single(&cluster, &instance.id, &cluster));
            }
        }

        virtual_hosts.push(VirtualHost::single(CATCH_ALL_VHOST, "*", &me.name));

        debug!(%node, runtime = %me.name, count = virtual_hosts.len(), "routes generated");
        RouteConfig { virtual_hosts }
    }

    /// Sidecar-facing hosts of the logical service named by `key`.
    ///
    /// Only `UP` entries that speak the key's transport are returned, and
    /// only through their sidecar port. A malformed key yields no hosts.
    pub fn registration(
        &self,
        services: &BTreeMap<String, ServiceRegistryEntry>,
        key: &str,
    ) -> ServiceConfig {
        let Some(key) = ServiceKey::parse(key) else {
            debug!(%key, "unparsable service key");
            return ServiceConfig::default();
        };

        let hosts = services
            .values()
            .filter(|e| e.service_type == key.service_type && e.service_name == key.service_name)
            .filter(|e| e.last_known_status == ServiceStatus::Up)
            .filter_map(|e| {
                let port = match key.transport {
                    ServiceTransport::Http if e.uses_http => e.sidecar_http_port,
                    ServiceTransport::Grpc if e.uses_grpc => e.sidecar_grpc_port,
                    _ => return None,
                };
                Some(ServiceHost {
                    ip_address: e.ip.clone(),
                    port,
                })
            })
            .collect();

        ServiceConfig { hosts }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipemesh_state::MAX_CLUSTER_NAME_LEN;

    fn runtime(id: &str, name: &str, kind: RuntimeKind, app_port: u16) -> RuntimeDefinition {
        RuntimeDefinition {
            id: id.to_string(),
            name: name.to_string(),
            scale: 1,
            kind,
            model_name: None,
            model_version: None,
            environment: Default::default(),
            image: String::new(),
            app_port,
            http_port: 8080,
            state: None,
            status_text: None,
        }
    }

    fn instance(id: &str, runtime_id: &str, host: &str, status: ServiceStatus) -> RuntimeInstance {
        RuntimeInstance {
            id: id.to_string(),
            runtime_id: runtime_id.to_string(),
            host: host.to_string(),
            port: 8080,
            status,
            status_text: None,
        }
    }

    fn snapshot() -> RegistrySnapshot {
        RegistrySnapshot::build(
            1,
            vec![
                runtime("g", "gateway", RuntimeKind::Gateway, 9000),
                runtime("a", "classifier", RuntimeKind::Model, 9090),
                runtime("b", "scorer", RuntimeKind::Model, 9191),
            ],
            vec![
                instance("gw-1", "g", "10.0.0.10", ServiceStatus::Up),
                instance("gw-2", "g", "10.0.0.11", ServiceStatus::Down),
                instance("cls-1", "a", "10.0.0.20", ServiceStatus::Up),
                instance("sc-1", "b", "10.0.0.30", ServiceStatus::Up),
            ],
        )
    }

    fn generator() -> MeshConfigGenerator {
        MeshConfigGenerator::new("gateway", 500)
    }

    #[test]
    fn unknown_node_gets_nothing() {
        let snap = snapshot();
        assert!(generator().clusters(&snap, "ghost").clusters.is_empty());
        assert!(generator().routes(&snap, "ghost").virtual_hosts.is_empty());
    }

    #[test]
    fn self_cluster_is_static_loopback() {
        let config = generator().clusters(&snapshot(), "cls-1");
        let me = config.clusters.iter().find(|c| c.name == "classifier").unwrap();
        assert!(me.is_static());
        assert_eq!(me.hosts.as_ref().unwrap()[0].url, "tcp://127.0.0.1:9090");

        let other = config.clusters.iter().find(|c| c.name == "scorer").unwrap();
        assert_eq!(other.cluster_type, CLUSTER_TYPE_LOGICAL);
        assert!(other.hosts.is_none());
    }

    #[test]
    fn model_gets_one_cluster_per_live_gateway_instance() {
        let config = generator().clusters(&snapshot(), "cls-1");
        // 3 runtimes + gw-1 (gw-2 is down)
        assert_eq!(config.clusters.len(), 4);
        let synthetic = &config.clusters[3];
        assert_eq!(synthetic.name, stable_name("gw-1"));
        assert!(synthetic.name.len() <= MAX_CLUSTER_NAME_LEN);
        assert_eq!(synthetic.hosts.as_ref().unwrap()[0].url, "tcp://10.0.0.10:8080");
        assert!(synthetic.service_name.is_none());
    }

    #[test]
    fn gateway_node_gets_no_synthetic_clusters() {
        let config = generator().clusters(&snapshot(), "gw-1");
        assert_eq!(config.clusters.len(), 3);
    }

    #[test]
    fn routes_cover_others_gateways_and_catch_all() {
        let config = generator().routes(&snapshot(), "cls-1");
        let names: Vec<&str> = config.virtual_hosts.iter().map(|v| v.name.as_str()).collect();
        let gw_cluster = stable_name("gw-1");
        assert_eq!(names, vec!["gateway", "scorer", gw_cluster.as_str(), CATCH_ALL_VHOST]);

        let gw = &config.virtual_hosts[2];
        assert_eq!(gw.domains, vec!["gw-1".to_string()]);
        assert_eq!(gw.routes[0].cluster, gw_cluster);

        let all = config.virtual_hosts.last().unwrap();
        assert_eq!(all.domains, vec!["*".to_string()]);
        assert_eq!(all.routes[0].cluster, "classifier");
    }

    #[test]
    fn gateway_node_routes_have_no_per_instance_hosts() {
        let config = generator().routes(&snapshot(), "gw-1");
        let names: Vec<&str> = config.virtual_hosts.iter().map(|v| v.name.as_str()).collect();
        assert!(!names.contains(&stable_name("gw-1").as_str()));
        let clusters = generator().clusters(&snapshot(), "gw-1");
        for vhost in &config.virtual_hosts {
            assert!(clusters.clusters.iter().any(|c| c.name == vhost.routes[0].cluster));
        }
    }

    #[test]
    fn repeated_generation_is_byte_identical() {
        let snap = snapshot();
        let generator = generator();
        let c1 = serde_json::to_vec(&generator.clusters(&snap, "cls-1")).unwrap();
        let c2 = serde_json::to_vec(&generator.clusters(&snap, "cls-1")).unwrap();
        assert_eq!(c1, c2);
        let r1 = serde_json::to_vec(&generator.routes(&snap, "sc-1")).unwrap();
        let r2 = serde_json::to_vec(&generator.routes(&snap, "sc-1")).unwrap();
        assert_eq!(r1, r2);
    }

    fn service(id: &str, name: &str, status: ServiceStatus, http: bool, grpc: bool) -> ServiceRegistryEntry {
        ServiceRegistryEntry {
            service_id: id.to_string(),
            service_type: RuntimeKind::Model,
            service_name: name.to_string(),
            service_version: None,
            ip: format!("10.1.0.{}", id.len()),
            host_ip: None,
            sidecar_admin_port: None,
            sidecar_http_port: 8080,
            sidecar_grpc_port: 8081,
            service_http_port: 9090,
            service_grpc_port: 9091,
            uses_http: http,
            uses_grpc: grpc,
            last_known_status: status,
            service_uuid: String::new(),
        }
    }

    fn services() -> BTreeMap<String, ServiceRegistryEntry> {
        [
            service("a", "foo", ServiceStatus::Up, true, false),
            service("bb", "foo", ServiceStatus::Up, false, true),
            service("ccc", "foo", ServiceStatus::Down, true, true),
            service("dddd", "bar", ServiceStatus::Up, true, true),
        ]
        .into_iter()
        .map(|e| (e.service_id.clone(), e))
        .collect()
    }

    #[test]
    fn http_lookup_returns_only_up_http_entries_on_sidecar_port() {
        let config = generator().registration(&services(), "http-model-foo");
        assert_eq!(
            config.hosts,
            vec![ServiceHost {
                ip_address: "10.1.0.1".to_string(),
                port: 8080
            }]
        );
    }

    #[test]
    fn grpc_lookup_uses_grpc_sidecar_port() {
        let config = generator().registration(&services(), "model-foo");
        assert_eq!(config.hosts.len(), 1);
        assert_eq!(config.hosts[0].port, 8081);
        assert_eq!(config.hosts[0].ip_address, "10.1.0.2");
    }

    #[test]
    fn malformed_key_returns_no_hosts() {
        assert!(generator().registration(&services(), "nonsense").hosts.is_empty());
    }

    #[test]
    fn registration_is_deterministic() {
        let services = services();
        let a = serde_json::to_vec(&generator().registration(&services, "http-model-bar")).unwrap();
        let b = serde_json::to_vec(&generator().registration(&services, "http-model-bar")).unwrap();
        assert_eq!(a, b);
    }
}
