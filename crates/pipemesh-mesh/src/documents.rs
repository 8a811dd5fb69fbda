//! Wire documents of the proxy's v1 discovery API.

use serde::{Deserialize, Serialize};

pub const CLUSTER_TYPE_STATIC: &str = "static";
/// Hosts resolved later through the registration lookup.
pub const CLUSTER_TYPE_LOGICAL: &str = "sds";
pub const LB_ROUND_ROBIN: &str = "round_robin";

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ClusterConfig {
    pub clusters: Vec<Cluster>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cluster {
    pub name: String,
    #[serde(rename = "type")]
    pub cluster_type: String,
    pub connect_timeout_ms: u64,
    pub lb_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hosts: Option<Vec<ClusterHost>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_name: Option<String>,
}

impl Cluster {
    pub fn is_static(&self) -> bool {
        self.cluster_type == CLUSTER_TYPE_STATIC
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterHost {
    /// `tcp://host:port`
    pub url: String,
}

impl ClusterHost {
    pub fn tcp(host: &str, port: u16) -> Self {
        Self {
            url: format!("tcp://{host}:{port}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RouteConfig {
    pub virtual_hosts: Vec<VirtualHost>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualHost {
    pub name: String,
    pub domains: Vec<String>,
    pub routes: Vec<Route>,
}

impl VirtualHost {
    /// A host matching `domain` whose every path goes to `cluster`.
    pub fn single(name: &str, domain: &str, cluster: &str) -> Self {
        Self {
            name: name.to_string(),
            domains: vec![domain.to_string()],
            routes: vec![Route {
                prefix: "/".to_string(),
                cluster: cluster.to_string(),
            }],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    pub prefix: String,
    pub cluster: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub hosts: Vec<ServiceHost>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceHost {
    pub ip_address: String,
    pub port: u16,
}
