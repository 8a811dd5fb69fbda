//! pipemesh-mesh — proxy configuration derived from the registry.
//!
//! Every sidecar proxy polls the control plane for three documents:
//!
//! - **clusters**: one upstream group per known runtime, plus one static
//!   cluster per live gateway instance so replies can reach the exact
//!   gateway process that issued a call.
//! - **routes**: one virtual host per other runtime, keyed by its name,
//!   and a catch-all host that loops back to the local application.
//! - **registration**: the sidecar-facing host list of a logical service.
//!
//! Generation is a pure function of one registry snapshot and the
//! requesting node. Output ordering is fixed, so repeated calls against
//! the same snapshot serialize to identical bytes.

pub mod documents;
pub mod generator;
pub mod service_key;

pub use documents::{
    Cluster, ClusterConfig, ClusterHost, Route, RouteConfig, ServiceConfig, ServiceHost,
    VirtualHost,
};
pub use generator::MeshConfigGenerator;
pub use service_key::{ServiceKey, ServiceTransport};
