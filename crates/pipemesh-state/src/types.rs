//! Domain types shared by the registry, the mesh config generator, and
//! the pipeline dispatcher.
//!
//! All types are serializable to/from JSON, both for storage in redb
//! tables and for the REST surfaces.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Orchestrator-assigned runtime identifier.
pub type RuntimeId = String;

/// Identifier of one live process of a runtime.
pub type InstanceId = String;

// ── Runtime ────────────────────────────────────────────────────────

/// What a runtime does inside the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeKind {
    Model,
    Gateway,
    Manager,
    Repository,
}

impl RuntimeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuntimeKind::Model => "model",
            RuntimeKind::Gateway => "gateway",
            RuntimeKind::Manager => "manager",
            RuntimeKind::Repository => "repository",
        }
    }
}

impl fmt::Display for RuntimeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RuntimeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "model" => Ok(RuntimeKind::Model),
            "gateway" => Ok(RuntimeKind::Gateway),
            "manager" => Ok(RuntimeKind::Manager),
            "repository" => Ok(RuntimeKind::Repository),
            other => Err(format!("unknown runtime kind: {other}")),
        }
    }
}

/// A deployable runtime as the orchestrator knows it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RuntimeDefinition {
    /// Assigned once by the orchestrator, never changed afterwards.
    #[serde(default)]
    pub id: RuntimeId,
    /// Unique, human-facing name. Also the cluster and route name.
    pub name: String,
    #[serde(default = "default_scale")]
    pub scale: u32,
    pub kind: RuntimeKind,
    #[serde(default)]
    pub model_name: Option<String>,
    #[serde(default)]
    pub model_version: Option<String>,
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
    /// Container image reference.
    #[serde(default)]
    pub image: String,
    /// Port the application itself listens on.
    #[serde(default = "default_app_port")]
    pub app_port: u16,
    /// Default (legacy) HTTP port.
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    /// Last orchestrator state, e.g. "running".
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub status_text: Option<String>,
}

fn default_scale() -> u32 {
    1
}

fn default_app_port() -> u16 {
    9090
}

fn default_http_port() -> u16 {
    8080
}

// ── Instance ───────────────────────────────────────────────────────

/// Liveness as last observed, for instances and registered services.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServiceStatus {
    Up,
    #[default]
    Down,
}

impl ServiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceStatus::Up => "UP",
            ServiceStatus::Down => "DOWN",
        }
    }
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One live process of a runtime. Replaced wholesale on every refresh.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RuntimeInstance {
    pub id: InstanceId,
    /// Owning [`RuntimeDefinition::id`].
    pub runtime_id: RuntimeId,
    pub host: String,
    #[serde(default = "default_http_port")]
    pub port: u16,
    #[serde(default)]
    pub status: ServiceStatus,
    #[serde(default)]
    pub status_text: Option<String>,
}

impl RuntimeInstance {
    /// Build the composite key for the instances table.
    pub fn table_key(&self) -> String {
        format!("{}:{}", self.runtime_id, self.id)
    }

    /// `host:port` of this instance.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn is_up(&self) -> bool {
        self.status == ServiceStatus::Up
    }
}

// ── Legacy service registration ────────────────────────────────────

/// A service registered directly with the mesh (pre-orchestrator model).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceRegistryEntry {
    pub service_id: String,
    pub service_type: RuntimeKind,
    pub service_name: String,
    #[serde(default)]
    pub service_version: Option<String>,
    /// Address of the instance (and its sidecar).
    pub ip: String,
    #[serde(default)]
    pub host_ip: Option<String>,
    #[serde(default)]
    pub sidecar_admin_port: Option<u16>,
    pub sidecar_http_port: u16,
    pub sidecar_grpc_port: u16,
    pub service_http_port: u16,
    pub service_grpc_port: u16,
    #[serde(default)]
    pub uses_http: bool,
    #[serde(default)]
    pub uses_grpc: bool,
    #[serde(default)]
    pub last_known_status: ServiceStatus,
    /// Stable short name derived from [`Self::logical_name`].
    #[serde(default)]
    pub service_uuid: String,
}

impl ServiceRegistryEntry {
    /// `{serviceType}-{serviceName}`, the key sidecars look services up by.
    pub fn logical_name(&self) -> String {
        format!("{}-{}", self.service_type, self.service_name)
    }
}

// ── Pipeline ───────────────────────────────────────────────────────

/// How a pipeline's hops are chained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    /// Sequential request/response calls driven by the gateway.
    Http,
    /// Fire-and-forget envelope hops that reply to the gateway at the end.
    Grpc,
}

/// A named, ordered chain of stage destinations.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PipelineDefinition {
    pub name: String,
    pub transport: TransportKind,
    /// Each entry is `{runtime}` or `{runtime}/{sub/path}`.
    pub chain: Vec<String>,
}

impl PipelineDefinition {
    pub fn table_key(&self) -> &str {
        &self.name
    }
}
