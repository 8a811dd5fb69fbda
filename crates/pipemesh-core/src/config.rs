//! pipemesh.toml configuration parser.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipemeshConfig {
    pub node: NodeConfig,
    pub sidecar: SidecarConfig,
    pub manager: ManagerConfig,
    pub gateway: GatewayConfig,
    pub runtime: RuntimeConfig,
    pub health: HealthConfig,
}

/// Identity of the local process inside the mesh.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Instance id; doubles as the reply address stamped into envelopes.
    pub service_id: String,
    /// Logical runtime name this instance belongs to.
    pub service_name: String,
    /// Runtime kind: "model", "gateway", "manager".
    pub kind: String,
    /// Address other components use to reach this instance.
    pub host: String,
}

/// Where the co-located sidecar proxy listens.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SidecarConfig {
    pub host: String,
    pub http_port: u16,
    pub grpc_port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// `host:port` of the manager REST API.
    pub address: String,
    pub gateway_service_name: String,
    pub refresh_interval: String,
    pub connect_timeout_ms: u64,
    /// Host advertised to deployed runtimes as `MANAGER_HOST`.
    pub exposed_host: String,
    /// Port advertised to deployed runtimes as `MANAGER_PORT`.
    pub exposed_port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub request_timeout: String,
    pub pipeline_sync_interval: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Stage executor key: "echo", "tag", "http".
    pub executor: String,
    pub max_concurrency: usize,
    /// Port of the local model application (used by the http executor).
    pub app_port: u16,
    /// Field stamped by the tag executor.
    pub tag_field: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    pub interval: String,
    pub timeout: String,
    pub unhealthy_threshold: u32,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            service_id: "local".to_string(),
            service_name: "local".to_string(),
            kind: "model".to_string(),
            host: "127.0.0.1".to_string(),
        }
    }
}

impl Default for SidecarConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            http_port: 8080,
            grpc_port: 8081,
        }
    }
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:9090".to_string(),
            gateway_service_name: "gateway".to_string(),
            refresh_interval: "10s".to_string(),
            connect_timeout_ms: 500,
            exposed_host: "127.0.0.1".to_string(),
            exposed_port: 9090,
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            request_timeout: "30s".to_string(),
            pipeline_sync_interval: "3s".to_string(),
        }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            executor: "echo".to_string(),
            max_concurrency: 64,
            app_port: 9090,
            tag_field: "served_by".to_string(),
        }
    }
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            interval: "5s".to_string(),
            timeout: "2s".to_string(),
            unhealthy_threshold: 3,
        }
    }
}

impl PipemeshConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: PipemeshConfig = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Registry refresh period, falling back to 10s on a malformed value.
    pub fn refresh_interval(&self) -> Duration {
        parse_duration(&self.manager.refresh_interval).unwrap_or(Duration::from_secs(10))
    }

    pub fn request_timeout(&self) -> Duration {
        parse_duration(&self.gateway.request_timeout).unwrap_or(Duration::from_secs(30))
    }

    pub fn pipeline_sync_interval(&self) -> Duration {
        parse_duration(&self.gateway.pipeline_sync_interval).unwrap_or(Duration::from_secs(3))
    }

    pub fn health_interval(&self) -> Duration {
        parse_duration(&self.health.interval).unwrap_or(Duration::from_secs(5))
    }

    pub fn health_timeout(&self) -> Duration {
        parse_duration(&self.health.timeout).unwrap_or(Duration::from_secs(2))
    }

    /// `host:port` of the sidecar's HTTP listener.
    pub fn sidecar_http_addr(&self) -> String {
        format!("{}:{}", self.sidecar.host, self.sidecar.http_port)
    }

    /// `host:port` of the sidecar's gRPC listener.
    pub fn sidecar_grpc_addr(&self) -> String {
        format!("{}:{}", self.sidecar.host, self.sidecar.grpc_port)
    }
}

/// Parse a duration string like "5s", "500ms", "1m".
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(secs) = s.strip_suffix('s') {
        if let Some(ms) = secs.strip_suffix('m') {
            ms.parse::<u64>().ok().map(Duration::from_millis)
        } else {
            secs.parse::<u64>().ok().map(Duration::from_secs)
        }
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.parse::<u64>().ok().map(|m| Duration::from_secs(m * 60))
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let config: PipemeshConfig = toml::from_str("").unwrap();
        assert_eq!(config.sidecar.http_port, 8080);
        assert_eq!(config.manager.gateway_service_name, "gateway");
        assert_eq!(config.refresh_interval(), Duration::from_secs(10));
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert_eq!(config.runtime.executor, "echo");
    }

    #[test]
    fn partial_section_keeps_other_defaults() {
        let toml_str = r#"
[node]
service_id = "gateway-7f2c"
kind = "gateway"

[gateway]
request_timeout = "750ms"
"#;
        let config: PipemeshConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.node.service_id, "gateway-7f2c");
        assert_eq!(config.node.host, "127.0.0.1");
        assert_eq!(config.request_timeout(), Duration::from_millis(750));
        assert_eq!(config.pipeline_sync_interval(), Duration::from_secs(3));
    }

    #[test]
    fn round_trips_through_toml() {
        let config = PipemeshConfig::default();
        let toml_str = config.to_toml_string().unwrap();
        assert!(toml_str.contains("[sidecar]"));
        let parsed: PipemeshConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.sidecar_grpc_addr(), "127.0.0.1:8081");
    }

    #[test]
    fn malformed_interval_falls_back() {
        let mut config = PipemeshConfig::default();
        config.manager.refresh_interval = "soon".to_string();
        assert_eq!(config.refresh_interval(), Duration::from_secs(10));
    }

    #[test]
    fn parse_duration_units() {
        assert_eq!(parse_duration("5s"), Some(Duration::from_secs(5)));
        assert_eq!(parse_duration("500ms"), Some(Duration::from_millis(500)));
        assert_eq!(parse_duration("2m"), Some(Duration::from_secs(120)));
        assert_eq!(parse_duration("10"), Some(Duration::from_secs(10)));
        assert_eq!(parse_duration("fast"), None);
    }
}
