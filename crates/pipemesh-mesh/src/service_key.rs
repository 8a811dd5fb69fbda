//! Parsing of service-discovery keys: `[http-]{serviceType}-{serviceName}`.

use std::fmt;

use pipemesh_state::RuntimeKind;

/// Which sidecar listener a looked-up service is reached through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceTransport {
    Http,
    Grpc,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceKey {
    pub transport: ServiceTransport,
    pub service_type: RuntimeKind,
    pub service_name: String,
}

impl ServiceKey {
    /// Parse a key. The `http-` prefix selects HTTP; without it the key
    /// names the gRPC listener. Service names may themselves contain `-`.
    pub fn parse(key: &str) -> Option<Self> {
        let (transport, rest) = match key.strip_prefix("http-") {
            Some(rest) => (ServiceTransport::Http, rest),
            None => (ServiceTransport::Grpc, key),
        };
        let (kind, name) = rest.split_once('-')?;
        if name.is_empty() {
            return None;
        }
        let service_type = kind.parse().ok()?;
        Some(Self {
            transport,
            service_type,
            service_name: name.to_string(),
        })
    }
}

impl fmt::Display for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.transport == ServiceTransport::Http {
            f.write_str("http-")?;
        }
        write!(f, "{}-{}", self.service_type, self.service_name)
    }
}
