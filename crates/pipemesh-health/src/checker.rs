//! Health check probe logic.
//!
//! Performs HTTP health checks against a service's sidecar with
//! configurable thresholds and exponential backoff.

use std::time::Duration;

use http::Method;
use tracing::{debug, warn};

use pipemesh_core::TraceHeaders;
use pipemesh_core::http::{self as mesh_http, HttpCall};
use pipemesh_registry::ServiceRegistry;
use pipemesh_state::{ServiceRegistryEntry, ServiceStatus};

/// Result of a single health probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeResult {
    /// The health endpoint returned 2xx.
    Healthy,
    /// The health endpoint returned non-2xx.
    Unhealthy,
    /// The probe could not be executed (connection error or timeout).
    Failed,
}

/// Tracks consecutive probe results for a single service.
#[derive(Debug)]
pub struct HealthTracker {
    /// `None` until the first probe.
    status: Option<ServiceStatus>,
    consecutive_failures: u32,
    unhealthy_threshold: u32,
    current_backoff: Duration,
    base_interval: Duration,
    max_backoff: Duration,
}

impl HealthTracker {
    pub fn new(unhealthy_threshold: u32, interval: Duration) -> Self {
        Self {
            status: None,
            consecutive_failures: 0,
            unhealthy_threshold: unhealthy_threshold.max(1),
            current_backoff: interval,
            base_interval: interval,
            max_backoff: Duration::from_secs(60),
        }
    }

    /// Record a probe result and return the new status.
    ///
    /// One success is enough to be `UP`; `DOWN` needs `unhealthy_threshold`
    /// failures in a row.
    pub fn record(&mut self, result: ProbeResult) -> Option<ServiceStatus> {
        match result {
            ProbeResult::Healthy => {
                self.consecutive_failures = 0;
                self.current_backoff = self.base_interval;
                if self.status != Some(ServiceStatus::Up) {
                    debug!("service recovered to UP");
                }
                self.status = Some(ServiceStatus::Up);
            }
            ProbeResult::Unhealthy | ProbeResult::Failed => {
                self.consecutive_failures += 1;
                // Exponential backoff: double the interval up to max.
                self.current_backoff = (self.current_backoff * 2).min(self.max_backoff);

                if self.consecutive_failures >= self.unhealthy_threshold {
                    if self.status != Some(ServiceStatus::Down) {
                        warn!(
                            failures = self.consecutive_failures,
                            threshold = self.unhealthy_threshold,
                            "service marked DOWN"
                        );
                    }
                    self.status = Some(ServiceStatus::Down);
                }
            }
        }
        self.status
    }

    pub fn status(&self) -> Option<ServiceStatus> {
        self.status
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Current backoff interval before next check.
    pub fn next_interval(&self) -> Duration {
        self.current_backoff
    }
}

/// Probe `GET http://{address}/health` with `Host: {authority}`.
pub async fn http_probe(address: &str, authority: &str, timeout: Duration) -> ProbeResult {
    let call = HttpCall::new(Method::GET, address, "/health", timeout).authority(authority);
    match mesh_http::send(call, &TraceHeaders::default()).await {
        Ok(reply) if reply.is_success() => ProbeResult::Healthy,
        Ok(reply) => {
            debug!(status = %reply.status, %address, "health probe non-2xx");
            ProbeResult::Unhealthy
        }
        Err(e) => {
            debug!(error = %e, %address, "health probe failed");
            ProbeResult::Failed
        }
    }
}

/// Sidecar address and routing host of a registered service.
pub(crate) fn probe_target(entry: &ServiceRegistryEntry) -> (String, String) {
    (
        format!("{}:{}", entry.ip, entry.sidecar_http_port),
        format!("http-{}", entry.service_id),
    )
}

/// Check one registered service now and record the result.
///
/// The local service is `UP` without a probe. Returns `None` for an
/// unknown service id.
pub async fn check_service(
    services: &ServiceRegistry,
    self_service_id: &str,
    service_id: &str,
    timeout: Duration,
) -> Option<ServiceStatus> {
    let entry = services.get(service_id)?;
    let status = if entry.service_id == self_service_id {
        ServiceStatus::Up
    } else {
        let (address, authority) = probe_target(&entry);
        match http_probe(&address, &authority, timeout).await {
            ProbeResult::Healthy => ServiceStatus::Up,
            ProbeResult::Unhealthy | ProbeResult::Failed => ServiceStatus::Down,
        }
    };
    services.set_status(service_id, status);
    Some(status)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipemesh_state::RuntimeKind;

    fn tracker() -> HealthTracker {
        HealthTracker::new(3, Duration::from_secs(1))
    }

    #[test]
    fn tracker_starts_unknown() {
        let tracker = tracker();
        assert_eq!(tracker.status(), None);
        assert_eq!(tracker.consecutive_failures(), 0);
    }

    #[test]
    fn tracker_stays_up_under_threshold() {
        let mut tracker = tracker();
        tracker.record(ProbeResult::Healthy);
        tracker.record(ProbeResult::Unhealthy);
        tracker.record(ProbeResult::Failed);
        assert_eq!(tracker.status(), Some(ServiceStatus::Up));
        assert_eq!(tracker.consecutive_failures(), 2);
    }

    #[test]
    fn tracker_goes_down_at_threshold_and_recovers() {
        let mut tracker = tracker();
        for _ in 0..3 {
            tracker.record(ProbeResult::Unhealthy);
        }
        assert_eq!(tracker.status(), Some(ServiceStatus::Down));
        assert_eq!(tracker.record(ProbeResult::Healthy), Some(ServiceStatus::Up));
    }

    #[test]
    fn tracker_backoff_doubles_caps_and_resets() {
        let mut tracker = HealthTracker::new(100, Duration::from_secs(1));
        tracker.record(ProbeResult::Failed);
        assert_eq!(tracker.next_interval(), Duration::from_secs(2));
        for _ in 0..10 {
            tracker.record(ProbeResult::Failed);
        }
        assert_eq!(tracker.next_interval(), Duration::from_secs(60));
        tracker.record(ProbeResult::Healthy);
        assert_eq!(tracker.next_interval(), Duration::from_secs(1));
    }

    fn entry(id: &str, ip: &str, port: u16) -> ServiceRegistryEntry {
        ServiceRegistryEntry {
            service_id: id.to_string(),
            service_type: RuntimeKind::Model,
            service_name: "iris".to_string(),
            service_version: None,
            ip: ip.to_string(),
            host_ip: None,
            sidecar_admin_port: None,
            sidecar_http_port: port,
            sidecar_grpc_port: 8081,
            service_http_port: 9090,
            service_grpc_port: 9091,
            uses_http: true,
            uses_grpc: false,
            last_known_status: ServiceStatus::Down,
            service_uuid: String::new(),
        }
    }

    #[tokio::test]
    async fn self_check_short_circuits_to_up() {
        let services = ServiceRegistry::new();
        // Port 9 on a TEST-NET address would never answer.
        services.register(entry("me", "192.0.2.1", 9));
        let status = check_service(&services, "me", "me", Duration::from_millis(10)).await;
        assert_eq!(status, Some(ServiceStatus::Up));
        assert_eq!(services.get("me").unwrap().last_known_status, ServiceStatus::Up);
    }

    #[tokio::test]
    async fn unreachable_service_is_marked_down() {
        let closed = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let services = ServiceRegistry::new();
        services.register(entry("other", "127.0.0.1", closed));
        services.set_status("other", ServiceStatus::Up);

        let status = check_service(&services, "me", "other", Duration::from_secs(1)).await;
        assert_eq!(status, Some(ServiceStatus::Down));
        assert_eq!(services.get("other").unwrap().last_known_status, ServiceStatus::Down);
    }

    #[tokio::test]
    async fn unknown_service_is_none() {
        let services = ServiceRegistry::new();
        assert_eq!(check_service(&services, "me", "ghost", Duration::from_secs(1)).await, None);
    }

    #[test]
    fn probe_targets_sidecar_with_service_host() {
        let (address, authority) = probe_target(&entry("svc-1", "10.0.0.4", 8080));
        assert_eq!(address, "10.0.0.4:8080");
        assert_eq!(authority, "http-svc-1");
    }
}
