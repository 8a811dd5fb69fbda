//! pipemesh-health — liveness of registered services.
//!
//! Services are probed through their sidecar (`GET /health` with the
//! service's own host name), so a healthy answer means both the sidecar
//! and the service behind it are reachable.
//!
//! # Architecture
//!
//! - [`checker`]: one probe, and the consecutive-result tracker with
//!   exponential backoff that turns probe results into `UP`/`DOWN`.
//! - [`monitor`]: background task per registered service that feeds
//!   the tracker and writes status changes back to the registry.

pub mod checker;
pub mod monitor;

pub use checker::{HealthTracker, ProbeResult, check_service, http_probe};
pub use monitor::{MonitorSettings, ServiceHealthMonitor};
