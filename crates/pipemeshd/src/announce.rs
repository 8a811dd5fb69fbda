//! Instance self-registration with the manager.
//!
//! A gateway or runtime process resolves its runtime by name, registers
//! itself as an `UP` instance at start, and deregisters at shutdown.

use std::time::Duration;

use anyhow::{Context, bail};
use http::Method;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::info;

use pipemesh_core::TraceHeaders;
use pipemesh_core::http::{self as mesh_http, HttpCall};
use pipemesh_state::{RuntimeDefinition, RuntimeInstance, ServiceStatus};

#[derive(Deserialize)]
struct ApiEnvelope<T> {
    success: bool,
    data: Option<T>,
    error: Option<String>,
}

pub struct InstanceAnnouncer {
    manager: String,
    timeout: Duration,
}

impl InstanceAnnouncer {
    pub fn new(manager: impl Into<String>, timeout: Duration) -> Self {
        Self {
            manager: manager.into(),
            timeout,
        }
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<Vec<u8>>,
    ) -> anyhow::Result<T> {
        let mut call = HttpCall::new(method, &self.manager, path, self.timeout);
        if let Some(body) = body {
            call = call.json(body);
        }
        let reply = mesh_http::send(call, &TraceHeaders::default())
            .await
            .with_context(|| format!("manager {} unreachable", self.manager))?;
        let envelope: ApiEnvelope<T> = serde_json::from_slice(&reply.body)
            .with_context(|| format!("manager answered {} with an unreadable body", reply.status))?;
        match (envelope.success, envelope.data) {
            (true, Some(data)) => Ok(data),
            _ => bail!(
                "manager answered {}: {}",
                reply.status,
                envelope.error.unwrap_or_default()
            ),
        }
    }

    /// Register `instance_id` as a live instance of runtime `service_name`.
    pub async fn announce(
        &self,
        service_name: &str,
        instance_id: &str,
        host: &str,
        port: u16,
    ) -> anyhow::Result<RuntimeInstance> {
        let runtime: RuntimeDefinition = self
            .call(Method::GET, &format!("/api/v1/runtime/{service_name}"), None)
            .await?;
        let instance = RuntimeInstance {
            id: instance_id.to_string(),
            runtime_id: runtime.id,
            host: host.to_string(),
            port,
            status: ServiceStatus::Up,
            status_text: None,
        };
        let registered: RuntimeInstance = self
            .call(
                Method::PUT,
                "/api/v1/runtime/instances",
                Some(serde_json::to_vec(&instance)?),
            )
            .await?;
        info!(instance = %registered.id, runtime = %service_name, "instance announced");
        Ok(registered)
    }

    pub async fn withdraw(&self, instance_id: &str) -> anyhow::Result<()> {
        let _: String = self
            .call(
                Method::DELETE,
                &format!("/api/v1/runtime/instances/{instance_id}"),
                None,
            )
            .await?;
        info!(instance = %instance_id, "instance withdrawn");
        Ok(())
    }
}
