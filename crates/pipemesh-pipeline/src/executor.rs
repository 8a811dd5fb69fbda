//! Stage actions a runtime can execute.
//!
//! The set is closed; the `[runtime] executor` config key picks one
//! variant at start-up.

use std::time::Duration;

use http::Method;
use serde_json::Value;

use pipemesh_core::config::{NodeConfig, RuntimeConfig};
use pipemesh_core::http::{self as mesh_http, HttpCall};
use pipemesh_core::TraceHeaders;

use crate::error::{PipelineError, PipelineResult};

#[derive(Debug, Clone, PartialEq)]
pub enum StageAction {
    /// Returns its input unchanged.
    Echo,
    /// Sets `field = value` on the payload object, or on every object of
    /// a payload array.
    Tag { field: String, value: String },
    /// POSTs the payload to the local application at `/{action}`.
    Http { address: String, timeout: Duration },
}

impl StageAction {
    /// Select the action configured for this runtime.
    pub fn from_config(
        runtime: &RuntimeConfig,
        node: &NodeConfig,
        timeout: Duration,
    ) -> PipelineResult<Self> {
        match runtime.executor.as_str() {
            "echo" => Ok(StageAction::Echo),
            "tag" => Ok(StageAction::Tag {
                field: runtime.tag_field.clone(),
                value: node.service_id.clone(),
            }),
            "http" => Ok(StageAction::Http {
                address: format!("127.0.0.1:{}", runtime.app_port),
                timeout,
            }),
            other => Err(PipelineError::NotFound(format!("stage executor {other}"))),
        }
    }

    /// Run `action` over `payload`. The error is the message reported
    /// back to the gateway.
    pub async fn execute(
        &self,
        action: &str,
        payload: Value,
        trace: &TraceHeaders,
    ) -> Result<Value, String> {
        match self {
            StageAction::Echo => Ok(payload),
            StageAction::Tag { field, value } => tag(payload, field, value),
            StageAction::Http { address, timeout } => {
                let path = format!("/{action}");
                let body = serde_json::to_vec(&payload).map_err(|e| e.to_string())?;
                let call = HttpCall::new(Method::POST, address, &path, *timeout).json(body);
                let reply = mesh_http::send(call, trace).await.map_err(|e| e.to_string())?;
                if !reply.is_success() {
                    return Err(format!("{} answered {}: {}", path, reply.status, reply.body_text()));
                }
                serde_json::from_slice(&reply.body).map_err(|e| e.to_string())
            }
        }
    }
}

fn tag(mut payload: Value, field: &str, value: &str) -> Result<Value, String> {
    match &mut payload {
        Value::Array(items) => {
            for item in items.iter_mut() {
                if let Value::Object(map) = item {
                    map.insert(field.to_string(), Value::String(value.to_string()));
                }
            }
        }
        Value::Object(map) => {
            map.insert(field.to_string(), Value::String(value.to_string()));
        }
        other => return Err(format!("cannot tag a {} payload", kind_of(other))),
    }
    Ok(payload)
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
