//! Synchronous HTTP hops through the sidecar.

use std::time::Duration;

use async_trait::async_trait;
use http::Method;

use pipemesh_core::http::{self as mesh_http, HttpCall};
use pipemesh_core::{HttpReply, TraceHeaders};

use crate::error::PipelineResult;
use crate::proto::Stage;

/// Performs one request/response hop to a stage.
#[async_trait]
pub trait HopClient: Send + Sync {
    async fn post(&self, stage: &Stage, body: Vec<u8>, trace: &TraceHeaders) -> PipelineResult<HttpReply>;
}

/// Posts to `http://{sidecar}/{action}` with `Host: {destination}`.
pub struct SidecarHttpHops {
    sidecar: String,
    timeout: Duration,
}

impl SidecarHttpHops {
    pub fn new(sidecar: impl Into<String>, timeout: Duration) -> Self {
        Self {
            sidecar: sidecar.into(),
            timeout,
        }
    }
}

#[async_trait]
impl HopClient for SidecarHttpHops {
    async fn post(&self, stage: &Stage, body: Vec<u8>, trace: &TraceHeaders) -> PipelineResult<HttpReply> {
        let path = stage.path();
        let call = HttpCall::new(Method::POST, &self.sidecar, &path, self.timeout)
            .authority(&stage.destination)
            .json(body);
        Ok(mesh_http::send(call, trace).await?)
    }
}
