//! Envelope transport over gRPC through the local sidecar.
//!
//! Every hop is the same `Forward` call on the same sidecar listener;
//! only the `:authority` changes, and the sidecar routes on it.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tonic::metadata::{AsciiMetadataKey, AsciiMetadataValue, MetadataMap};
use tonic::transport::{Channel, Endpoint, Uri};
use tonic::{Request, Response, Status};
use tracing::{debug, warn};

use pipemesh_core::TraceHeaders;

use crate::error::{PipelineError, PipelineResult};
use crate::proto::pipeline_service_client::PipelineServiceClient;
use crate::proto::pipeline_service_server::{PipelineService, PipelineServiceServer};
use crate::proto::{Ack, Envelope};

/// Sends an envelope towards a destination. Completes once the hop has
/// been accepted; never waits for the pipeline's result.
#[async_trait]
pub trait EnvelopeSender: Send + Sync {
    async fn send(
        &self,
        destination: &str,
        envelope: Envelope,
        trace: &TraceHeaders,
    ) -> PipelineResult<()>;
}

/// Receives envelopes arriving at this process.
pub trait EnvelopeHandler: Send + Sync {
    /// Take ownership of an inbound envelope. Must not block on
    /// downstream work.
    fn handle(&self, envelope: Envelope, trace: TraceHeaders) -> PipelineResult<()>;
}

/// [`EnvelopeSender`] that calls the sidecar's gRPC listener with the
/// destination as authority. One lazily connected channel per destination.
pub struct GrpcSender {
    sidecar: String,
    timeout: Duration,
    channels: DashMap<String, Channel>,
}

impl GrpcSender {
    /// `sidecar` is the `host:port` of the sidecar's gRPC listener.
    /// `timeout` bounds both connecting and each forward call.
    pub fn new(sidecar: impl Into<String>, timeout: Duration) -> Self {
        Self {
            sidecar: sidecar.into(),
            timeout,
            channels: DashMap::new(),
        }
    }

    fn channel(&self, destination: &str) -> PipelineResult<Channel> {
        if let Some(channel) = self.channels.get(destination) {
            return Ok(channel.clone());
        }
        let origin: Uri = format!("http://{destination}")
            .parse()
            .map_err(|e| PipelineError::Transport(format!("bad destination {destination}: {e}")))?;
        let channel = Endpoint::from_shared(format!("http://{}", self.sidecar))
            .map_err(|e| PipelineError::Transport(e.to_string()))?
            .origin(origin)
            .connect_timeout(self.timeout)
            .timeout(self.timeout)
            .connect_lazy();
        self.channels.insert(destination.to_string(), channel.clone());
        Ok(channel)
    }
}

#[async_trait]
impl EnvelopeSender for GrpcSender {
    async fn send(
        &self,
        destination: &str,
        envelope: Envelope,
        trace: &TraceHeaders,
    ) -> PipelineResult<()> {
        let request_id = envelope.request_id.clone();
        let stage = envelope.stage_sequence;
        let mut client = PipelineServiceClient::new(self.channel(destination)?);
        let mut request = Request::new(envelope);
        write_trace(request.metadata_mut(), trace);

        client
            .forward(request)
            .await
            .map_err(|s| PipelineError::Transport(format!("{destination}: {}", s.message())))?;
        debug!(%request_id, stage, %destination, "envelope forwarded");
        Ok(())
    }
}

fn write_trace(metadata: &mut MetadataMap, trace: &TraceHeaders) {
    for (name, value) in trace.iter() {
        let key = AsciiMetadataKey::from_bytes(name.to_ascii_lowercase().as_bytes());
        let value = value.parse::<AsciiMetadataValue>();
        match (key, value) {
            (Ok(key), Ok(value)) => {
                metadata.insert(key, value);
            }
            _ => warn!(header = name, "dropping trace header that is not valid metadata"),
        }
    }
}

fn read_trace(metadata: &MetadataMap) -> TraceHeaders {
    TraceHeaders::collect(|name| {
        metadata
            .get(name.to_ascii_lowercase().as_str())
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    })
}

/// The gRPC face of a gateway or runtime: acknowledges every envelope
/// at once and hands it to the local handler.
pub struct PipelineGrpc {
    handler: Arc<dyn EnvelopeHandler>,
}

impl PipelineGrpc {
    pub fn new(handler: Arc<dyn EnvelopeHandler>) -> Self {
        Self { handler }
    }

    pub fn into_service(self) -> PipelineServiceServer<Self> {
        PipelineServiceServer::new(self)
    }
}

#[tonic::async_trait]
impl PipelineService for PipelineGrpc {
    async fn forward(&self, request: Request<Envelope>) -> Result<Response<Ack>, Status> {
        let trace = read_trace(request.metadata());
        let envelope = request.into_inner();
        debug!(
            request_id = %envelope.request_id,
            stage = envelope.stage_sequence,
            headers = trace.len(),
            "envelope received"
        );
        self.handler.handle(envelope, trace)?;
        Ok(Response::new(Ack {}))
    }
}
