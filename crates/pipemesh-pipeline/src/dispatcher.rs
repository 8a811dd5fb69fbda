//! Gateway dispatcher: named request in, single response out.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use pipemesh_core::TraceHeaders;
use pipemesh_state::{PipelineDefinition, TransportKind};

use crate::catalog::PipelineCatalog;
use crate::correlation::CorrelationTable;
use crate::error::{PipelineError, PipelineResult};
use crate::hops::HopClient;
use crate::proto::Envelope;
use crate::transport::{EnvelopeHandler, EnvelopeSender};

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// This gateway instance's id; stamped into envelopes as the return address.
    pub node_id: String,
    /// Deadline of gRPC-chain requests.
    pub request_timeout: Duration,
}

pub struct Dispatcher {
    config: DispatcherConfig,
    catalog: Arc<PipelineCatalog>,
    correlation: CorrelationTable,
    hops: Arc<dyn HopClient>,
    sender: Arc<dyn EnvelopeSender>,
}

impl Dispatcher {
    pub fn new(
        config: DispatcherConfig,
        catalog: Arc<PipelineCatalog>,
        hops: Arc<dyn HopClient>,
        sender: Arc<dyn EnvelopeSender>,
    ) -> Self {
        Self {
            config,
            catalog,
            correlation: CorrelationTable::new(),
            hops,
            sender,
        }
    }

    pub fn catalog(&self) -> &Arc<PipelineCatalog> {
        &self.catalog
    }

    pub fn correlation(&self) -> &CorrelationTable {
        &self.correlation
    }

    pub fn node_id(&self) -> &str {
        &self.config.node_id
    }

    /// Run the pipeline named `endpoint` over `payload`.
    pub async fn dispatch(&self, endpoint: &str, payload: Value, trace: TraceHeaders) -> PipelineResult<Value> {
        let pipeline = self
            .catalog
            .get(endpoint)
            .ok_or_else(|| PipelineError::NotFound(format!("endpoint {endpoint}")))?;
        let envelope = Envelope::start(&pipeline, &self.config.node_id, &payload)?;
        info!(
            request_id = %envelope.request_id,
            %endpoint,
            stages = envelope.stages.len(),
            transport = ?pipeline.transport,
            "dispatching"
        );
        match pipeline.transport {
            TransportKind::Http => self.http_chain(&pipeline, envelope, &trace).await,
            TransportKind::Grpc => self.grpc_chain(envelope, &trace).await,
        }
    }

    /// Call each stage in turn, feeding every response to the next stage.
    async fn http_chain(
        &self,
        pipeline: &PipelineDefinition,
        envelope: Envelope,
        trace: &TraceHeaders,
    ) -> PipelineResult<Value> {
        let mut body = envelope.payload;
        for (index, stage) in envelope.stages.iter().enumerate() {
            let reply = match self.hops.post(stage, body, trace).await {
                Ok(reply) => reply,
                Err(e) => {
                    warn!(
                        request_id = %envelope.request_id,
                        pipeline = %pipeline.name,
                        stage = index,
                        destination = %stage.destination,
                        error = %e,
                        "stage unreachable, aborting chain"
                    );
                    return Err(PipelineError::Upstream {
                        origin: stage.destination.clone(),
                        message: e.to_string(),
                    });
                }
            };
            if !reply.is_success() {
                warn!(
                    request_id = %envelope.request_id,
                    pipeline = %pipeline.name,
                    stage = index,
                    destination = %stage.destination,
                    status = %reply.status,
                    "stage failed, aborting chain"
                );
                return Err(PipelineError::Upstream {
                    origin: stage.destination.clone(),
                    message: format!("{}: {}", reply.status, reply.body_text()),
                });
            }
            debug!(request_id = %envelope.request_id, stage = index, destination = %stage.destination, "stage done");
            body = reply.body.to_vec();
        }
        Ok(serde_json::from_slice(&body)?)
    }

    /// Send to stage 0 and wait for the envelope to come back. One
    /// deadline covers both the send and the wait.
    async fn grpc_chain(&self, envelope: Envelope, trace: &TraceHeaders) -> PipelineResult<Value> {
        let timeout = self.config.request_timeout;
        let deadline = Instant::now() + timeout;
        let request_id = envelope.request_id.clone();
        let handle = self.correlation.register(&request_id, deadline);
        let destination = envelope.next_destination().to_string();
        match tokio::time::timeout_at(deadline, self.sender.send(&destination, envelope, trace)).await {
            Ok(sent) => sent?,
            Err(_) => warn!(%request_id, %destination, "send did not complete before the deadline"),
        }
        handle.wait_until(deadline, timeout).await
    }

    /// Match an inbound envelope to its waiting caller.
    pub fn deliver(&self, envelope: Envelope) -> bool {
        let request_id = envelope.request_id.clone();
        let outcome = envelope.into_result();
        if let Err(e) = &outcome {
            debug!(%request_id, error = %e, "pipeline returned an error");
        }
        let matched = self.correlation.resolve(&request_id, outcome);
        if !matched {
            warn!(%request_id, "no pending request for envelope, discarding");
        }
        matched
    }
}

impl EnvelopeHandler for Dispatcher {
    fn handle(&self, envelope: Envelope, _trace: TraceHeaders) -> PipelineResult<()> {
        self.deliver(envelope);
        Ok(())
    }
}
