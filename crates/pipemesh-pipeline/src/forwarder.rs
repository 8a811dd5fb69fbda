//! Stage forwarder: runs one hop and passes the envelope on.
//!
//! Per envelope: validate the stage index, execute the stage action on
//! the bounded worker pool, then forward either the advanced envelope or
//! an error envelope. Forwards are fire-and-forget; nothing here waits
//! for a downstream result.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::{debug, error, warn};

use pipemesh_core::TraceHeaders;

use crate::error::{PipelineError, PipelineResult};
use crate::executor::StageAction;
use crate::proto::Envelope;
use crate::transport::{EnvelopeHandler, EnvelopeSender};

/// Where an envelope ended up after one pass through the forwarder.
#[derive(Debug, Clone, PartialEq)]
pub enum HopOutcome {
    /// Advanced and sent to the next stage, or to the gateway when it was the last one.
    Advanced { destination: String, stage_sequence: u32 },
    /// Failed here; an error envelope was sent to the gateway.
    Failed(PipelineError),
}

#[derive(Clone)]
pub struct Forwarder {
    /// Name this runtime is addressed by; reported as the source of errors.
    self_address: String,
    action: Arc<StageAction>,
    sender: Arc<dyn EnvelopeSender>,
    workers: Arc<Semaphore>,
}

impl Forwarder {
    pub fn new(
        self_address: impl Into<String>,
        action: StageAction,
        sender: Arc<dyn EnvelopeSender>,
        max_concurrency: usize,
    ) -> Self {
        Self {
            self_address: self_address.into(),
            action: Arc::new(action),
            sender,
            workers: Arc::new(Semaphore::new(max_concurrency.max(1))),
        }
    }

    pub fn self_address(&self) -> &str {
        &self.self_address
    }

    /// Process `envelope` on a background task.
    pub fn accept(&self, envelope: Envelope, trace: TraceHeaders) {
        let this = self.clone();
        tokio::spawn(async move {
            this.process(envelope, trace).await;
        });
    }

    /// Run the hop to completion.
    pub async fn process(&self, envelope: Envelope, trace: TraceHeaders) -> HopOutcome {
        let request_id = envelope.request_id.clone();

        let stage = match envelope.validate_sequence() {
            Ok(stage) => stage.clone(),
            Err(e) => return self.fail(&envelope, e, &trace).await,
        };

        let output = match self.execute(&envelope, &stage.action, &trace).await {
            Ok(output) => output,
            Err(e) => return self.fail(&envelope, e, &trace).await,
        };

        let next = match envelope.advance(&output) {
            Ok(next) => next,
            Err(e) => return self.fail(&envelope, e, &trace).await,
        };
        let destination = next.next_destination().to_string();
        let stage_sequence = next.stage_sequence;

        if let Err(e) = self.sender.send(&destination, next.clone(), &trace).await {
            warn!(%request_id, %destination, error = %e, "forward failed");
            return self.fail(&next, e, &trace).await;
        }
        debug!(%request_id, stage = stage_sequence, %destination, "hop advanced");
        HopOutcome::Advanced {
            destination,
            stage_sequence,
        }
    }

    async fn execute(
        &self,
        envelope: &Envelope,
        action: &str,
        trace: &TraceHeaders,
    ) -> PipelineResult<serde_json::Value> {
        let payload = envelope.payload_json()?;
        let _permit = self
            .workers
            .acquire()
            .await
            .map_err(|e| PipelineError::Transport(e.to_string()))?;
        self.action
            .execute(action, payload, trace)
            .await
            .map_err(|message| PipelineError::Upstream {
                origin: self.self_address.clone(),
                message,
            })
    }

    /// Send an error envelope straight to the gateway.
    async fn fail(&self, envelope: &Envelope, err: PipelineError, trace: &TraceHeaders) -> HopOutcome {
        let message = match &err {
            PipelineError::Upstream { message, .. } => message.clone(),
            other => other.to_string(),
        };
        let failed = envelope.fail(message, &self.self_address);
        let gateway = failed.gateway_destination.clone();
        warn!(request_id = %envelope.request_id, error = %err, "stage failed, reporting to gateway");
        if let Err(e) = self.sender.send(&gateway, failed, trace).await {
            error!(request_id = %envelope.request_id, %gateway, error = %e, "could not report failure to gateway");
        }
        HopOutcome::Failed(err)
    }
}

impl EnvelopeHandler for Forwarder {
    fn handle(&self, envelope: Envelope, trace: TraceHeaders) -> PipelineResult<()> {
        if envelope.gateway_destination.is_empty() {
            return Err(PipelineError::Rejected("envelope has no gateway destination".to_string()));
        }
        self.accept(envelope, trace);
        Ok(())
    }
}
