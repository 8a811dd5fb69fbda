//! Construction and stepping of pipeline envelopes.

use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::Value;
use uuid::Uuid;

use pipemesh_state::PipelineDefinition;

use crate::error::{PipelineError, PipelineResult};
use crate::proto::{Envelope, EnvelopeError, Stage};

/// A fresh, globally unique request id.
pub fn new_request_id() -> String {
    Uuid::new_v4().to_string()
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

impl Stage {
    /// Split a chain entry `runtime[/sub/path]` into destination and action.
    pub fn from_chain_entry(entry: &str) -> Self {
        let entry = entry.trim_start_matches('/');
        let (destination, action) = entry.split_once('/').unwrap_or((entry, ""));
        Stage {
            destination: destination.to_string(),
            action: action.to_string(),
        }
    }

    /// Request path on the destination: `/{action}`.
    pub fn path(&self) -> String {
        format!("/{}", self.action)
    }
}

impl Envelope {
    /// Build the ingress envelope for `pipeline` at stage 0.
    pub fn start(
        pipeline: &PipelineDefinition,
        gateway_destination: &str,
        payload: &Value,
    ) -> PipelineResult<Self> {
        if pipeline.chain.is_empty() {
            return Err(PipelineError::Rejected(format!(
                "pipeline {} has no stages",
                pipeline.name
            )));
        }
        Ok(Envelope {
            request_id: new_request_id(),
            created_at_ms: now_ms(),
            gateway_destination: gateway_destination.to_string(),
            stages: pipeline.chain.iter().map(|e| Stage::from_chain_entry(e)).collect(),
            stage_sequence: 0,
            payload: serde_json::to_vec(payload)?,
            error: None,
        })
    }

    /// The stage at the current index, if the index is in bounds.
    pub fn current_stage(&self) -> Option<&Stage> {
        self.stages.get(self.stage_sequence as usize)
    }

    pub fn validate_sequence(&self) -> PipelineResult<&Stage> {
        self.current_stage().ok_or(PipelineError::InvalidSequence {
            index: self.stage_sequence,
            len: self.stages.len(),
        })
    }

    /// True once every stage has run.
    pub fn is_delivered(&self) -> bool {
        self.stage_sequence as usize >= self.stages.len()
    }

    /// Where this envelope goes next: the current stage, or the gateway
    /// once delivered or failed.
    pub fn next_destination(&self) -> &str {
        match self.current_stage() {
            Some(stage) if self.error.is_none() => &stage.destination,
            _ => &self.gateway_destination,
        }
    }

    /// The envelope for the next hop, carrying `output`.
    pub fn advance(&self, output: &Value) -> PipelineResult<Envelope> {
        let mut next = self.clone();
        next.payload = serde_json::to_vec(output)?;
        next.stage_sequence = self.stage_sequence + 1;
        Ok(next)
    }

    /// A copy carrying a terminal error attributed to `source_address`.
    pub fn fail(&self, message: impl Into<String>, source_address: &str) -> Envelope {
        let mut failed = self.clone();
        failed.error = Some(EnvelopeError {
            message: message.into(),
            source_address: source_address.to_string(),
        });
        failed
    }

    pub fn payload_json(&self) -> PipelineResult<Value> {
        Ok(serde_json::from_slice(&self.payload)?)
    }

    /// The caller-facing outcome of an envelope that arrived at the gateway.
    pub fn into_result(self) -> PipelineResult<Value> {
        match self.error {
            Some(err) => Err(PipelineError::Upstream {
                origin: err.source_address,
                message: err.message,
            }),
            None => self.payload_json(),
        }
    }
}
