//! Pipeline failure taxonomy.

use thiserror::Error;

pub type PipelineResult<T> = Result<T, PipelineError>;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum PipelineError {
    /// Unknown pipeline, endpoint or runtime.
    #[error("not found: {0}")]
    NotFound(String),

    #[error("stage index {index} out of bounds for {len} stages")]
    InvalidSequence { index: u32, len: usize },

    #[error("serialization error: {0}")]
    Serialization(String),

    /// A hop could not be sent.
    #[error("transport error: {0}")]
    Transport(String),

    /// A stage reported failure.
    #[error("stage {origin} failed: {message}")]
    Upstream { origin: String, message: String },

    #[error("no response within {0:?}")]
    Timeout(std::time::Duration),

    /// An envelope that cannot be processed at all.
    #[error("rejected envelope: {0}")]
    Rejected(String),
}

impl From<serde_json::Error> for PipelineError {
    fn from(e: serde_json::Error) -> Self {
        PipelineError::Serialization(e.to_string())
    }
}

impl From<pipemesh_core::HttpError> for PipelineError {
    fn from(e: pipemesh_core::HttpError) -> Self {
        PipelineError::Transport(e.to_string())
    }
}

impl From<PipelineError> for tonic::Status {
    fn from(e: PipelineError) -> Self {
        let message = e.to_string();
        match e {
            PipelineError::NotFound(_) => tonic::Status::not_found(message),
            PipelineError::InvalidSequence { .. }
            | PipelineError::Serialization(_)
            | PipelineError::Rejected(_) => tonic::Status::invalid_argument(message),
            PipelineError::Transport(_) => tonic::Status::unavailable(message),
            PipelineError::Upstream { .. } => tonic::Status::aborted(message),
            PipelineError::Timeout(_) => tonic::Status::deadline_exceeded(message),
        }
    }
}
