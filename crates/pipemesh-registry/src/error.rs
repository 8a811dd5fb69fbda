//! Error types for the runtime registry and its drivers.

use pipemesh_state::StateError;
use thiserror::Error;

pub type RegistryResult<T> = Result<T, RegistryError>;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("orchestrator driver failed: {0}")]
    Driver(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid request: {0}")]
    Invalid(String),

    #[error(transparent)]
    State(#[from] StateError),
}
