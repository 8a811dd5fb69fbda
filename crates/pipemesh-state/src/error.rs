//! Errors raised by the pipemesh state store.

use thiserror::Error;

pub type StateResult<T> = Result<T, StateError>;

/// Failure of a redb operation or of the JSON codec around it.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("cannot open state database: {0}")]
    Open(String),

    #[error("state transaction failed: {0}")]
    Transaction(String),

    #[error("cannot open state table: {0}")]
    Table(String),

    #[error("state read failed: {0}")]
    Read(String),

    #[error("state write failed: {0}")]
    Write(String),

    #[error("cannot encode record: {0}")]
    Serialize(String),

    #[error("stored record is unreadable: {0}")]
    Deserialize(String),
}
