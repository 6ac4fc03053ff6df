//! Errors raised while constructing or parsing core types.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid session id: {0}")]
    InvalidSessionId(String),

    #[error("invalid subject reference: {0}")]
    InvalidSubjectRef(String),

    #[error("unknown session status: {0}")]
    UnknownStatus(String),

    #[error("invalid artifact payload: {0}")]
    InvalidPayload(String),

    #[error("randomness source failed: {0}")]
    Randomness(String),
}
