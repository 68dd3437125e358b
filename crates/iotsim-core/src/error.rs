//! Domain error taxonomy for control-plane operations.
//!
//! Per-device telemetry failures never construct one of these — they are
//! logged and counted on the device itself. `EngineError` is only for
//! synchronous control operations that the HTTP surface maps to a status
//! code.

use thiserror::Error;

pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl EngineError {
    /// Machine-readable taxonomy tag, per the error handling design.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::InvalidArgument(_) => "invalid_argument",
            EngineError::NotFound(_) => "not_found",
            EngineError::AlreadyExists(_) => "already_exists",
            EngineError::ResourceExhausted(_) => "resource_exhausted",
            EngineError::ConnectionFailed(_) => "connection_failed",
            EngineError::Internal(_) => "internal",
        }
    }

    /// HTTP status code this error maps to.
    pub fn status_code(&self) -> u16 {
        match self {
            EngineError::InvalidArgument(_) => 400,
            EngineError::NotFound(_) => 404,
            EngineError::AlreadyExists(_) => 409,
            EngineError::ResourceExhausted(_) => 503,
            EngineError::ConnectionFailed(_) => 500,
            EngineError::Internal(_) => 500,
        }
    }
}
