use ulid::Ulid;

use crate::model::{AppointmentStatus, Span};

#[derive(Debug)]
pub enum EngineError {
    NotFound(Ulid),
    PermissionDenied(&'static str),
    PreconditionFailed {
        id: Ulid,
        status: AppointmentStatus,
    },
    Conflict {
        with: Ulid,
        span: Span,
    },
    Validation(&'static str),
    LimitExceeded(&'static str),
    WalError(String),
}

impl EngineError {
    /// Stable label for error bodies and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::NotFound(_) => "not_found",
            EngineError::PermissionDenied(_) => "permission_denied",
            EngineError::PreconditionFailed { .. } => "precondition_failed",
            EngineError::Conflict { .. } => "conflict",
            EngineError::Validation(_) => "validation_error",
            EngineError::LimitExceeded(_) => "limit_exceeded",
            EngineError::WalError(_) => "storage_error",
        }
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::NotFound(id) => write!(f, "not found: {id}"),
            EngineError::PermissionDenied(msg) => write!(f, "permission denied: {msg}"),
            EngineError::PreconditionFailed { id, status } => write!(
                f,
                "appointment {id} cannot make this transition while {}",
                status.as_str()
            ),
            EngineError::Conflict { with, span } => write!(
                f,
                "time slot already booked: appointment {with} occupies [{}, {})",
                span.start, span.end
            ),
            EngineError::Validation(msg) => write!(f, "invalid input: {msg}"),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
