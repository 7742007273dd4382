use crate::entry::TimeoutId;
use thiserror::Error;

/// Errors surfaced by the timeout manager.
///
/// None of these are fatal to the owning context. `InvalidState` and
/// `ResourceExhausted` are returned to the caller; `CallbackFailure` never
/// leaves a firing pass and is only logged and counted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimerError {
    #[error("{operation} is not allowed while a firing pass is active")]
    InvalidState { operation: &'static str },

    #[error("pending timeout limit of {limit} reached")]
    ResourceExhausted { limit: usize },

    #[error("callback for timeout {id} failed: {reason}")]
    CallbackFailure { id: TimeoutId, reason: String },
}

/// Failure reported by a [`CallbackExecutor`](crate::platform::CallbackExecutor).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct CallbackError(pub String);

impl CallbackError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }
}

pub type Result<T> = std::result::Result<T, TimerError>;
