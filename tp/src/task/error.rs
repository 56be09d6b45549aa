//! Task error types

use std::any::Any;
use std::time::Duration;
use thiserror::Error;

/// Errors produced while executing a task
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("task cancelled")]
    Cancelled,

    #[error("deadline exceeded after {0:?}")]
    DeadlineExceeded(Duration),

    #[error("task failed: {0}")]
    Failed(String),

    #[error(transparent)]
    Other(#[from] eyre::Report),

    #[error("after {attempts} attempts: {}", describe_last(.last))]
    RetryExhausted {
        attempts: u32,
        last: Option<Box<TaskError>>,
    },

    #[error("rate limit wait failed: {0}")]
    RateLimitWait(#[source] Box<TaskError>),

    #[error("task panicked: {0}")]
    Panicked(String),
}

fn describe_last(last: &Option<Box<TaskError>>) -> String {
    match last {
        Some(e) => e.to_string(),
        None => "no attempt was made".to_string(),
    }
}

impl TaskError {
    /// Build a domain failure from a message
    pub fn failed(message: impl Into<String>) -> Self {
        TaskError::Failed(message.into())
    }

    /// Build a [`TaskError::Panicked`] from a caught panic payload
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        TaskError::Panicked(message)
    }

    /// Check if this error came from the cancellation token, directly or
    /// through a rate limiter wait
    pub fn is_cancelled(&self) -> bool {
        match self {
            TaskError::Cancelled => true,
            TaskError::RateLimitWait(inner) => inner.is_cancelled(),
            _ => false,
        }
    }

    /// Check if this is a timeout decorator deadline
    pub fn is_deadline_exceeded(&self) -> bool {
        matches!(self, TaskError::DeadlineExceeded(_))
    }

    /// The last underlying error of an exhausted retry, if any
    pub fn last_attempt_error(&self) -> Option<&TaskError> {
        match self {
            TaskError::RetryExhausted { last, .. } => last.as_deref(),
            _ => None,
        }
    }
}
