//! Scheduler error types

use thiserror::Error;

/// Errors returned synchronously by scheduler operations
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("scheduler is stopped, task queue closed")]
    Closed,

    #[error("invalid rate limit {0}, must be at least 1 per second")]
    InvalidRateLimit(u32),
}
