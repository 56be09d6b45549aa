//! Scheduler for task execution
//!
//! A bounded FIFO queue feeding a pool of tokio workers, throttled by a shared
//! token bucket and stopped through a shared cancellation token. Outcomes
//! leave through two bounded channels, so slow consumers push back on workers
//! and, through the queue, on `submit`.

mod config;
mod core;
mod error;
mod limiter;
mod outcome;

pub use config::SchedulerConfig;
pub use core::Scheduler;
pub use error::SchedulerError;
pub use limiter::RateLimiter;
pub use outcome::{TaskFailure, TaskResult};
