//! taskpool - an in-process task scheduler
//!
//! A bounded worker pool that executes submitted tasks under a global rate
//! limit and reports outcomes asynchronously, with decorator-style retry and
//! timeout policies.
//!
//! # Core Concepts
//!
//! - **Tasks**: anything implementing [`Task`]; leaf, batch or decorated
//! - **Backpressure**: bounded queue and outcome channels, nothing is unbounded
//! - **Shared Cancellation**: one token stops every worker, limiter wait and
//!   retry backoff at once
//! - **Decorators**: [`RetryTask`] and [`TimeoutTask`] keep the wrapped id
//!
//! # Modules
//!
//! - [`task`] - Task trait, SingleTask and BatchTask
//! - [`decorator`] - Retry and timeout wrappers
//! - [`scheduler`] - Worker pool, queue, rate limiter and outcome streams
//! - [`priority`] - Standalone priority container
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface
//! - [`demo`] - Demo workload behind `tp run`

pub mod cli;
pub mod config;
pub mod decorator;
pub mod demo;
pub mod priority;
pub mod scheduler;
pub mod task;

// Re-export commonly used types
pub use config::{Config, DemoConfig};
pub use decorator::{RetryTask, TimeoutTask};
pub use priority::{PriorityQueue, PriorityTask};
pub use scheduler::{RateLimiter, Scheduler, SchedulerConfig, SchedulerError, TaskFailure, TaskResult};
pub use task::{Action, BatchTask, BoxedTask, SingleTask, Task, TaskError, TaskOutput};
