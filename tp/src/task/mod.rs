//! Task abstraction
//!
//! Every unit of work the scheduler runs implements [`Task`]: a stable id used
//! to correlate outcomes, and an async `execute` that observes the scheduler's
//! cancellation token. Leaf tasks ([`SingleTask`]), composites
//! ([`BatchTask`]) and the decorators in [`crate::decorator`] all share it.

mod batch;
mod error;
mod single;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

pub use batch::BatchTask;
pub use error::TaskError;
pub use single::{Action, SingleTask};

/// Output produced by a successful task
pub type TaskOutput = serde_json::Value;

/// A type-erased task, as stored in the scheduler queue
pub type BoxedTask = Box<dyn Task>;

/// A unit of work that can be scheduled
#[async_trait]
pub trait Task: Send + Sync {
    /// Id used to correlate outcomes; not validated or deduplicated
    fn id(&self) -> &str;

    /// Execute the task under the given cancellation token
    ///
    /// Implementations check the token before starting work and return
    /// [`TaskError::Cancelled`] if it has already fired.
    async fn execute(&self, cancel: &CancellationToken) -> Result<TaskOutput, TaskError>;

    /// Number of attempts made by the most recent execution
    fn attempts(&self) -> u32 {
        1
    }
}

#[async_trait]
impl<T: Task + ?Sized> Task for Box<T> {
    fn id(&self) -> &str {
        (**self).id()
    }

    async fn execute(&self, cancel: &CancellationToken) -> Result<TaskOutput, TaskError> {
        (**self).execute(cancel).await
    }

    fn attempts(&self) -> u32 {
        (**self).attempts()
    }
}
