//! RetryTask - fixed-backoff retry decorator

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::task::{BoxedTask, Task, TaskError, TaskOutput};

/// Re-runs the wrapped task until it succeeds or `max_attempts` is reached
///
/// Between attempts it sleeps a fixed `backoff`. Cancellation during the
/// backoff aborts immediately with [`TaskError::Cancelled`]. On exhaustion
/// only the last error is kept.
pub struct RetryTask {
    inner: BoxedTask,
    max_attempts: u32,
    backoff: Duration,
    last_attempts: AtomicU32,
}

impl RetryTask {
    pub fn new(inner: impl Task + 'static, max_attempts: u32, backoff: Duration) -> Self {
        Self {
            inner: Box::new(inner),
            max_attempts,
            backoff,
            last_attempts: AtomicU32::new(0),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn backoff(&self) -> Duration {
        self.backoff
    }
}

#[async_trait]
impl Task for RetryTask {
    fn id(&self) -> &str {
        self.inner.id()
    }

    async fn execute(&self, cancel: &CancellationToken) -> Result<TaskOutput, TaskError> {
        debug!(task_id = %self.id(), max_attempts = self.max_attempts, backoff = ?self.backoff, "RetryTask::execute: called");
        self.last_attempts.store(0, Ordering::SeqCst);

        let mut last_error = None;
        for attempt in 1..=self.max_attempts {
            if attempt > 1 {
                tokio::select! {
                    _ = tokio::time::sleep(self.backoff) => {}
                    _ = cancel.cancelled() => {
                        debug!(task_id = %self.id(), attempt, "RetryTask::execute: cancelled during backoff");
                        return Err(TaskError::Cancelled);
                    }
                }
            }

            self.last_attempts.store(attempt, Ordering::SeqCst);
            match self.inner.execute(cancel).await {
                Ok(output) => {
                    debug!(task_id = %self.id(), attempt, "RetryTask::execute: succeeded");
                    return Ok(output);
                }
                Err(e) => {
                    debug!(task_id = %self.id(), attempt, error = %e, "RetryTask::execute: attempt failed");
                    last_error = Some(e);
                }
            }
        }

        Err(TaskError::RetryExhausted {
            attempts: self.max_attempts,
            last: last_error.map(Box::new),
        })
    }

    fn attempts(&self) -> u32 {
        self.last_attempts.load(Ordering::SeqCst)
    }
}
