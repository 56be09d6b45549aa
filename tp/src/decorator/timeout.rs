//! TimeoutTask - deadline decorator

use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::task::{BoxedTask, Task, TaskError, TaskOutput};

/// Bounds the wrapped task's execution by `timeout`
///
/// The wrapped task runs under a child token that is cancelled when the
/// deadline passes and released on every exit path. Only tasks that poll
/// their token actually stop: a [`crate::task::SingleTask`] with a blocking
/// action keeps running in the background after this decorator has already
/// returned [`TaskError::DeadlineExceeded`], and its output is discarded.
pub struct TimeoutTask {
    inner: BoxedTask,
    timeout: Duration,
}

impl TimeoutTask {
    pub fn new(inner: impl Task + 'static, timeout: Duration) -> Self {
        Self {
            inner: Box::new(inner),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[async_trait]
impl Task for TimeoutTask {
    fn id(&self) -> &str {
        self.inner.id()
    }

    async fn execute(&self, cancel: &CancellationToken) -> Result<TaskOutput, TaskError> {
        debug!(task_id = %self.id(), timeout = ?self.timeout, "TimeoutTask::execute: called");
        let child = cancel.child_token();
        let _guard = child.clone().drop_guard();

        tokio::select! {
            biased;
            result = self.inner.execute(&child) => result,
            _ = cancel.cancelled() => {
                debug!(task_id = %self.id(), "TimeoutTask::execute: parent cancelled");
                Err(TaskError::Cancelled)
            }
            _ = tokio::time::sleep(self.timeout) => {
                debug!(task_id = %self.id(), "TimeoutTask::execute: deadline exceeded");
                child.cancel();
                Err(TaskError::DeadlineExceeded(self.timeout))
            }
        }
    }

    fn attempts(&self) -> u32 {
        self.inner.attempts()
    }
}
