//! SingleTask - a leaf task wrapping one action

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{Task, TaskError, TaskOutput};

/// The callable a [`SingleTask`] runs
///
/// Actions run on tokio's blocking pool and may be invoked concurrently with
/// other actions, so any captured mutable state needs its own synchronization.
pub type Action = Arc<dyn Fn() -> Result<TaskOutput, TaskError> + Send + Sync>;

/// A task that runs a single action exactly once per execution
#[derive(Clone)]
pub struct SingleTask {
    id: String,
    action: Option<Action>,
}

impl SingleTask {
    /// Create a task running the given action
    pub fn new<F>(id: impl Into<String>, action: F) -> Self
    where
        F: Fn() -> Result<TaskOutput, TaskError> + Send + Sync + 'static,
    {
        Self {
            id: id.into(),
            action: Some(Arc::new(action)),
        }
    }

    /// Create a task with no action; executing it yields `Value::Null`
    pub fn noop(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            action: None,
        }
    }
}

impl fmt::Debug for SingleTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SingleTask")
            .field("id", &self.id)
            .field("has_action", &self.action.is_some())
            .finish()
    }
}

#[async_trait]
impl Task for SingleTask {
    fn id(&self) -> &str {
        &self.id
    }

    /// Runs the action once. The token is only checked before the call; a
    /// running action is never interrupted.
    async fn execute(&self, cancel: &CancellationToken) -> Result<TaskOutput, TaskError> {
        debug!(task_id = %self.id, "SingleTask::execute: called");
        if cancel.is_cancelled() {
            debug!(task_id = %self.id, "SingleTask::execute: already cancelled");
            return Err(TaskError::Cancelled);
        }

        let Some(action) = self.action.clone() else {
            return Ok(TaskOutput::Null);
        };

        // Dropping this future detaches the blocking call, it keeps running
        match tokio::task::spawn_blocking(move || action()).await {
            Ok(result) => result,
            Err(e) if e.is_panic() => Err(TaskError::from_panic(e.into_panic())),
            Err(_) => Err(TaskError::Cancelled),
        }
    }
}
