//! BatchTask - run sub-tasks in order, fail fast

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{BoxedTask, Task, TaskError, TaskOutput};

/// A sequential composite of tasks
///
/// Sub-tasks run strictly in order under the same cancellation token. The
/// first failure aborts the batch; later sub-tasks are never invoked.
pub struct BatchTask {
    id: String,
    tasks: Vec<BoxedTask>,
}

impl BatchTask {
    /// Create a batch from an ordered list of tasks
    pub fn new(id: impl Into<String>, tasks: Vec<BoxedTask>) -> Self {
        Self { id: id.into(), tasks }
    }

    /// Append a task to the end of the batch
    pub fn push(&mut self, task: impl Task + 'static) {
        self.tasks.push(Box::new(task));
    }

    /// Number of sub-tasks
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

#[async_trait]
impl Task for BatchTask {
    fn id(&self) -> &str {
        &self.id
    }

    async fn execute(&self, cancel: &CancellationToken) -> Result<TaskOutput, TaskError> {
        debug!(task_id = %self.id, count = self.tasks.len(), "BatchTask::execute: called");
        let mut outputs = Vec::with_capacity(self.tasks.len());
        for task in &self.tasks {
            match task.execute(cancel).await {
                Ok(output) => outputs.push(output),
                Err(e) => {
                    debug!(task_id = %self.id, sub_task = %task.id(), error = %e, "BatchTask::execute: sub-task failed");
                    return Err(e);
                }
            }
        }
        Ok(TaskOutput::Array(outputs))
    }
}
