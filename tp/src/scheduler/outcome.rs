//! Outcome records published by workers

use crate::task::{TaskError, TaskOutput};

/// A task that completed successfully
#[derive(Debug, Clone)]
pub struct TaskResult {
    pub task_id: String,
    pub output: TaskOutput,
    pub attempts: u32,
}

/// A task that failed, or was abandoned while waiting for a rate-limit token
#[derive(Debug)]
pub struct TaskFailure {
    pub task_id: String,
    pub error: TaskError,
    /// Zero when the task never ran
    pub attempts: u32,
}

impl TaskFailure {
    /// Whether the task was dropped before execution
    pub fn never_ran(&self) -> bool {
        self.attempts == 0 && matches!(self.error, TaskError::RateLimitWait(_))
    }
}
