//! Scheduler configuration

use serde::{Deserialize, Serialize};

/// Scheduler configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Workers spawned by `start()`
    #[serde(rename = "worker-count", default = "default_worker_count")]
    pub worker_count: usize,

    /// Capacity of the task queue and of each outcome channel
    #[serde(rename = "queue-capacity", default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Tasks per second across all workers; unset means unthrottled
    #[serde(rename = "rate-limit", default, skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<u32>,
}

fn default_worker_count() -> usize {
    3
}

fn default_queue_capacity() -> usize {
    100
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            worker_count: default_worker_count(),
            queue_capacity: default_queue_capacity(),
            rate_limit: None,
        }
    }
}
