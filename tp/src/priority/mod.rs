//! Priority container for tasks
//!
//! A heap of (task, priority) pairs: higher priority pops first, equal
//! priorities pop in insertion order. The scheduler dispatches from its FIFO
//! queue and does not consult this container; it is not synchronized, so
//! sharing it between producers and workers needs an external lock.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::fmt;

use tracing::debug;

use crate::task::{BoxedTask, Task};

/// A task paired with its priority (higher = more urgent)
pub struct PriorityTask {
    pub task: BoxedTask,
    pub priority: i64,
    seq: u64,
}

impl PriorityTask {
    pub fn id(&self) -> &str {
        self.task.id()
    }
}

impl fmt::Debug for PriorityTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PriorityTask")
            .field("id", &self.task.id())
            .field("priority", &self.priority)
            .field("seq", &self.seq)
            .finish()
    }
}

impl Eq for PriorityTask {}

impl PartialEq for PriorityTask {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Ord for PriorityTask {
    fn cmp(&self, other: &Self) -> Ordering {
        // Higher priority first, then earlier insertion
        self.priority.cmp(&other.priority).then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for PriorityTask {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Max-heap of prioritized tasks
#[derive(Debug, Default)]
pub struct PriorityQueue {
    heap: BinaryHeap<PriorityTask>,
    next_seq: u64,
}

impl PriorityQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a task, O(log n)
    pub fn push(&mut self, task: impl Task + 'static, priority: i64) {
        let seq = self.next_seq;
        self.next_seq += 1;
        debug!(task_id = %task.id(), priority, seq, "PriorityQueue::push: called");
        self.heap.push(PriorityTask {
            task: Box::new(task),
            priority,
            seq,
        });
    }

    /// Remove and return the most urgent task, O(log n)
    pub fn pop(&mut self) -> Option<PriorityTask> {
        self.heap.pop()
    }

    /// The most urgent task, without removing it
    pub fn peek(&self) -> Option<&PriorityTask> {
        self.heap.peek()
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Drain all tasks, most urgent first
    pub fn drain_ordered(&mut self) -> Vec<PriorityTask> {
        let mut out = Vec::with_capacity(self.heap.len());
        while let Some(entry) = self.heap.pop() {
            out.push(entry);
        }
        out
    }
}
