//! Scheduler implementation

use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use futures::FutureExt;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::task::{BoxedTask, Task, TaskError};

use super::config::SchedulerConfig;
use super::error::SchedulerError;
use super::limiter::RateLimiter;
use super::outcome::{TaskFailure, TaskResult};

/// State shared by the scheduler and every worker
struct Shared {
    cancel: CancellationToken,
    limiter: RwLock<Option<Arc<RateLimiter>>>,
    queue_rx: tokio::sync::Mutex<mpsc::Receiver<BoxedTask>>,
    /// Workers whose loop has not exited yet
    live: watch::Sender<usize>,
}

impl Shared {
    fn limiter(&self) -> Option<Arc<RateLimiter>> {
        self.limiter.read().ok().and_then(|guard| guard.clone())
    }
}

/// Sending halves of the outcome channels; each worker owns a clone
#[derive(Clone)]
struct Outputs {
    results: mpsc::Sender<TaskResult>,
    failures: mpsc::Sender<TaskFailure>,
}

/// Counts a worker as live until dropped, including on panic
struct LiveGuard(Arc<Shared>);

impl LiveGuard {
    fn new(shared: Arc<Shared>) -> Self {
        shared.live.send_modify(|n| *n += 1);
        Self(shared)
    }
}

impl Drop for LiveGuard {
    fn drop(&mut self) {
        self.0.live.send_modify(|n| *n = n.saturating_sub(1));
    }
}

/// A worker and the token that asks it to retire
struct WorkerSlot {
    id: usize,
    retire: CancellationToken,
    handle: JoinHandle<()>,
}

/// Worker bookkeeping, guarded by one lock
#[derive(Default)]
struct Pool {
    started: bool,
    desired: usize,
    next_id: usize,
    active: Vec<WorkerSlot>,
}

/// A bounded, rate-limited worker pool
///
/// Tasks are submitted into a bounded FIFO queue and executed by a set of
/// tokio workers sharing one cancellation token. Outcomes are published to two
/// bounded channels, taken once via [`Scheduler::take_results`] and
/// [`Scheduler::take_failures`]; both must be drained or workers stall.
pub struct Scheduler {
    shared: Arc<Shared>,
    queue_tx: Mutex<Option<mpsc::Sender<BoxedTask>>>,
    outputs: Mutex<Option<Outputs>>,
    results_rx: Mutex<Option<mpsc::Receiver<TaskResult>>>,
    failures_rx: Mutex<Option<mpsc::Receiver<TaskFailure>>>,
    pool: Mutex<Pool>,
}

impl Scheduler {
    /// Create a scheduler with `worker_count` workers and channels of
    /// `queue_capacity` (clamped to at least 1)
    pub fn new(worker_count: usize, queue_capacity: usize) -> Self {
        debug!(worker_count, queue_capacity, "Scheduler::new: called");
        let capacity = queue_capacity.max(1);
        let (queue_tx, queue_rx) = mpsc::channel(capacity);
        let (results_tx, results_rx) = mpsc::channel(capacity);
        let (failures_tx, failures_rx) = mpsc::channel(capacity);

        Self {
            shared: Arc::new(Shared {
                cancel: CancellationToken::new(),
                limiter: RwLock::new(None),
                queue_rx: tokio::sync::Mutex::new(queue_rx),
                live: watch::channel(0).0,
            }),
            queue_tx: Mutex::new(Some(queue_tx)),
            outputs: Mutex::new(Some(Outputs {
                results: results_tx,
                failures: failures_tx,
            })),
            results_rx: Mutex::new(Some(results_rx)),
            failures_rx: Mutex::new(Some(failures_rx)),
            pool: Mutex::new(Pool {
                desired: worker_count,
                ..Default::default()
            }),
        }
    }

    /// Create a scheduler from configuration, installing the rate limit if set
    pub fn from_config(config: &SchedulerConfig) -> Result<Self, SchedulerError> {
        debug!(?config, "Scheduler::from_config: called");
        let scheduler = Self::new(config.worker_count, config.queue_capacity);
        if let Some(per_second) = config.rate_limit {
            scheduler.set_rate_limit(per_second)?;
        }
        Ok(scheduler)
    }

    /// Throttle execution to `per_second` tasks per second, with a burst of
    /// the same size
    pub fn set_rate_limit(&self, per_second: u32) -> Result<(), SchedulerError> {
        debug!(per_second, "Scheduler::set_rate_limit: called");
        if per_second == 0 {
            return Err(SchedulerError::InvalidRateLimit(per_second));
        }
        let limiter = Arc::new(RateLimiter::new(per_second));
        if let Ok(mut guard) = self.shared.limiter.write() {
            *guard = Some(limiter);
        }
        Ok(())
    }

    /// Take the receiving end of the result stream (once)
    pub fn take_results(&self) -> Option<mpsc::Receiver<TaskResult>> {
        self.results_rx.lock().ok().and_then(|mut rx| rx.take())
    }

    /// Take the receiving end of the failure stream (once)
    pub fn take_failures(&self) -> Option<mpsc::Receiver<TaskFailure>> {
        self.failures_rx.lock().ok().and_then(|mut rx| rx.take())
    }

    /// Enqueue a task, waiting while the queue is full
    ///
    /// With no running workers a full queue blocks indefinitely. A blocked
    /// call is released by [`Scheduler::stop`] with [`SchedulerError::Closed`].
    pub async fn submit(&self, task: impl Task + 'static) -> Result<(), SchedulerError> {
        debug!(task_id = %task.id(), "Scheduler::submit: called");
        let tx = self
            .queue_tx
            .lock()
            .ok()
            .and_then(|guard| guard.clone())
            .ok_or(SchedulerError::Closed)?;

        tx.send(Box::new(task)).await.map_err(|e| {
            debug!(task_id = %e.0.id(), "Scheduler::submit: queue closed while waiting");
            SchedulerError::Closed
        })
    }

    /// Spawn the configured number of workers
    ///
    /// Must be called from within a tokio runtime. A second call is a no-op.
    pub fn start(&self) {
        debug!("Scheduler::start: called");
        let mut pool = self.pool();
        if pool.started {
            warn!("Scheduler::start: already started");
            return;
        }
        pool.started = true;
        let desired = pool.desired;
        self.spawn_workers(&mut pool, desired);
        info!(workers = pool.active.len(), "Scheduler started");
    }

    /// Grow or shrink the worker pool to `count`
    ///
    /// Growth spawns workers immediately. Shrinking retires the newest
    /// workers: each exits once it is idle, finishing any task in hand.
    /// Before `start()` only the desired count changes.
    pub fn adjust_workers(&self, count: usize) {
        debug!(count, "Scheduler::adjust_workers: called");
        let mut pool = self.pool();
        let previous = pool.desired;
        pool.desired = count;

        if !pool.started || self.shared.cancel.is_cancelled() {
            debug!(count, "Scheduler::adjust_workers: not running, recorded desired count only");
            return;
        }

        pool.active.retain(|slot| {
            let finished = slot.handle.is_finished();
            if finished {
                warn!(worker_id = slot.id, "Scheduler::adjust_workers: worker exited unexpectedly");
            }
            !finished
        });
        let running = pool.active.len();
        if count > running {
            self.spawn_workers(&mut pool, count - running);
        } else {
            for slot in pool.active.drain(count..) {
                debug!(worker_id = slot.id, "Scheduler::adjust_workers: retiring worker");
                slot.retire.cancel();
            }
        }
        info!(previous, count, "Adjusted worker count");
    }

    /// Number of workers the pool is sized to
    pub fn worker_count(&self) -> usize {
        self.pool().desired
    }

    /// Number of worker loops still running
    ///
    /// Differs from [`Scheduler::worker_count`] while retired workers finish
    /// their current task, and drops to zero after `stop()`.
    pub fn running_workers(&self) -> usize {
        *self.shared.live.borrow()
    }

    /// Whether `stop()` has been called
    pub fn is_stopped(&self) -> bool {
        self.shared.cancel.is_cancelled()
    }

    /// Cancel all workers, wait for them to exit, then close the queue and
    /// both outcome streams
    pub async fn stop(&self) {
        debug!("Scheduler::stop: called");
        self.shared.cancel.cancel();
        self.wait().await;

        if let Ok(mut tx) = self.queue_tx.lock() {
            tx.take();
        }
        let mut rx = self.shared.queue_rx.lock().await;
        rx.close();
        let mut discarded = 0usize;
        while let Ok(task) = rx.try_recv() {
            debug!(task_id = %task.id(), "Scheduler::stop: discarding queued task");
            discarded += 1;
        }
        drop(rx);
        if discarded > 0 {
            warn!(discarded, "Discarded queued tasks on stop");
        }

        if let Ok(mut outputs) = self.outputs.lock() {
            outputs.take();
        }
        info!("Scheduler stopped");
    }

    /// Wait for every spawned worker to exit
    ///
    /// Does not cancel anything; without a prior `stop()` this waits for as
    /// long as workers are alive.
    pub async fn wait(&self) {
        debug!("Scheduler::wait: called");
        let mut live = self.shared.live.subscribe();
        if live.wait_for(|n| *n == 0).await.is_err() {
            warn!("Scheduler::wait: live worker count unavailable");
        }
    }

    fn pool(&self) -> MutexGuard<'_, Pool> {
        self.pool.lock().unwrap_or_else(|poisoned| {
            warn!("Scheduler: worker pool lock poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn spawn_workers(&self, pool: &mut Pool, count: usize) {
        let Some(outputs) = self.outputs.lock().ok().and_then(|guard| guard.clone()) else {
            warn!("Scheduler::spawn_workers: outputs closed, not spawning");
            return;
        };

        for _ in 0..count {
            let id = pool.next_id;
            pool.next_id += 1;
            let retire = self.shared.cancel.child_token();
            let guard = LiveGuard::new(self.shared.clone());
            let handle = tokio::spawn(run_worker(id, guard, retire.clone(), outputs.clone()));
            pool.active.push(WorkerSlot { id, retire, handle });
        }
    }
}

/// Worker loop: take tasks until cancelled, retired, or the queue closes
async fn run_worker(worker_id: usize, guard: LiveGuard, retire: CancellationToken, outputs: Outputs) {
    debug!(worker_id, "run_worker: started");
    let shared = &guard.0;
    loop {
        let next = tokio::select! {
            biased;
            _ = retire.cancelled() => break,
            next = async { shared.queue_rx.lock().await.recv().await } => next,
        };
        let Some(task) = next else {
            debug!(worker_id, "run_worker: queue closed");
            break;
        };
        process(worker_id, shared, task, &outputs).await;
    }
    debug!(worker_id, "run_worker: exiting");
}

async fn process(worker_id: usize, shared: &Shared, task: BoxedTask, outputs: &Outputs) {
    let task_id = task.id().to_string();
    debug!(worker_id, %task_id, "process: called");

    if let Some(limiter) = shared.limiter()
        && !limiter.try_acquire().await
    {
        let available = limiter.available().await;
        debug!(worker_id, %task_id, available, "process: rate limited, waiting");
        if let Err(e) = limiter.acquire(&shared.cancel).await {
            debug!(worker_id, %task_id, "process: cancelled waiting for rate limit");
            let failure = TaskFailure {
                task_id,
                error: TaskError::RateLimitWait(Box::new(e)),
                attempts: 0,
            };
            publish(&outputs.failures, failure, &shared.cancel).await;
            return;
        }
    }

    let outcome = AssertUnwindSafe(task.execute(&shared.cancel))
        .catch_unwind()
        .await
        .unwrap_or_else(|payload| {
            let error = TaskError::from_panic(payload);
            warn!(worker_id, %task_id, %error, "process: task panicked");
            Err(error)
        });

    match outcome {
        Ok(output) => {
            debug!(worker_id, %task_id, "process: succeeded");
            let result = TaskResult {
                task_id,
                output,
                attempts: task.attempts(),
            };
            publish(&outputs.results, result, &shared.cancel).await;
        }
        Err(error) => {
            debug!(worker_id, %task_id, %error, "process: failed");
            let failure = TaskFailure {
                task_id,
                error,
                attempts: task.attempts(),
            };
            publish(&outputs.failures, failure, &shared.cancel).await;
        }
    }
}

/// Send an outcome, waiting for channel space unless cancelled first
async fn publish<T>(tx: &mpsc::Sender<T>, record: T, cancel: &CancellationToken) {
    tokio::select! {
        biased;
        sent = tx.send(record) => {
            if sent.is_err() {
                debug!("publish: outcome receiver dropped");
            }
        }
        _ = cancel.cancelled() => warn!("Dropped outcome: scheduler stopped while output channel was full"),
    }
}
