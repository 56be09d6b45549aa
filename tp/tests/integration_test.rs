//! Integration tests for taskpool
//!
//! These tests drive the scheduler end to end through its public API.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::{Duration, Instant};

use serde_json::json;
use taskpool::{
    BatchTask, BoxedTask, RetryTask, Scheduler, SchedulerError, SingleTask, Task, TaskError, TaskFailure, TaskResult,
    TimeoutTask,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Collect exactly `count` outcomes from either stream
async fn collect(
    results: &mut mpsc::Receiver<TaskResult>,
    failures: &mut mpsc::Receiver<TaskFailure>,
    count: usize,
) -> (Vec<TaskResult>, Vec<TaskFailure>) {
    let mut ok = Vec::new();
    let mut failed = Vec::new();
    while ok.len() + failed.len() < count {
        tokio::select! {
            Some(result) = results.recv() => ok.push(result),
            Some(failure) = failures.recv() => failed.push(failure),
            else => break,
        }
    }
    (ok, failed)
}

fn counting_action(calls: &Arc<AtomicU32>, failures: u32) -> impl Fn() -> Result<serde_json::Value, TaskError> + Send + Sync + 'static {
    let calls = calls.clone();
    move || {
        let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
        if n <= failures {
            Err(TaskError::failed(format!("failure {}", n)))
        } else {
            Ok(json!(n))
        }
    }
}

// =============================================================================
// Delivery
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_exactly_once_delivery() {
    let scheduler = Scheduler::new(4, 8);
    let mut results = scheduler.take_results().unwrap();
    let mut failures = scheduler.take_failures().unwrap();
    scheduler.start();

    let total = 50;
    let consumer = tokio::spawn(async move { collect(&mut results, &mut failures, total).await });

    for i in 0..total {
        scheduler
            .submit(SingleTask::new(format!("task-{}", i), move || Ok(json!(i))))
            .await
            .expect("submit failed");
    }

    let (ok, failed) = tokio::time::timeout(Duration::from_secs(10), consumer)
        .await
        .expect("timed out waiting for outcomes")
        .unwrap();
    assert!(failed.is_empty());
    assert_eq!(ok.len(), total);

    let ids: HashSet<_> = ok.iter().map(|r| r.task_id.clone()).collect();
    assert_eq!(ids.len(), total);

    scheduler.stop().await;
}

#[tokio::test]
async fn test_scenario_three_workers_rate_limited() {
    let scheduler = Scheduler::new(3, 10);
    scheduler.set_rate_limit(5).unwrap();
    let mut results = scheduler.take_results().unwrap();
    let mut failures = scheduler.take_failures().unwrap();
    scheduler.start();

    let start = Instant::now();
    for i in 0..5 {
        scheduler
            .submit(SingleTask::new(format!("task-{}", i), move || Ok(json!(i))))
            .await
            .unwrap();
    }

    let (ok, failed) = collect(&mut results, &mut failures, 5).await;
    assert_eq!(ok.len(), 5);
    assert!(failed.is_empty());
    assert!(start.elapsed() < Duration::from_millis(1500));

    // Workers stay alive until stop()
    assert!(tokio::time::timeout(Duration::from_millis(100), scheduler.wait()).await.is_err());

    scheduler.stop().await;
    tokio::time::timeout(Duration::from_secs(1), scheduler.wait())
        .await
        .expect("workers should be joinable after stop");
    assert!(results.recv().await.is_none());
    assert!(failures.recv().await.is_none());
}

// =============================================================================
// Retry
// =============================================================================

#[tokio::test]
async fn test_retry_exhaustion_through_scheduler() {
    let scheduler = Scheduler::new(1, 4);
    let mut results = scheduler.take_results().unwrap();
    let mut failures = scheduler.take_failures().unwrap();
    scheduler.start();

    let calls = Arc::new(AtomicU32::new(0));
    let task = RetryTask::new(
        SingleTask::new("always-fails", counting_action(&calls, u32::MAX)),
        3,
        Duration::from_millis(100),
    );

    let start = Instant::now();
    scheduler.submit(task).await.unwrap();
    let (ok, failed) = collect(&mut results, &mut failures, 1).await;

    assert!(ok.is_empty());
    assert_eq!(failed.len(), 1);
    assert!(start.elapsed() >= Duration::from_millis(200));
    assert_eq!(failed[0].task_id, "always-fails");
    assert_eq!(failed[0].attempts, 3);
    assert!(matches!(failed[0].error, TaskError::RetryExhausted { attempts: 3, .. }));
    assert_eq!(calls.load(Ordering::SeqCst), 3);

    scheduler.stop().await;
}

#[tokio::test]
async fn test_retry_success_path_through_scheduler() {
    let scheduler = Scheduler::new(2, 4);
    let mut results = scheduler.take_results().unwrap();
    let mut failures = scheduler.take_failures().unwrap();
    scheduler.start();

    let calls = Arc::new(AtomicU32::new(0));
    let task = RetryTask::new(
        SingleTask::new("flaky", counting_action(&calls, 2)),
        5,
        Duration::from_millis(10),
    );
    scheduler.submit(task).await.unwrap();

    let (ok, failed) = collect(&mut results, &mut failures, 1).await;
    assert!(failed.is_empty());
    assert_eq!(ok.len(), 1);
    assert_eq!(ok[0].output, json!(3));
    assert_eq!(ok[0].attempts, 3);

    // No attempts beyond the first success
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 3);

    scheduler.stop().await;
}

// =============================================================================
// Rate limiting
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_rate_limit_bounds_drain_time() {
    let per_second = 10;
    let total = 20;
    let scheduler = Scheduler::new(4, total);
    scheduler.set_rate_limit(per_second).unwrap();
    let mut results = scheduler.take_results().unwrap();
    let mut failures = scheduler.take_failures().unwrap();

    for i in 0..total {
        scheduler.submit(SingleTask::noop(format!("task-{}", i))).await.unwrap();
    }

    let start = Instant::now();
    scheduler.start();
    let (ok, _) = collect(&mut results, &mut failures, total).await;
    let elapsed = start.elapsed();

    assert_eq!(ok.len(), total);
    // Burst covers the first `per_second`, the rest refill at `per_second`/s
    let floor = Duration::from_secs_f64((total - per_second as usize) as f64 / per_second as f64);
    assert!(elapsed + Duration::from_millis(50) >= floor, "drained in {:?}", elapsed);

    scheduler.stop().await;
}

#[tokio::test]
async fn test_stop_during_rate_limit_wait() {
    let scheduler = Scheduler::new(1, 4);
    scheduler.set_rate_limit(1).unwrap();
    let mut results = scheduler.take_results().unwrap();
    let mut failures = scheduler.take_failures().unwrap();
    scheduler.start();

    scheduler.submit(SingleTask::noop("first")).await.unwrap();
    scheduler.submit(SingleTask::noop("second")).await.unwrap();
    scheduler.submit(SingleTask::noop("third")).await.unwrap();

    let first = results.recv().await.unwrap();
    assert_eq!(first.task_id, "first");

    tokio::time::sleep(Duration::from_millis(100)).await;
    scheduler.stop().await;

    let failure = failures.recv().await.expect("expected a rate-limit failure");
    assert_eq!(failure.task_id, "second");
    assert_eq!(failure.attempts, 0);
    assert!(failure.never_ran());
    assert!(failure.error.is_cancelled());

    // "third" never left the queue
    assert!(failures.recv().await.is_none());
    assert!(results.recv().await.is_none());
}

// =============================================================================
// Timeout
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_timeout_does_not_interrupt_blocking_action() {
    let finished = Arc::new(AtomicBool::new(false));
    let flag = finished.clone();
    let slow = SingleTask::new("slow", move || {
        std::thread::sleep(Duration::from_millis(600));
        flag.store(true, Ordering::SeqCst);
        Ok(json!("late"))
    });
    let task = TimeoutTask::new(slow, Duration::from_millis(100));

    let start = Instant::now();
    let err = task.execute(&CancellationToken::new()).await.unwrap_err();
    let elapsed = start.elapsed();

    assert!(err.is_deadline_exceeded());
    assert!(elapsed >= Duration::from_millis(100));
    assert!(elapsed < Duration::from_millis(500));
    assert!(!finished.load(Ordering::SeqCst));

    // The action keeps running in the background
    tokio::time::sleep(Duration::from_millis(800)).await;
    assert!(finished.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_timeout_failure_through_scheduler() {
    let scheduler = Scheduler::new(1, 4);
    let mut results = scheduler.take_results().unwrap();
    let mut failures = scheduler.take_failures().unwrap();
    scheduler.start();

    let slow = SingleTask::new("slow", || {
        std::thread::sleep(Duration::from_millis(300));
        Ok(json!("late"))
    });
    scheduler
        .submit(TimeoutTask::new(slow, Duration::from_millis(50)))
        .await
        .unwrap();

    let (ok, failed) = collect(&mut results, &mut failures, 1).await;
    assert!(ok.is_empty());
    assert_eq!(failed[0].task_id, "slow");
    assert!(failed[0].error.is_deadline_exceeded());

    scheduler.stop().await;
}

// =============================================================================
// Batch
// =============================================================================

#[tokio::test]
async fn test_batch_fail_fast_through_scheduler() {
    let scheduler = Scheduler::new(1, 4);
    let mut results = scheduler.take_results().unwrap();
    let mut failures = scheduler.take_failures().unwrap();
    scheduler.start();

    let a = Arc::new(AtomicU32::new(0));
    let b = Arc::new(AtomicU32::new(0));
    let c = Arc::new(AtomicU32::new(0));
    let tasks: Vec<BoxedTask> = vec![
        Box::new(SingleTask::new("a", counting_action(&a, 0))),
        Box::new(SingleTask::new("b", counting_action(&b, u32::MAX))),
        Box::new(SingleTask::new("c", counting_action(&c, 0))),
    ];
    scheduler.submit(BatchTask::new("batch", tasks)).await.unwrap();

    let (ok, failed) = collect(&mut results, &mut failures, 1).await;
    assert!(ok.is_empty());
    assert_eq!(failed[0].task_id, "batch");
    assert_eq!(failed[0].error.to_string(), "task failed: failure 1");
    assert_eq!(a.load(Ordering::SeqCst), 1);
    assert_eq!(b.load(Ordering::SeqCst), 1);
    assert_eq!(c.load(Ordering::SeqCst), 0);

    scheduler.stop().await;
}

// =============================================================================
// Lifecycle
// =============================================================================

#[tokio::test]
async fn test_blocked_submit_released_by_stop() {
    let scheduler = Arc::new(Scheduler::new(0, 1));
    scheduler.start();
    scheduler.submit(SingleTask::noop("fills-queue")).await.unwrap();

    let blocked = {
        let scheduler = scheduler.clone();
        tokio::spawn(async move { scheduler.submit(SingleTask::noop("blocked")).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!blocked.is_finished());

    scheduler.stop().await;
    let outcome = tokio::time::timeout(Duration::from_secs(1), blocked)
        .await
        .expect("blocked submit was not released")
        .unwrap();
    assert!(matches!(outcome, Err(SchedulerError::Closed)));
}

#[tokio::test]
async fn test_grow_then_shrink() {
    let scheduler = Scheduler::new(1, 16);
    let mut results = scheduler.take_results().unwrap();
    let mut failures = scheduler.take_failures().unwrap();
    scheduler.start();

    scheduler.adjust_workers(4);
    assert_eq!(scheduler.worker_count(), 4);

    for i in 0..8 {
        scheduler.submit(SingleTask::noop(format!("task-{}", i))).await.unwrap();
    }
    let (ok, _) = collect(&mut results, &mut failures, 8).await;
    assert_eq!(ok.len(), 8);

    scheduler.adjust_workers(2);
    assert_eq!(scheduler.worker_count(), 2);

    // The remaining workers still serve the queue
    for i in 8..12 {
        scheduler.submit(SingleTask::noop(format!("task-{}", i))).await.unwrap();
    }
    let (ok, _) = collect(&mut results, &mut failures, 4).await;
    assert_eq!(ok.len(), 4);

    scheduler.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_shrink_lets_in_flight_task_finish() {
    let scheduler = Scheduler::new(1, 4);
    let mut results = scheduler.take_results().unwrap();
    scheduler.start();

    scheduler
        .submit(SingleTask::new("slow", || {
            std::thread::sleep(Duration::from_millis(300));
            Ok(json!("slow"))
        }))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    scheduler.adjust_workers(0);
    assert_eq!(scheduler.worker_count(), 0);

    let result = tokio::time::timeout(Duration::from_secs(2), results.recv())
        .await
        .expect("in-flight task should finish after shrink")
        .unwrap();
    assert_eq!(result.task_id, "slow");
    assert_eq!(result.output, json!("slow"));

    // The retired worker exits on its own once the task is published
    tokio::time::timeout(Duration::from_secs(2), scheduler.wait())
        .await
        .expect("retired worker should exit");
    assert_eq!(scheduler.running_workers(), 0);

    scheduler.stop().await;
}

#[tokio::test]
async fn test_stop_with_full_output_channel() {
    let scheduler = Scheduler::new(1, 1);
    // Held but never drained
    let mut results = scheduler.take_results().unwrap();
    scheduler.start();

    scheduler.submit(SingleTask::noop("t0")).await.unwrap();
    scheduler.submit(SingleTask::noop("t1")).await.unwrap();
    scheduler.submit(SingleTask::noop("t2")).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    tokio::time::timeout(Duration::from_secs(2), scheduler.stop())
        .await
        .expect("stop should not wait on a full output channel");
    assert_eq!(scheduler.running_workers(), 0);

    // t0 filled the channel, t1 was dropped while publishing, t2 never ran
    assert_eq!(results.recv().await.unwrap().task_id, "t0");
    assert!(results.recv().await.is_none());
}

#[tokio::test]
async fn test_cancelled_tasks_report_cancellation() {
    let scheduler = Scheduler::new(1, 4);
    let mut failures = scheduler.take_failures().unwrap();
    scheduler.start();

    let task = RetryTask::new(
        SingleTask::new("retrying", || Err(TaskError::failed("nope"))),
        10,
        Duration::from_secs(30),
    );
    scheduler.submit(task).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let start = Instant::now();
    scheduler.stop().await;
    assert!(start.elapsed() < Duration::from_secs(5));

    let failure = failures.recv().await.unwrap();
    assert_eq!(failure.task_id, "retrying");
    assert!(matches!(failure.error, TaskError::Cancelled));
    assert_eq!(failure.attempts, 1);
}
