//! Demo workload driven by `tp run`
//!
//! Submits simulated tasks wrapped in retry (and optionally timeout)
//! decorators, drains both outcome streams concurrently, and stops the
//! scheduler once every task is accounted for or shutdown is requested.

use std::time::{Duration, Instant};

use eyre::{Context, Result};
use rand::Rng;
use tracing::{debug, error, info};

use crate::config::{Config, DemoConfig};
use crate::decorator::{RetryTask, TimeoutTask};
use crate::scheduler::{Scheduler, TaskFailure, TaskResult};
use crate::task::{BoxedTask, SingleTask};

/// What happened to the demo workload
#[derive(Debug, Default)]
pub struct DemoSummary {
    pub results: Vec<TaskResult>,
    pub failures: Vec<TaskFailure>,
    pub elapsed: Duration,
}

impl DemoSummary {
    pub fn total(&self) -> usize {
        self.results.len() + self.failures.len()
    }
}

/// Build demo task `index`: simulated work that fails at `failure_rate`
pub fn build_task(index: usize, demo: &DemoConfig) -> BoxedTask {
    let task_id = format!("task-{}", index);
    let work = demo.work();
    let failure_rate = demo.failure_rate;
    let output = format!("result of {}", task_id);

    let single = SingleTask::new(task_id, move || {
        std::thread::sleep(work);
        if rand::rng().random_bool(failure_rate) {
            return Err(eyre::eyre!("random error").into());
        }
        Ok(serde_json::json!(output))
    });

    match demo.timeout() {
        Some(timeout) => Box::new(RetryTask::new(
            TimeoutTask::new(single, timeout),
            demo.max_attempts,
            demo.backoff(),
        )),
        None => Box::new(RetryTask::new(single, demo.max_attempts, demo.backoff())),
    }
}

/// Run the demo workload until all tasks finish or `shutdown` resolves
pub async fn run<F>(config: &Config, shutdown: F) -> Result<DemoSummary>
where
    F: Future<Output = ()>,
{
    debug!(?config, "demo::run: called");
    config.validate()?;

    let started = Instant::now();
    let scheduler = Scheduler::from_config(&config.scheduler).context("Failed to create scheduler")?;
    let mut results_rx = scheduler
        .take_results()
        .ok_or_else(|| eyre::eyre!("Result stream already taken"))?;
    let mut failures_rx = scheduler
        .take_failures()
        .ok_or_else(|| eyre::eyre!("Failure stream already taken"))?;
    scheduler.start();

    let expected = config.demo.tasks;
    let mut collector = tokio::spawn(async move {
        let mut summary = DemoSummary::default();
        let (mut results_open, mut failures_open) = (true, true);
        while summary.total() < expected && (results_open || failures_open) {
            tokio::select! {
                result = results_rx.recv(), if results_open => match result {
                    Some(result) => {
                        info!(task_id = %result.task_id, output = %result.output, attempts = result.attempts, "Task completed");
                        summary.results.push(result);
                    }
                    None => results_open = false,
                },
                failure = failures_rx.recv(), if failures_open => match failure {
                    Some(failure) => {
                        error!(task_id = %failure.task_id, error = %failure.error, attempts = failure.attempts, "Task failed");
                        summary.failures.push(failure);
                    }
                    None => failures_open = false,
                },
            }
        }
        summary
    });

    tokio::pin!(shutdown);
    let finished = tokio::select! {
        summary = async {
            for index in 0..expected {
                scheduler.submit(build_task(index, &config.demo)).await?;
            }
            let summary = (&mut collector).await.context("Outcome collector panicked")?;
            Ok::<DemoSummary, eyre::Report>(summary)
        } => Some(summary?),
        _ = &mut shutdown => None,
    };

    if finished.is_none() {
        info!("Shutdown requested before all tasks finished");
    }
    scheduler.stop().await;
    scheduler.wait().await;

    let mut summary = match finished {
        Some(summary) => summary,
        None => collector.await.context("Outcome collector panicked")?,
    };
    summary.elapsed = started.elapsed();
    info!(
        completed = summary.results.len(),
        failed = summary.failures.len(),
        elapsed = ?summary.elapsed,
        "Demo finished"
    );
    Ok(summary)
}
