//! CLI command definitions

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing::debug;

use crate::config::Config;

/// taskpool - bounded, rate-limited task scheduler demo
#[derive(Parser)]
#[command(
    name = "tp",
    about = "Run a demo workload through the taskpool scheduler",
    version = env!("CARGO_PKG_VERSION"),
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(
        short = 'l',
        long = "log-level",
        global = true,
        help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)"
    )]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Submit demo tasks and report their outcomes
    Run(RunArgs),

    /// Print the effective configuration as YAML
    Config,
}

/// Overrides for the loaded configuration
#[derive(Debug, Default, Args)]
pub struct RunArgs {
    /// Number of tasks to submit
    #[arg(short, long)]
    pub tasks: Option<usize>,

    /// Worker count
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Queue and outcome channel capacity
    #[arg(short, long)]
    pub queue: Option<usize>,

    /// Tasks per second
    #[arg(short, long)]
    pub rate: Option<u32>,

    /// Attempts per task, including the first
    #[arg(long)]
    pub max_attempts: Option<u32>,

    /// Delay between attempts in milliseconds
    #[arg(long)]
    pub backoff_ms: Option<u64>,

    /// Per-attempt deadline in milliseconds
    #[arg(long)]
    pub timeout_ms: Option<u64>,

    /// Simulated work per task in milliseconds
    #[arg(long)]
    pub work_ms: Option<u64>,

    /// Probability that an attempt fails (0.0 - 1.0)
    #[arg(long)]
    pub failure_rate: Option<f64>,
}

impl RunArgs {
    /// Apply command-line overrides on top of the loaded configuration
    pub fn apply(&self, config: &mut Config) {
        debug!(args = ?self, "RunArgs::apply: called");
        if let Some(tasks) = self.tasks {
            config.demo.tasks = tasks;
        }
        if let Some(workers) = self.workers {
            config.scheduler.worker_count = workers;
        }
        if let Some(queue) = self.queue {
            config.scheduler.queue_capacity = queue;
        }
        if let Some(rate) = self.rate {
            config.scheduler.rate_limit = Some(rate);
        }
        if let Some(max_attempts) = self.max_attempts {
            config.demo.max_attempts = max_attempts;
        }
        if let Some(backoff_ms) = self.backoff_ms {
            config.demo.backoff_ms = backoff_ms;
        }
        if let Some(timeout_ms) = self.timeout_ms {
            config.demo.timeout_ms = Some(timeout_ms);
        }
        if let Some(work_ms) = self.work_ms {
            config.demo.work_ms = work_ms;
        }
        if let Some(failure_rate) = self.failure_rate {
            config.demo.failure_rate = failure_rate;
        }
    }
}

/// Get the log file path
pub fn get_log_path() -> PathBuf {
    debug!("get_log_path: called");
    let path = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("taskpool")
        .join("logs")
        .join("taskpool.log");
    debug!(?path, "get_log_path: returning path");
    path
}
