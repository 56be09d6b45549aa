//! taskpool - demo entry point
//!
//! Loads configuration, sets up logging, and runs the demo workload until it
//! completes or SIGINT/SIGTERM is received.

use std::fs;

use clap::Parser;
use colored::Colorize;
use eyre::{Context, Result};
use tracing::{info, warn};

use taskpool::cli::{Cli, Command, get_log_path};
use taskpool::config::Config;
use taskpool::demo;

fn setup_logging(log_level: Option<&str>) -> Result<()> {
    let log_path = get_log_path();
    if let Some(log_dir) = log_path.parent() {
        fs::create_dir_all(log_dir).context("Failed to create log directory")?;
    }

    // Setup tracing subscriber - write to log file, not stdout/stderr
    let level = match log_level {
        Some(level) => level
            .parse::<tracing::Level>()
            .map_err(|_| eyre::eyre!("Invalid log level: {}", level))?,
        None => tracing::Level::INFO,
    };
    let log_file = fs::File::create(&log_path).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.log_level.as_deref())?;

    let mut config = Config::load(cli.config.as_ref())?;

    match cli.command {
        Some(Command::Config) => {
            print!("{}", serde_yaml::to_string(&config).context("Failed to serialize config")?);
            Ok(())
        }
        Some(Command::Run(args)) => {
            args.apply(&mut config);
            cmd_run(&config).await
        }
        None => cmd_run(&config).await,
    }
}

async fn cmd_run(config: &Config) -> Result<()> {
    println!(
        "Running {} tasks on {} workers{}",
        config.demo.tasks,
        config.scheduler.worker_count,
        config
            .scheduler
            .rate_limit
            .map(|r| format!(", {} per second", r))
            .unwrap_or_default()
    );

    #[cfg(unix)]
    let shutdown = {
        use tokio::signal::unix::{SignalKind, signal};

        let mut sigint = signal(SignalKind::interrupt()).context("Failed to install SIGINT handler")?;
        let mut sigterm = signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
        async move {
            tokio::select! {
                _ = sigint.recv() => warn!("SIGINT received"),
                _ = sigterm.recv() => warn!("SIGTERM received"),
            }
        }
    };

    #[cfg(not(unix))]
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
        warn!("Ctrl+C received");
    };

    let summary = demo::run(config, shutdown).await?;

    for result in &summary.results {
        println!(
            "{} {} {} (attempts: {})",
            "✓".green(),
            result.task_id,
            result.output,
            result.attempts
        );
    }
    for failure in &summary.failures {
        println!(
            "{} {} {} (attempts: {})",
            "✗".red(),
            failure.task_id,
            failure.error,
            failure.attempts
        );
    }

    println!(
        "\n{} completed, {} failed in {:.2?}",
        summary.results.len().to_string().green(),
        summary.failures.len().to_string().red(),
        summary.elapsed
    );
    if summary.total() < config.demo.tasks {
        println!(
            "{}",
            format!("{} tasks did not finish before shutdown", config.demo.tasks - summary.total()).yellow()
        );
    }
    Ok(())
}
