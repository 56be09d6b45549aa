//! taskpool configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::scheduler::SchedulerConfig;

/// Main taskpool configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Worker pool, queue and rate limit
    pub scheduler: SchedulerConfig,

    /// Demo workload run by `tp run`
    pub demo: DemoConfig,
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .taskpool.yml
        let local_config = PathBuf::from(".taskpool.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/taskpool/taskpool.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("taskpool").join("taskpool.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    /// Validate configuration before use
    pub fn validate(&self) -> Result<()> {
        if self.scheduler.rate_limit == Some(0) {
            return Err(eyre::eyre!("rate-limit must be at least 1 per second"));
        }
        if !(0.0..=1.0).contains(&self.demo.failure_rate) {
            return Err(eyre::eyre!(
                "failure-rate must be between 0.0 and 1.0, got {}",
                self.demo.failure_rate
            ));
        }
        Ok(())
    }
}

/// Demo workload configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DemoConfig {
    /// Number of tasks to submit
    pub tasks: usize,

    /// Simulated work per task in milliseconds
    #[serde(rename = "work-ms")]
    pub work_ms: u64,

    /// Probability that a task attempt fails
    #[serde(rename = "failure-rate")]
    pub failure_rate: f64,

    /// Attempts per task, including the first
    #[serde(rename = "max-attempts")]
    pub max_attempts: u32,

    /// Fixed delay between attempts in milliseconds
    #[serde(rename = "backoff-ms")]
    pub backoff_ms: u64,

    /// Per-attempt deadline in milliseconds; unset means no deadline
    #[serde(rename = "timeout-ms", skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            tasks: 20,
            work_ms: 100,
            failure_rate: 0.1,
            max_attempts: 3,
            backoff_ms: 200,
            timeout_ms: None,
        }
    }
}

impl DemoConfig {
    pub fn work(&self) -> Duration {
        Duration::from_millis(self.work_ms)
    }

    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}
