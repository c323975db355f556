//! Controller configuration
//!
//! Process-level flags. Job templates and the instance/project map live in
//! the separate YAML file named by `--jobs-config`.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

/// Bridges Gerrit-compatible code review and a prow-style job scheduler
#[derive(Debug, Clone, Parser)]
#[command(name = "tern-controller")]
pub struct Config {
    /// Base URL of the job scheduler (e.g., "http://localhost:8080")
    #[arg(long, env = "TERN_SCHEDULER_URL")]
    pub scheduler_url: String,

    /// Path to the YAML job/instance configuration file
    #[arg(long, env = "TERN_JOBS_CONFIG")]
    pub jobs_config: PathBuf,

    /// Path to the durable checkpoint file
    #[arg(long, env = "TERN_CHECKPOINT")]
    pub checkpoint: PathBuf,

    /// How often to poll the review instances, in seconds
    #[arg(long, env = "TERN_POLL_INTERVAL", default_value_t = 60)]
    pub poll_interval_secs: u64,

    /// Maximum changes fetched per project per cycle
    #[arg(long, env = "TERN_RATE_LIMIT", default_value_t = 25)]
    pub rate_limit: u32,
}

impl Config {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.scheduler_url.is_empty() {
            anyhow::bail!("scheduler_url cannot be empty");
        }

        if !self.scheduler_url.starts_with("http://") && !self.scheduler_url.starts_with("https://")
        {
            anyhow::bail!("scheduler_url must start with http:// or https://");
        }

        if self.checkpoint.as_os_str().is_empty() {
            anyhow::bail!("checkpoint path cannot be empty");
        }

        if self.jobs_config.as_os_str().is_empty() {
            anyhow::bail!("jobs_config path cannot be empty");
        }

        if self.poll_interval_secs == 0 {
            anyhow::bail!("poll_interval must be greater than 0");
        }

        if self.rate_limit == 0 {
            anyhow::bail!("rate_limit must be greater than 0");
        }

        Ok(())
    }
}
