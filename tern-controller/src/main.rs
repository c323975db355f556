//! Tern Controller
//!
//! Polls Gerrit-compatible review instances for updated proposals and
//! creates CI jobs on a prow-style scheduler for the ones that need them.
//!
//! Architecture:
//! - Configuration: process flags plus a YAML job/instance config
//! - Checkpoint: durable watermark bounding each incremental poll
//! - Trigger filtering: which presubmits to (re)run for a proposal
//! - Dispatch and feedback: job creation and the triggered-jobs comment
//!
//! The controller polls on a fixed interval, processes every fetched
//! proposal sequentially, and persists the watermark after each cycle.

mod checkpoint;
mod config;
mod dispatch;
mod error;
mod feedback;
mod jobcfg;
mod refs;
mod sync;
#[cfg(test)]
mod testutil;
mod trigger;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::jobcfg::JobConfigFile;
use crate::sync::SyncController;
use tern_client::{HttpReviewClient, HttpSchedulerClient};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tern_controller=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting tern controller");

    let config = Config::parse();
    config.validate()?;

    let job_config =
        JobConfigFile::load(&config.jobs_config).context("Failed to load job configuration")?;
    info!(
        "Loaded job configuration: {} instance(s), {} repo(s)",
        job_config.instances.len(),
        job_config.repos.len()
    );

    let last_update =
        checkpoint::load(&config.checkpoint).context("Failed to load checkpoint")?;

    let review = Arc::new(HttpReviewClient::new(job_config.instances.clone()));
    let scheduler = Arc::new(HttpSchedulerClient::new(config.scheduler_url.clone()));

    let mut controller = SyncController::new(
        review,
        scheduler,
        Arc::new(job_config),
        config.checkpoint.clone(),
        config.rate_limit,
        last_update,
    );

    info!(
        "Controller initialized, resuming from {}",
        controller.last_update()
    );

    if let Err(e) = controller.run(config.poll_interval()).await {
        error!("Sync loop error: {:#}", e);
        return Err(e);
    }

    Ok(())
}
