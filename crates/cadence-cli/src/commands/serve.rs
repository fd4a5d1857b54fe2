use anyhow::Result;
use cadence_core::clock::SystemClock;
use cadence_core::engine::Engine;
use cadence_core::scheduler::JobSpec;
use owo_colors::OwoColorize;
use std::sync::Arc;
use tracing::info;

use crate::views::table::{display_history, display_jobs};

/// Run every job on its cadence until Ctrl-C, then shut down gracefully.
pub async fn serve(engine: &Engine) -> Result<()> {
    let scheduler = engine.scheduler(Arc::new(SystemClock))?;
    let jobs: Vec<JobSpec> = scheduler.jobs().into_iter().cloned().collect();
    display_jobs(&jobs);

    let handle = scheduler.spawn();
    println!("{} Scheduler running. Press Ctrl-C to stop.", "→".blue());

    tokio::signal::ctrl_c().await?;
    info!("shutdown requested");
    println!("{} Waiting for in-flight jobs...", "→".blue());

    let runs = handle.shutdown().await;
    display_history(&runs);
    println!("{} Scheduler stopped.", "✓".green().bold());
    Ok(())
}
