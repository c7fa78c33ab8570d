//! Job to advance the chain scan.
//!
//! Runs scheduling passes until the time budget of the trigger is spent.

use anyhow::{Context, Result};
use chrono::Utc;
use log::info;

use crate::utils::deadline_after;
use crate::worker::{BlockOutcome, ScanScheduler};

pub async fn run(scheduler: &ScanScheduler) -> Result<()> {
    info!("Starting scan_chain job...");

    let start = std::time::Instant::now();
    let deadline = deadline_after(Utc::now(), scheduler.settings().time_budget());

    let outcomes = scheduler
        .scan_chain(Some(deadline))
        .await
        .context("Chain scan aborted")?;

    let failed = outcomes
        .iter()
        .filter(|o| matches!(o, BlockOutcome::Failed { .. }))
        .count();
    info!(
        "Completed scan_chain job in {:?}: {} outcomes, {} failed",
        start.elapsed(),
        outcomes.len(),
        failed
    );
    Ok(())
}
