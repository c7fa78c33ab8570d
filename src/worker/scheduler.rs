use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

use crate::config::ScannerSettings;
use crate::db::{
    models::{BlockScanLease, LeaseStatus, CURSOR_KEY},
    Cell, Database,
};
use crate::error::{ScanResult, StoreError};
use crate::subgraph::ChainHeadResolver;
use crate::utils::now_millis;
use crate::worker::{
    dispatch::ScanDispatch,
    scanner::{lease_cell, ScanReport},
};

/// What happened to one block during a scheduling pass.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum BlockOutcome {
    /// Another invocation holds a live lease on the block.
    Skipped { block_number: u64 },
    Scanned {
        block_number: u64,
        done: bool,
        scanned: usize,
    },
    Failed { block_number: u64, message: String },
}

impl BlockOutcome {
    pub fn block_number(&self) -> u64 {
        match self {
            BlockOutcome::Skipped { block_number }
            | BlockOutcome::Scanned { block_number, .. }
            | BlockOutcome::Failed { block_number, .. } => *block_number,
        }
    }

    fn from_report(block_number: u64, result: ScanResult<ScanReport>) -> Self {
        match result {
            Ok(report) => BlockOutcome::Scanned {
                block_number,
                done: report.done,
                scanned: report.scanned,
            },
            Err(e) => BlockOutcome::Failed {
                block_number,
                message: e.to_string(),
            },
        }
    }
}

/// Slot in the pass's task list.
enum Task {
    Running {
        block_number: u64,
        handle: JoinHandle<ScanResult<ScanReport>>,
    },
    Settled(BlockOutcome),
}

impl Task {
    async fn outcome(self) -> BlockOutcome {
        match self {
            Task::Settled(outcome) => outcome,
            Task::Running {
                block_number,
                handle,
            } => match handle.await {
                Ok(result) => BlockOutcome::from_report(block_number, result),
                Err(e) => BlockOutcome::Failed {
                    block_number,
                    message: format!("scan task aborted: {}", e),
                },
            },
        }
    }
}

/// Result of a single scheduling pass.
#[derive(Debug, Clone)]
pub struct PassSummary {
    pub head: u64,
    pub cursor_before: u64,
    pub cursor_after: u64,
    /// Start and resume dispatches issued by the pass.
    pub dispatched: usize,
    pub outcomes: Vec<BlockOutcome>,
}

impl PassSummary {
    fn made_progress(&self) -> bool {
        self.cursor_after > self.cursor_before
            || self
                .outcomes
                .iter()
                .any(|o| matches!(o, BlockOutcome::Scanned { .. }))
    }
}

/// Drives block scans between the progress cursor and the chain head.
///
/// Each pass walks blocks upward from the cursor and fills at most
/// `pool_size` task slots with new, resumed or skipped blocks.
/// The cursor only moves over a contiguous run of completed leases, so it
/// never passes a block that is still in progress.
pub struct ScanScheduler {
    db: Database,
    cursor: Cell<u64>,
    head: ChainHeadResolver,
    dispatcher: Arc<dyn ScanDispatch>,
    settings: ScannerSettings,
}

impl ScanScheduler {
    pub fn new(
        db: Database,
        head: ChainHeadResolver,
        dispatcher: Arc<dyn ScanDispatch>,
        settings: ScannerSettings,
    ) -> Self {
        Self {
            cursor: Cell::new(db.scan.clone(), CURSOR_KEY),
            db,
            head,
            dispatcher,
            settings,
        }
    }

    pub fn settings(&self) -> &ScannerSettings {
        &self.settings
    }

    pub(crate) fn db(&self) -> &Database {
        &self.db
    }

    pub(crate) fn head(&self) -> &ChainHeadResolver {
        &self.head
    }

    pub async fn read_cursor(&self) -> Result<u64, StoreError> {
        self.cursor.read(self.settings.cursor_fallback()).await
    }

    /// Runs one scheduling pass and, given a deadline, keeps running passes
    /// while time remains and the previous pass made progress.
    ///
    /// Scans already dispatched when the deadline passes are not aborted.
    pub async fn scan_chain(
        &self,
        deadline: Option<DateTime<Utc>>,
    ) -> ScanResult<Vec<BlockOutcome>> {
        info!("Start chain scan (deadline: {:?})", deadline);
        let mut outcomes = Vec::new();
        let mut passes = 0;

        loop {
            let pass = match self.run_pass().await {
                Ok(pass) => pass,
                Err(e) if passes > 0 => {
                    warn!("Stopping chain scan after {} passes: {:#}", passes, e);
                    break;
                },
                Err(e) => return Err(e),
            };
            passes += 1;

            let progressed = pass.made_progress();
            outcomes.extend(pass.outcomes);

            match deadline {
                Some(deadline) if progressed && Utc::now() < deadline => continue,
                _ => break,
            }
        }

        info!(
            "Chain scan finished after {} passes with {} block outcomes",
            passes,
            outcomes.len()
        );
        Ok(outcomes)
    }

    /// One walk over the pending window followed by a joint wait on every
    /// dispatched scan. Only a head resolution or cursor read failure aborts it.
    pub async fn run_pass(&self) -> ScanResult<PassSummary> {
        let head = self.head.head_number().await?;
        info!("Got chain last block #{}", head);

        let cursor_before = self.read_cursor().await?;
        info!("Got last scanned block #{}", cursor_before);

        let pool_size = self.settings.pool_size;
        let liveness_window = self.settings.liveness_window();
        let mut frontier = cursor_before.max(self.settings.start_block);
        let mut next_block = frontier;
        let mut cursor_after = cursor_before;
        let mut dispatched = 0;
        let mut tasks: Vec<Task> = Vec::with_capacity(pool_size);

        info!(
            "Attempting to schedule {} scans between blocks #{}-#{}",
            pool_size, next_block, head
        );

        while tasks.len() < pool_size && next_block <= head {
            let cell = lease_cell(&self.db.scan, next_block);
            let lease = match cell.get().await {
                Ok(lease) => lease,
                Err(e) => {
                    // Without the lease we cannot classify the block, and the
                    // cursor cannot pass it either way.
                    warn!("Could not read lease for block #{}: {}", next_block, e);
                    tasks.push(Task::Settled(BlockOutcome::Failed {
                        block_number: next_block,
                        message: e.to_string(),
                    }));
                    break;
                },
            };

            let now = now_millis();
            match LeaseStatus::classify(now, lease.as_ref(), liveness_window) {
                LeaseStatus::Fresh => {
                    info!("Starting a new scan task for block #{}", next_block);
                    match cell.write(&BlockScanLease::new(next_block, now)).await {
                        Ok(()) => {
                            tasks.push(self.spawn_scan(next_block));
                            dispatched += 1;
                        },
                        Err(e) => {
                            warn!("Could not create lease for block #{}: {}", next_block, e);
                            tasks.push(Task::Settled(BlockOutcome::Failed {
                                block_number: next_block,
                                message: e.to_string(),
                            }));
                        },
                    }
                },
                LeaseStatus::Active => {
                    debug!("Have active scan for block #{}", next_block);
                    tasks.push(Task::Settled(BlockOutcome::Skipped {
                        block_number: next_block,
                    }));
                },
                LeaseStatus::Idle => {
                    info!("Have an idle scan for block #{}, resuming", next_block);
                    tasks.push(self.spawn_scan(next_block));
                    dispatched += 1;
                },
                LeaseStatus::Complete => {
                    debug!("Scan for block #{} appears complete", next_block);
                    if next_block == frontier {
                        frontier += 1;
                        match self.advance_cursor(frontier).await {
                            Ok(cursor) => {
                                cursor_after = cursor;
                                info!("Moved cursor to the next block #{}", cursor);
                            },
                            Err(e) => warn!("Failed to move cursor to #{}: {}", frontier, e),
                        }
                    }
                },
            }

            next_block += 1;
        }

        let outcomes = join_all(tasks.into_iter().map(Task::outcome)).await;
        let failed = outcomes
            .iter()
            .filter(|o| matches!(o, BlockOutcome::Failed { .. }))
            .count();
        info!(
            "Pass complete: {} dispatched, {} failed, cursor #{} -> #{}",
            dispatched, failed, cursor_before, cursor_after
        );

        Ok(PassSummary {
            head,
            cursor_before,
            cursor_after,
            dispatched,
            outcomes,
        })
    }

    /// Scans run as detached tasks so they finish even if the pass is dropped.
    fn spawn_scan(&self, block_number: u64) -> Task {
        let dispatcher = self.dispatcher.clone();
        let handle = tokio::spawn(async move { dispatcher.dispatch(block_number).await });
        Task::Running {
            block_number,
            handle,
        }
    }

    /// Moves the cursor to `to` unless it is already further along.
    async fn advance_cursor(&self, to: u64) -> Result<u64, StoreError> {
        let current = self.read_cursor().await?;
        if to > current {
            self.cursor.write(&to).await?;
            Ok(to)
        } else {
            Ok(current)
        }
    }
}
