use serde::Serialize;

use crate::db::{
    count,
    models::{BlockScanLease, LeaseStatus, LEASE_KEY_PREFIX, TOKEN_KEY_PREFIX},
};
use crate::error::ScanResult;
use crate::utils::now_millis;
use crate::worker::{scanner::lease_cell, scheduler::ScanScheduler};

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct TaskSummary {
    pub active: Vec<BlockScanLease>,
    pub idle: Vec<BlockScanLease>,
    pub complete: usize,
}

/// Snapshot of scanning progress served by `GET /api/info`.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScanInfo {
    pub cursor: u64,
    /// First block above the cursor without a lease.
    pub next_block: u64,
    pub last_block: u64,
    pub pool_size: usize,
    pub scanned_blocks: usize,
    pub indexed_tokens: usize,
    pub tasks: TaskSummary,
}

impl ScanScheduler {
    /// Walks the leased run above the cursor and classifies each block. Only
    /// reads; never dispatches or moves the cursor.
    pub async fn info(&self) -> ScanResult<ScanInfo> {
        let last_block = self.head().head_number().await?;
        let cursor = self.read_cursor().await?;
        let settings = self.settings();
        let db = self.db();

        let now = now_millis();
        let mut tasks = TaskSummary::default();
        let mut next_block = cursor.max(settings.start_block);
        while next_block <= last_block {
            let Some(lease) = lease_cell(&db.scan, next_block).get().await? else {
                break;
            };
            match LeaseStatus::classify(now, Some(&lease), settings.liveness_window()) {
                LeaseStatus::Active => tasks.active.push(lease),
                LeaseStatus::Idle => tasks.idle.push(lease),
                LeaseStatus::Complete => tasks.complete += 1,
                LeaseStatus::Fresh => break,
            }
            next_block += 1;
        }

        let (scanned_blocks, indexed_tokens) = futures::try_join!(
            count(db.scan.as_ref(), LEASE_KEY_PREFIX),
            count(db.tokens.as_ref(), TOKEN_KEY_PREFIX),
        )?;

        Ok(ScanInfo {
            cursor,
            next_block,
            last_block,
            pool_size: settings.pool_size,
            scanned_blocks,
            indexed_tokens,
            tasks,
        })
    }
}
