use std::sync::Arc;

use log::{error, info, warn};
use serde::{Deserialize, Serialize};

use crate::db::{
    models::{BlockScanLease, Token},
    Cell, KvStore,
};
use crate::error::ScanResult;
use crate::utils::now_millis;
use crate::worker::page::PageFetcher;

/// Outcome of one page-fetch cycle for a block.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScanReport {
    /// The block has no tokens left to fetch.
    pub done: bool,
    /// Tokens stored by this cycle.
    pub scanned: usize,
}

pub fn lease_cell(leases: &Arc<dyn KvStore>, block_number: u64) -> Cell<BlockScanLease> {
    Cell::new(leases.clone(), BlockScanLease::key(block_number))
}

/// Scans one page of a single block and records progress on its lease.
///
/// Every step is safe to repeat: tokens are upserted and the lease watermark
/// only moves past tokens that were stored. A failed cycle leaves the lease
/// at the last stored token with an errored heartbeat so the next scheduling
/// pass resumes it.
pub struct BlockScanner {
    leases: Arc<dyn KvStore>,
    fetcher: PageFetcher,
}

impl BlockScanner {
    pub fn new(leases: Arc<dyn KvStore>, fetcher: PageFetcher) -> Self {
        Self { leases, fetcher }
    }

    pub async fn scan(&self, block_number: u64) -> ScanResult<ScanReport> {
        info!("Scanner: received scan request for block #{}", block_number);
        let cell = lease_cell(&self.leases, block_number);

        match self.scan_page(&cell, block_number).await {
            Ok(report) => {
                info!(
                    "Scanner: block #{} stored {} tokens (done: {})",
                    block_number, report.scanned, report.done
                );
                Ok(report)
            },
            Err(e) => {
                warn!("Scanner: scan of block #{} failed: {:#}", block_number, e);
                let reason = e.to_string();
                if let Err(mark) = cell.update(move |lease| lease.fail(reason)).await {
                    error!(
                        "Scanner: could not mark lease of block #{} as errored: {}",
                        block_number, mark
                    );
                }
                Err(e)
            },
        }
    }

    async fn scan_page(
        &self,
        cell: &Cell<BlockScanLease>,
        block_number: u64,
    ) -> ScanResult<ScanReport> {
        // Heartbeat before any I/O so concurrent schedulers see us as active.
        let now = now_millis();
        let lease = cell
            .read(BlockScanLease::new(block_number, now))
            .await?
            .heartbeat(now);
        cell.write(&lease).await?;

        let tokens = self.fetcher.fetch_page(block_number, &lease.last_id).await?;
        let scanned = tokens.len();

        for token in &tokens {
            self.store_token(cell, token).await?;
        }

        let done = scanned < self.fetcher.page_size();
        let now = now_millis();
        cell.update(move |lease| {
            if done {
                lease.complete(now)
            } else {
                lease.release()
            }
        })
        .await?;

        Ok(ScanReport { done, scanned })
    }

    /// Stores `token`, then records it against the lease as currently stored,
    /// so a slow attempt cannot undo what a newer one wrote.
    async fn store_token(&self, cell: &Cell<BlockScanLease>, token: &Token) -> ScanResult<()> {
        self.fetcher.store(token).await?;
        let now = now_millis();
        cell.update(move |lease| lease.advance(&token.id, now)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{HEARTBEAT_ERRORED, HEARTBEAT_IDLE, TOKEN_KEY_PREFIX};
    use crate::db::{count, MemoryStore};
    use crate::error::ScanError;
    use crate::testing::{FailingStore, FakeSubgraph};

    struct Fixture {
        subgraph: Arc<FakeSubgraph>,
        leases: Arc<dyn KvStore>,
        tokens: Arc<dyn KvStore>,
        scanner: BlockScanner,
    }

    fn fixture(page_size: usize, tokens: Arc<dyn KvStore>) -> Fixture {
        let subgraph = Arc::new(FakeSubgraph::new(5806620));
        let leases: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
        let fetcher = PageFetcher::new(subgraph.clone(), tokens.clone(), page_size);
        Fixture {
            subgraph,
            leases: leases.clone(),
            tokens,
            scanner: BlockScanner::new(leases, fetcher),
        }
    }

    async fn lease(fixture: &Fixture, block_number: u64) -> BlockScanLease {
        lease_cell(&fixture.leases, block_number)
            .get()
            .await
            .unwrap()
            .expect("lease written")
    }

    #[tokio::test]
    async fn test_short_page_completes_block() {
        let f = fixture(100, Arc::new(MemoryStore::new()));
        let ids = f.subgraph.add_tokens(5806610, 37);

        let report = f.scanner.scan(5806610).await.unwrap();
        assert_eq!(
            report,
            ScanReport {
                done: true,
                scanned: 37
            }
        );

        let lease = lease(&f, 5806610).await;
        assert!(lease.end_time.is_some());
        assert_eq!(lease.last_id, ids[36]);
        assert_eq!(count(f.tokens.as_ref(), TOKEN_KEY_PREFIX).await.unwrap(), 37);
    }

    #[tokio::test]
    async fn test_full_page_releases_lease() {
        let f = fixture(10, Arc::new(MemoryStore::new()));
        let ids = f.subgraph.add_tokens(9, 25);

        let report = f.scanner.scan(9).await.unwrap();
        assert_eq!(
            report,
            ScanReport {
                done: false,
                scanned: 10
            }
        );

        let lease = lease(&f, 9).await;
        assert!(lease.end_time.is_none());
        assert_eq!(lease.last_id, ids[9]);
        assert_eq!(lease.update_time, HEARTBEAT_IDLE);

        // Next cycles continue from the watermark until the block is drained.
        assert_eq!(f.scanner.scan(9).await.unwrap().scanned, 10);
        let last = f.scanner.scan(9).await.unwrap();
        assert_eq!(
            last,
            ScanReport {
                done: true,
                scanned: 5
            }
        );
        assert_eq!(f.subgraph.page_queries()[1], (9, ids[9].clone()));
        assert_eq!(count(f.tokens.as_ref(), TOKEN_KEY_PREFIX).await.unwrap(), 25);
    }

    #[tokio::test]
    async fn test_empty_block_completes() {
        let f = fixture(100, Arc::new(MemoryStore::new()));
        let report = f.scanner.scan(1).await.unwrap();
        assert!(report.done);
        assert_eq!(report.scanned, 0);
        assert!(lease(&f, 1).await.is_complete());
    }

    #[tokio::test]
    async fn test_query_failure_marks_lease_errored() {
        let f = fixture(100, Arc::new(MemoryStore::new()));
        f.subgraph.fail_block(3, "indexer timeout");

        let error = f.scanner.scan(3).await.unwrap_err();
        assert!(matches!(error, ScanError::Query(_)));

        let lease = lease(&f, 3).await;
        assert_eq!(lease.update_time, HEARTBEAT_ERRORED);
        assert!(lease.end_time.is_none());
        assert_eq!(lease.last_error.as_deref(), Some("indexer timeout"));
    }

    #[tokio::test]
    async fn test_store_failure_keeps_stored_prefix() {
        let tokens = Arc::new(FailingStore::new(10));
        let f = fixture(100, tokens.clone());
        let ids = f.subgraph.add_tokens(5806611, 100);

        let error = f.scanner.scan(5806611).await.unwrap_err();
        assert!(matches!(error, ScanError::Store(_)));

        let lease = lease(&f, 5806611).await;
        assert_eq!(lease.last_id, ids[9]);
        assert_eq!(lease.update_time, HEARTBEAT_ERRORED);
        assert!(lease.end_time.is_none());
        assert_eq!(tokens.len().await, 10);

        // Resuming picks up at the 11th token.
        tokens.allow(usize::MAX);
        let report = f.scanner.scan(5806611).await.unwrap();
        assert_eq!(report.scanned, 90);
        assert!(report.done);
        assert_eq!(f.subgraph.page_queries()[1], (5806611, ids[9].clone()));
        assert_eq!(tokens.len().await, 100);
    }

    #[tokio::test]
    async fn test_repeated_scan_is_idempotent() {
        let f = fixture(100, Arc::new(MemoryStore::new()));
        f.subgraph.add_tokens(12, 5);
        let stale = BlockScanLease::new(12, 0);
        lease_cell(&f.leases, 12).write(&stale).await.unwrap();

        f.scanner.scan(12).await.unwrap();
        let first = lease(&f, 12).await;

        // Replay from the same stored state.
        lease_cell(&f.leases, 12).write(&stale).await.unwrap();
        f.scanner.scan(12).await.unwrap();
        let second = lease(&f, 12).await;

        assert_eq!(first.last_id, second.last_id);
        assert!(second.end_time.is_some());
        assert_eq!(count(f.tokens.as_ref(), TOKEN_KEY_PREFIX).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_late_token_write_keeps_completed_lease() {
        let f = fixture(100, Arc::new(MemoryStore::new()));
        let ids = f.subgraph.add_tokens(7, 3);
        let page = f.scanner.fetcher.fetch_page(7, "").await.unwrap();

        f.scanner.scan(7).await.unwrap();
        let done = lease(&f, 7).await;
        assert!(done.is_complete());

        // An attempt that stalled before storing the first token resumes.
        let cell = lease_cell(&f.leases, 7);
        f.scanner.store_token(&cell, &page[0]).await.unwrap();

        let after = lease(&f, 7).await;
        assert_eq!(after.end_time, done.end_time);
        assert_eq!(after.last_id, ids[2]);
    }

    #[tokio::test]
    async fn test_rescan_of_complete_block_keeps_end_time() {
        let f = fixture(100, Arc::new(MemoryStore::new()));
        let done = BlockScanLease::new(4, 10).complete(20);
        lease_cell(&f.leases, 4).write(&done).await.unwrap();

        f.scanner.scan(4).await.unwrap();
        assert_eq!(lease(&f, 4).await.end_time, Some(20));
    }
}
