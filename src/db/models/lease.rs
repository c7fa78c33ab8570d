use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const LEASE_KEY_PREFIX: &str = "eip-721:block:";

/// Heartbeat written after a full page was stored: the block has more
/// tokens and should be resumed by the next scheduling pass.
pub const HEARTBEAT_IDLE: i64 = 0;

/// Heartbeat written when the last attempt failed. Classified like
/// [`HEARTBEAT_IDLE`], kept distinct so errored leases can be told apart.
pub const HEARTBEAT_ERRORED: i64 = -1;

/// Persisted progress of scanning one block (`eip-721:block:<n>`).
///
/// No lock is held on a lease. Whichever invocation is scanning the block
/// writes it, and a second invocation racing on the same block re-stores
/// the same tokens: at-most-once in the common case, safely duplicated in
/// the rare race.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BlockScanLease {
    pub block_number: u64,
    /// Id of the last token stored for this block. Next page starts after it.
    pub last_id: String,
    /// Epoch millis.
    pub start_time: i64,
    /// Heartbeat in epoch millis, or one of the `HEARTBEAT_*` sentinels.
    pub update_time: i64,
    /// Set once the block has been fully scanned.
    pub end_time: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl BlockScanLease {
    pub fn new(block_number: u64, now: i64) -> Self {
        Self {
            block_number,
            last_id: String::new(),
            start_time: now,
            update_time: now,
            end_time: None,
            last_error: None,
        }
    }

    pub fn key(block_number: u64) -> String {
        format!("{}{}", LEASE_KEY_PREFIX, block_number)
    }

    pub fn is_complete(&self) -> bool {
        self.end_time.is_some()
    }

    pub fn is_errored(&self) -> bool {
        !self.is_complete() && self.update_time == HEARTBEAT_ERRORED
    }

    pub fn heartbeat(mut self, now: i64) -> Self {
        self.update_time = now;
        self
    }

    /// Records a stored token and refreshes the heartbeat. The watermark
    /// never moves backwards and `end_time` is left as is.
    pub fn advance(mut self, token_id: &str, now: i64) -> Self {
        if token_id > self.last_id.as_str() {
            self.last_id = token_id.to_string();
        }
        self.update_time = now;
        self
    }

    /// Marks the block fully scanned. An existing `end_time` is kept.
    pub fn complete(mut self, now: i64) -> Self {
        self.end_time = self.end_time.or(Some(now));
        self.last_error = None;
        self
    }

    pub fn release(mut self) -> Self {
        self.update_time = HEARTBEAT_IDLE;
        self
    }

    pub fn fail(mut self, reason: impl Into<String>) -> Self {
        self.update_time = HEARTBEAT_ERRORED;
        self.last_error = Some(reason.into());
        self
    }
}

/// Scheduling view of a lease. Derived on demand, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LeaseStatus {
    /// No lease exists yet.
    Fresh,
    /// Heartbeat is recent; some invocation is presumably working on it.
    Active,
    /// Heartbeat is stale or a sentinel; eligible for resume.
    Idle,
    Complete,
}

impl LeaseStatus {
    /// Classifies `lease` at time `now` (epoch millis).
    pub fn classify(now: i64, lease: Option<&BlockScanLease>, liveness_window: Duration) -> Self {
        let Some(lease) = lease else {
            return LeaseStatus::Fresh;
        };
        if lease.is_complete() {
            return LeaseStatus::Complete;
        }
        let window = i64::try_from(liveness_window.as_millis()).unwrap_or(i64::MAX);
        if now.saturating_sub(lease.update_time) < window {
            LeaseStatus::Active
        } else {
            LeaseStatus::Idle
        }
    }
}
