//! Small helpers shared across the scanner.

use std::time::Duration;

use chrono::{DateTime, Utc};

/// Current wall-clock time in epoch milliseconds, the unit leases are stored in.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// `start + budget`, saturating at the maximum representable time.
pub fn deadline_after(start: DateTime<Utc>, budget: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(budget)
        .ok()
        .and_then(|budget| start.checked_add_signed(budget))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
