use axum::extract::{Path, State};
use chrono::Utc;
use log::{info, warn};

use crate::utils::deadline_after;
use crate::worker::{BlockOutcome, ScanInfo, ScanReport};

use super::{ApiError, AppState, Envelope};

type ApiResult<T> = Result<Envelope<T>, ApiError>;

/// `POST /api/scan`: one synchronous scheduling run with half the budget.
///
/// The run is spawned so a client hanging up does not cancel dispatches that
/// are already in flight.
pub async fn scan_chain(State(state): State<AppState>) -> ApiResult<Vec<BlockOutcome>> {
    let scheduler = state.scheduler.clone();
    let deadline = deadline_after(Utc::now(), scheduler.settings().time_budget() / 2);
    info!("Scan requested over HTTP (deadline {})", deadline);

    let result = tokio::spawn(async move { scheduler.scan_chain(Some(deadline)).await }).await?;
    if let Err(e) = &result {
        warn!("HTTP scan failed: {:#}", e);
    }
    Ok(Envelope::from(result))
}

/// `POST /api/scan/:block_number`: one page cycle of a single block.
pub async fn scan_block(
    State(state): State<AppState>,
    Path(block_number): Path<String>,
) -> ApiResult<ScanReport> {
    let Ok(block_number) = block_number.parse::<u64>() else {
        warn!("Rejected scan of invalid block number {:?}", block_number);
        return Ok(Envelope::error(format!(
            "Invalid block number: {}",
            block_number
        )));
    };

    let scanner = state.scanner.clone();
    let result = tokio::spawn(async move { scanner.scan(block_number).await }).await?;
    Ok(Envelope::from(result))
}

/// `GET /api/info`
pub async fn info(State(state): State<AppState>) -> ApiResult<ScanInfo> {
    Ok(Envelope::from(state.scheduler.info().await))
}

pub async fn not_found() -> ApiError {
    ApiError::not_found()
}
