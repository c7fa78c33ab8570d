use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info};
use reqwest::Client;
use url::Url;

use crate::api::Envelope;
use crate::error::{ScanError, ScanResult};
use crate::worker::scanner::{BlockScanner, ScanReport};

/// How the scheduler hands a block to the scan endpoint.
#[async_trait]
pub trait ScanDispatch: Send + Sync {
    async fn dispatch(&self, block_number: u64) -> ScanResult<ScanReport>;
}

/// Calls the scanner in-process.
pub struct LocalDispatch {
    scanner: Arc<BlockScanner>,
}

impl LocalDispatch {
    pub fn new(scanner: Arc<BlockScanner>) -> Self {
        Self { scanner }
    }
}

#[async_trait]
impl ScanDispatch for LocalDispatch {
    async fn dispatch(&self, block_number: u64) -> ScanResult<ScanReport> {
        self.scanner.scan(block_number).await
    }
}

/// Calls `POST {location}/api/scan/{block}`, so each block scan runs as its
/// own request on whichever instance serves `location`.
pub struct HttpDispatch {
    client: Client,
    location: Url,
}

impl HttpDispatch {
    pub fn new(location: Url, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, location })
    }

    fn endpoint(&self, block_number: u64) -> Result<Url, url::ParseError> {
        self.location.join(&format!("/api/scan/{}", block_number))
    }
}

#[async_trait]
impl ScanDispatch for HttpDispatch {
    async fn dispatch(&self, block_number: u64) -> ScanResult<ScanReport> {
        let failed = |reason: String| ScanError::Dispatch {
            block_number,
            reason,
        };

        let url = self
            .endpoint(block_number)
            .map_err(|e| failed(e.to_string()))?;
        info!("Start scanner {}", url);

        let response = self
            .client
            .post(url)
            .send()
            .await
            .map_err(|e| failed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(failed(format!("HTTP Error {}", status)));
        }

        let envelope: Envelope<ScanReport> = response
            .json()
            .await
            .map_err(|e| failed(format!("malformed scan response: {}", e)))?;
        debug!("Scan result for block #{} is {:?}", block_number, envelope);

        envelope.into_result().map_err(failed)
    }
}
