use std::sync::Arc;

use log::debug;
use serde::Deserialize;

use crate::error::{ScanError, ScanResult};

use super::{client::query_as, GraphQLRequest, Subgraph};

const HEAD_QUERY: &str = "query { _meta { block { number } } }";

#[derive(Debug, Deserialize)]
struct MetaData {
    #[serde(rename = "_meta")]
    meta: Option<Meta>,
}

#[derive(Debug, Deserialize)]
struct Meta {
    block: Option<MetaBlock>,
}

#[derive(Debug, Deserialize)]
struct MetaBlock {
    number: u64,
}

/// Resolves the latest block the indexer has safely ingested.
///
/// The reported head is reduced by one: the indexer may still be ingesting
/// its newest block.
#[derive(Clone)]
pub struct ChainHeadResolver {
    subgraph: Arc<dyn Subgraph>,
}

impl ChainHeadResolver {
    pub fn new(subgraph: Arc<dyn Subgraph>) -> Self {
        Self { subgraph }
    }

    pub async fn head_number(&self) -> ScanResult<u64> {
        let data: MetaData = query_as(self.subgraph.as_ref(), GraphQLRequest::new(HEAD_QUERY))
            .await
            .map_err(|e| ScanError::Resolution(e.to_string()))?;

        let number = data
            .meta
            .and_then(|meta| meta.block)
            .map(|block| block.number)
            .ok_or_else(|| ScanError::Resolution("indexer reported no head block".to_string()))?;

        debug!("Indexer reports head block #{}", number);
        Ok(number.saturating_sub(1))
    }
}
