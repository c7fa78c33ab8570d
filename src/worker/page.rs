use std::sync::Arc;

use log::debug;
use serde::Deserialize;

use crate::db::{models::Token, KvStore};
use crate::error::{QueryError, StoreError};
use crate::subgraph::{query_as, GraphQLRequest, Subgraph};

const TOKENS_QUERY: &str = r#"
query BlockTokens($first: Int!, $blockNumber: BigInt!, $lastId: ID!) {
  tokens(
    first: $first
    orderBy: id
    orderDirection: asc
    where: { tokenURI_not: "", blockNumber: $blockNumber, id_gt: $lastId }
  ) {
    id
    tokenID
    tokenURI
    mintTime
    blockNumber
    blockHash
    contract { id name symbol supportsEIP721Metadata }
    owner { id }
  }
}
"#;

#[derive(Debug, Deserialize)]
struct TokensData {
    tokens: Vec<Token>,
}

/// Fetches pages of a block's tokens from the subgraph and upserts them into
/// the token store.
#[derive(Clone)]
pub struct PageFetcher {
    subgraph: Arc<dyn Subgraph>,
    tokens: Arc<dyn KvStore>,
    page_size: usize,
}

impl PageFetcher {
    pub fn new(subgraph: Arc<dyn Subgraph>, tokens: Arc<dyn KvStore>, page_size: usize) -> Self {
        Self {
            subgraph,
            tokens,
            page_size,
        }
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Up to `page_size` tokens minted in `block_number` with an id greater
    /// than `last_id`, in ascending id order.
    pub async fn fetch_page(
        &self,
        block_number: u64,
        last_id: &str,
    ) -> Result<Vec<Token>, QueryError> {
        let request = GraphQLRequest::new(TOKENS_QUERY)
            .variable("first", self.page_size)
            .variable("blockNumber", block_number.to_string())
            .variable("lastId", last_id);

        let data: TokensData = query_as(self.subgraph.as_ref(), request).await?;
        debug!(
            "Fetched {} tokens for block #{} after {:?}",
            data.tokens.len(),
            block_number,
            last_id
        );
        Ok(data.tokens)
    }

    /// Idempotent: storing the same token twice leaves one record.
    pub async fn store(&self, token: &Token) -> Result<(), StoreError> {
        let raw = serde_json::to_string(token).map_err(|e| StoreError::Encode {
            key: token.key(),
            reason: e.to_string(),
        })?;
        self.tokens.put(&token.key(), raw, None).await
    }
}
