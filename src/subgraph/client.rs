use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::Value;
use url::Url;

use crate::config::SubgraphSettings;
use crate::error::QueryError;

use super::graphql::{GraphQLRequest, GraphQLResponse};

/// Query interface of the blockchain indexer.
///
/// Returns the `data` object on success. Any response without `data` is a
/// [`QueryError`] carrying whatever errors the indexer reported.
#[async_trait]
pub trait Subgraph: Send + Sync {
    async fn query(&self, request: GraphQLRequest) -> Result<Value, QueryError>;
}

/// Runs `request` and decodes the `data` object into `T`.
pub async fn query_as<T: DeserializeOwned>(
    subgraph: &dyn Subgraph,
    request: GraphQLRequest,
) -> Result<T, QueryError> {
    let data = subgraph.query(request).await?;
    serde_json::from_value(data)
        .map_err(|e| QueryError::message(format!("unexpected indexer response: {}", e)))
}

/// Subgraph client speaking GraphQL over HTTP POST.
#[derive(Clone)]
pub struct HttpSubgraph {
    client: Client,
    endpoint: Url,
}

impl HttpSubgraph {
    pub fn new(settings: &SubgraphSettings) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(settings.request_timeout_ms))
            .build()?;

        Ok(Self {
            client,
            endpoint: settings.url.clone(),
        })
    }
}

#[async_trait]
impl Subgraph for HttpSubgraph {
    async fn query(&self, request: GraphQLRequest) -> Result<Value, QueryError> {
        debug!("Querying subgraph {}", self.endpoint);

        let response: GraphQLResponse = self
            .client
            .post(self.endpoint.clone())
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        match response.data {
            Some(data) if !data.is_null() => Ok(data),
            _ => Err(QueryError::new(response.errors.unwrap_or_default())),
        }
    }
}
