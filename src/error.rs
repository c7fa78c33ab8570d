use thiserror::Error;

use crate::subgraph::GraphQLError;

/// Failure reported by a key-value store backend.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("store backend error: {0}")]
    Backend(String),

    #[error("failed to decode value at {key}: {reason}")]
    Decode { key: String, reason: String },

    #[error("failed to encode value for {key}: {reason}")]
    Encode { key: String, reason: String },
}

impl From<deadpool_postgres::PoolError> for StoreError {
    fn from(error: deadpool_postgres::PoolError) -> Self {
        StoreError::Backend(error.to_string())
    }
}

impl From<tokio_postgres::Error> for StoreError {
    fn from(error: tokio_postgres::Error) -> Self {
        StoreError::Backend(error.to_string())
    }
}

/// Indexer query failure carrying the list of errors the subgraph reported.
///
/// Transport failures are folded in as a single synthetic error so callers
/// only ever deal with one shape.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{}", join_messages(.errors))]
pub struct QueryError {
    pub errors: Vec<GraphQLError>,
}

impl QueryError {
    pub fn new(errors: Vec<GraphQLError>) -> Self {
        Self { errors }
    }

    pub fn message(message: impl Into<String>) -> Self {
        Self {
            errors: vec![GraphQLError::new(message)],
        }
    }
}

fn join_messages(errors: &[GraphQLError]) -> String {
    if errors.is_empty() {
        return "indexer returned no data".to_string();
    }
    errors
        .iter()
        .map(|e| e.message.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

impl From<reqwest::Error> for QueryError {
    fn from(error: reqwest::Error) -> Self {
        QueryError::message(format!("indexer request failed: {}", error))
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScanError {
    /// No usable chain head. Fatal for the current scheduling pass.
    #[error("failed to resolve chain head: {0}")]
    Resolution(String),

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// The scan endpoint could not be reached or answered with a malformed envelope.
    #[error("dispatch for block #{block_number} failed: {reason}")]
    Dispatch { block_number: u64, reason: String },
}

pub type ScanResult<T> = Result<T, ScanError>;
