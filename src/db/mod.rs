use std::sync::Arc;

use async_trait::async_trait;
use log::info;
use serde_json::Value;

use crate::config::{StorageBackend, StorageSettings};
use crate::error::StoreError;

pub mod cell;
pub mod memory;
pub mod models;
pub mod postgres;

pub use cell::Cell;
pub use memory::MemoryStore;
pub use postgres::{PostgresClient, PostgresStore};

/// Default page size of [`KvStore::list`].
pub const DEFAULT_LIST_LIMIT: usize = 1000;

/// Namespace holding the progress cursor and block scan leases.
pub const SCAN_NAMESPACE: &str = "scan";
/// Namespace holding scanned token records.
pub const TOKENS_NAMESPACE: &str = "tokens";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListOptions {
    pub prefix: Option<String>,
    /// Last key of the previous page; listing resumes strictly after it.
    pub cursor: Option<String>,
    pub limit: Option<usize>,
}

impl ListOptions {
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: Some(prefix.into()),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct KeyEntry {
    pub name: String,
    pub metadata: Option<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ListPage {
    pub keys: Vec<KeyEntry>,
    pub cursor: Option<String>,
    pub complete: bool,
}

/// Key-value store shared by every component.
///
/// Writes are plain overwrites. There is no compare-and-swap: concurrent
/// writers to the same key race and the last write wins.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn put(&self, key: &str, value: String, metadata: Option<Value>)
        -> Result<(), StoreError>;

    async fn list(&self, options: &ListOptions) -> Result<ListPage, StoreError>;

    async fn delete(&self, key: &str) -> Result<(), StoreError>;
}

/// Collects every key under `prefix`, following list cursors to the end.
pub async fn list_all_keys(store: &dyn KvStore, prefix: &str) -> Result<Vec<String>, StoreError> {
    let mut options = ListOptions::with_prefix(prefix);
    let mut names = Vec::new();
    loop {
        let page = store.list(&options).await?;
        names.extend(page.keys.into_iter().map(|k| k.name));
        if page.complete {
            return Ok(names);
        }
        options.cursor = page.cursor;
    }
}

/// Counts keys under `prefix` without keeping them around.
pub async fn count(store: &dyn KvStore, prefix: &str) -> Result<usize, StoreError> {
    let mut options = ListOptions::with_prefix(prefix);
    let mut total = 0;
    loop {
        let page = store.list(&options).await?;
        total += page.keys.len();
        if page.complete {
            return Ok(total);
        }
        options.cursor = page.cursor;
    }
}

/// Store handles for both namespaces.
#[derive(Clone)]
pub struct Database {
    pub scan: Arc<dyn KvStore>,
    pub tokens: Arc<dyn KvStore>,
}

impl Database {
    pub async fn new(settings: &StorageSettings) -> anyhow::Result<Self> {
        match settings.backend {
            StorageBackend::Memory => {
                info!("Using in-memory key-value store (state is lost on restart)");
                Ok(Self::in_memory())
            },
            StorageBackend::Postgres => {
                let pg_settings = settings.postgres.clone().ok_or_else(|| {
                    anyhow::anyhow!("storage.postgres is required for the postgres backend")
                })?;
                let client = Arc::new(PostgresClient::new(pg_settings).await?);
                client.migrate().await?;
                Ok(Self {
                    scan: Arc::new(PostgresStore::new(client.clone(), SCAN_NAMESPACE)),
                    tokens: Arc::new(PostgresStore::new(client, TOKENS_NAMESPACE)),
                })
            },
        }
    }

    pub fn in_memory() -> Self {
        Self {
            scan: Arc::new(MemoryStore::new()),
            tokens: Arc::new(MemoryStore::new()),
        }
    }
}
