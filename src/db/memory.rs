use std::collections::BTreeMap;
use std::ops::Bound;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::error::StoreError;

use super::{KeyEntry, KvStore, ListOptions, ListPage, DEFAULT_LIST_LIMIT};

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    metadata: Option<Value>,
}

/// In-process key-value store ordered by key.
///
/// Used for single-node deployments and as the substitute store in tests.
#[derive(Debug)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<String, Entry>>,
    list_limit: usize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_list_limit(DEFAULT_LIST_LIMIT)
    }

    /// Caps the page size of [`KvStore::list`], whatever the caller asks for.
    pub fn with_list_limit(list_limit: usize) -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
            list_limit: list_limit.max(1),
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.read().await.get(key).map(|e| e.value.clone()))
    }

    async fn put(
        &self,
        key: &str,
        value: String,
        metadata: Option<Value>,
    ) -> Result<(), StoreError> {
        self.entries
            .write()
            .await
            .insert(key.to_string(), Entry { value, metadata });
        Ok(())
    }

    async fn list(&self, options: &ListOptions) -> Result<ListPage, StoreError> {
        let limit = options
            .limit
            .unwrap_or(self.list_limit)
            .clamp(1, self.list_limit);
        let prefix = options.prefix.as_deref().unwrap_or("");

        let lower = match &options.cursor {
            Some(cursor) => Bound::Excluded(cursor.clone()),
            None => Bound::Included(prefix.to_string()),
        };

        let entries = self.entries.read().await;
        let mut matching = entries
            .range((lower, Bound::Unbounded))
            .take_while(|(name, _)| name.starts_with(prefix))
            .map(|(name, entry)| KeyEntry {
                name: name.clone(),
                metadata: entry.metadata.clone(),
            });

        let keys: Vec<KeyEntry> = matching.by_ref().take(limit).collect();
        let complete = matching.next().is_none();
        let cursor = if complete {
            None
        } else {
            keys.last().map(|k| k.name.clone())
        };

        Ok(ListPage {
            keys,
            cursor,
            complete,
        })
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.entries.write().await.remove(key);
        Ok(())
    }
}
