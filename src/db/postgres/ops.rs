use std::sync::Arc;

use async_trait::async_trait;
use log::error;
use serde_json::Value;

use crate::db::{KeyEntry, KvStore, ListOptions, ListPage, DEFAULT_LIST_LIMIT};
use crate::error::StoreError;

use super::PostgresClient;

/// PostgreSQL text columns reject NUL bytes.
fn sanitize_string(s: &str) -> String {
    s.replace('\0', "")
}

/// Escapes `LIKE` wildcards so a key prefix matches literally.
fn like_prefix(prefix: &str) -> String {
    let mut pattern = String::with_capacity(prefix.len() + 1);
    for c in prefix.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

/// One namespace of the shared `kv_entries` table.
#[derive(Clone)]
pub struct PostgresStore {
    client: Arc<PostgresClient>,
    namespace: String,
}

impl PostgresStore {
    pub fn new(client: Arc<PostgresClient>, namespace: impl Into<String>) -> Self {
        Self {
            client,
            namespace: namespace.into(),
        }
    }
}

#[async_trait]
impl KvStore for PostgresStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let client = self.client.pool.get().await?;
        let query = "SELECT value FROM niftyscan.kv_entries WHERE namespace = $1 AND key = $2";

        let row = client.query_opt(query, &[&self.namespace, &key]).await?;
        Ok(row.map(|r| r.get("value")))
    }

    async fn put(
        &self,
        key: &str,
        value: String,
        metadata: Option<Value>,
    ) -> Result<(), StoreError> {
        let client = self.client.pool.get().await?;
        let query = r#"
            INSERT INTO niftyscan.kv_entries (namespace, key, value, metadata, updated_at)
            VALUES ($1, $2, $3, $4, NOW())
            ON CONFLICT (namespace, key) DO UPDATE SET
                value = EXCLUDED.value,
                metadata = EXCLUDED.metadata,
                updated_at = EXCLUDED.updated_at
        "#;

        let metadata = metadata.map(|m| m.to_string());
        client
            .execute(
                query,
                &[&self.namespace, &key, &sanitize_string(&value), &metadata],
            )
            .await
            .map_err(|e| {
                error!(
                    "Failed to upsert {} in namespace {}: {:?}",
                    key, self.namespace, e
                );
                e
            })?;

        Ok(())
    }

    async fn list(&self, options: &ListOptions) -> Result<ListPage, StoreError> {
        let client = self.client.pool.get().await?;
        let limit = options.limit.unwrap_or(DEFAULT_LIST_LIMIT).max(1);
        let pattern = like_prefix(options.prefix.as_deref().unwrap_or(""));
        let after = options.cursor.clone().unwrap_or_default();
        // One extra row tells whether another page exists.
        let fetch = (limit + 1) as i64;

        let query = r#"
            SELECT key, metadata FROM niftyscan.kv_entries
            WHERE namespace = $1 AND key LIKE $2 AND key > $3
            ORDER BY key
            LIMIT $4
        "#;
        let rows = client
            .query(query, &[&self.namespace, &pattern, &after, &fetch])
            .await?;

        let complete = rows.len() <= limit;
        let keys: Vec<KeyEntry> = rows
            .iter()
            .take(limit)
            .map(|row| {
                let metadata: Option<String> = row.get("metadata");
                KeyEntry {
                    name: row.get("key"),
                    metadata: metadata.and_then(|m| serde_json::from_str(&m).ok()),
                }
            })
            .collect();
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
        let client = self.client.pool.get().await?;
        client
            .execute(
                "DELETE FROM niftyscan.kv_entries WHERE namespace = $1 AND key = $2",
                &[&self.namespace, &key],
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_like_prefix_escapes_wildcards() {
        assert_eq!(like_prefix("eip-721:block:"), "eip-721:block:%");
        assert_eq!(like_prefix("a_b%"), "a\\_b\\%%");
    }

    #[test]
    fn test_sanitize_strips_nul() {
        assert_eq!(sanitize_string("ipfs://\0cid"), "ipfs://cid");
    }
}
