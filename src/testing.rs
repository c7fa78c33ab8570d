//! Test doubles: a scripted subgraph and a key-value store that can be made
//! to fail after a number of writes.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::db::models::{Token, TokenContract, TokenOwner};
use crate::db::{KvStore, ListOptions, ListPage, MemoryStore};
use crate::error::{QueryError, StoreError};
use crate::subgraph::{GraphQLRequest, Subgraph};

#[derive(Default)]
struct FakeState {
    head: Option<u64>,
    head_error: Option<String>,
    tokens: BTreeMap<u64, Vec<Token>>,
    block_errors: HashMap<u64, String>,
    page_queries: Vec<(u64, String)>,
}

/// In-memory subgraph answering the head and block token queries.
pub struct FakeSubgraph {
    state: Mutex<FakeState>,
}

impl FakeSubgraph {
    pub fn new(reported_head: u64) -> Self {
        Self {
            state: Mutex::new(FakeState {
                head: Some(reported_head),
                ..Default::default()
            }),
        }
    }

    pub fn set_head(&self, reported_head: u64) {
        let mut state = self.state.lock().unwrap();
        state.head = Some(reported_head);
        state.head_error = None;
    }

    pub fn fail_head(&self, message: &str) {
        self.state.lock().unwrap().head_error = Some(message.to_string());
    }

    pub fn hide_head(&self) {
        self.state.lock().unwrap().head = None;
    }

    /// Adds `count` tokens to `block_number` and returns their ids in order.
    pub fn add_tokens(&self, block_number: u64, count: usize) -> Vec<String> {
        let mut state = self.state.lock().unwrap();
        let tokens = state.tokens.entry(block_number).or_default();
        let offset = tokens.len();
        let ids: Vec<String> = (offset..offset + count)
            .map(|i| format!("0x{:040x}_{:06}", block_number, i))
            .collect();
        tokens.extend(ids.iter().map(|id| token(block_number, id)));
        tokens.sort_by(|a, b| a.id.cmp(&b.id));
        ids
    }

    pub fn fail_block(&self, block_number: u64, message: &str) {
        self.state
            .lock()
            .unwrap()
            .block_errors
            .insert(block_number, message.to_string());
    }

    pub fn heal_block(&self, block_number: u64) {
        self.state.lock().unwrap().block_errors.remove(&block_number);
    }

    /// `(block, lastId)` of every token page query received so far.
    pub fn page_queries(&self) -> Vec<(u64, String)> {
        self.state.lock().unwrap().page_queries.clone()
    }
}

fn token(block_number: u64, id: &str) -> Token {
    Token {
        id: id.to_string(),
        token_id: id.rsplit('_').next().unwrap_or_default().to_string(),
        token_uri: format!("ipfs://bafy{}/{}", block_number, id),
        mint_time: "1617000000".to_string(),
        block_number: block_number.to_string(),
        block_hash: format!("0x{:064x}", block_number),
        contract: TokenContract {
            id: format!("0x{:040x}", block_number),
            name: Some("Fixture".to_string()),
            symbol: Some("FIX".to_string()),
            supports_eip721_metadata: true,
        },
        owner: TokenOwner {
            id: "0x0000000000000000000000000000000000000001".to_string(),
        },
    }
}

#[async_trait]
impl Subgraph for FakeSubgraph {
    async fn query(&self, request: GraphQLRequest) -> Result<Value, QueryError> {
        let mut state = self.state.lock().unwrap();

        if request.query.contains("_meta") {
            if let Some(message) = &state.head_error {
                return Err(QueryError::message(message.clone()));
            }
            return Ok(match state.head {
                Some(number) => json!({ "_meta": { "block": { "number": number } } }),
                None => json!({ "_meta": null }),
            });
        }

        let first = request.variables["first"].as_u64().unwrap_or(100) as usize;
        let block_number: u64 = request.variables["blockNumber"]
            .as_str()
            .and_then(|s| s.parse().ok())
            .unwrap_or_default();
        let last_id = request.variables["lastId"]
            .as_str()
            .unwrap_or_default()
            .to_string();
        state.page_queries.push((block_number, last_id.clone()));

        if let Some(message) = state.block_errors.get(&block_number) {
            return Err(QueryError::message(message.clone()));
        }

        let page: Vec<&Token> = state
            .tokens
            .get(&block_number)
            .map(|tokens| {
                tokens
                    .iter()
                    .filter(|t| t.id.as_str() > last_id.as_str())
                    .take(first)
                    .collect()
            })
            .unwrap_or_default();

        Ok(json!({ "tokens": page }))
    }
}

/// [`MemoryStore`] whose `put` starts failing once its write allowance is spent.
pub struct FailingStore {
    inner: MemoryStore,
    remaining_puts: AtomicUsize,
}

impl FailingStore {
    pub fn new(allowed_puts: usize) -> Self {
        Self {
            inner: MemoryStore::new(),
            remaining_puts: AtomicUsize::new(allowed_puts),
        }
    }

    pub fn allow(&self, puts: usize) {
        self.remaining_puts.store(puts, Ordering::SeqCst);
    }

    pub async fn len(&self) -> usize {
        self.inner.len().await
    }
}

#[async_trait]
impl KvStore for FailingStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.inner.get(key).await
    }

    async fn put(
        &self,
        key: &str,
        value: String,
        metadata: Option<Value>,
    ) -> Result<(), StoreError> {
        let allowed = self
            .remaining_puts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if !allowed {
            return Err(StoreError::Backend(format!("write of {} rejected", key)));
        }
        self.inner.put(key, value, metadata).await
    }

    async fn list(&self, options: &ListOptions) -> Result<ListPage, StoreError> {
        self.inner.list(options).await
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.inner.delete(key).await
    }
}
