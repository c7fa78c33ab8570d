use std::marker::PhantomData;
use std::sync::Arc;

use serde::{de::DeserializeOwned, Serialize};

use crate::error::StoreError;

use super::KvStore;

/// A single named slot in a [`KvStore`] holding a JSON encoded `T`.
///
/// `update` is read-then-write. Two concurrent updates of the same cell can
/// interleave and the later write clobbers the earlier one; callers rely on
/// idempotent domain logic rather than on this primitive for consistency.
pub struct Cell<T> {
    store: Arc<dyn KvStore>,
    name: String,
    _value: PhantomData<fn() -> T>,
}

impl<T> Clone for Cell<T> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            name: self.name.clone(),
            _value: PhantomData,
        }
    }
}

impl<T> Cell<T>
where
    T: Serialize + DeserializeOwned,
{
    pub fn new(store: Arc<dyn KvStore>, name: impl Into<String>) -> Self {
        Self {
            store,
            name: name.into(),
            _value: PhantomData,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Reads the stored value, or `None` when the slot is empty.
    pub async fn get(&self) -> Result<Option<T>, StoreError> {
        match self.store.get(&self.name).await? {
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|e| StoreError::Decode {
                    key: self.name.clone(),
                    reason: e.to_string(),
                }),
            None => Ok(None),
        }
    }

    /// Reads the stored value, falling back to `fallback` when absent.
    pub async fn read(&self, fallback: T) -> Result<T, StoreError> {
        Ok(self.get().await?.unwrap_or(fallback))
    }

    pub async fn write(&self, value: &T) -> Result<(), StoreError> {
        let raw = serde_json::to_string(value).map_err(|e| StoreError::Encode {
            key: self.name.clone(),
            reason: e.to_string(),
        })?;
        self.store.put(&self.name, raw, None).await
    }

    /// Applies `f` to the current value and writes the result back.
    /// Does nothing when the slot is empty.
    pub async fn update<F>(&self, f: F) -> Result<(), StoreError>
    where
        F: FnOnce(T) -> T + Send,
    {
        if let Some(value) = self.get().await? {
            self.write(&f(value)).await?;
        }
        Ok(())
    }

    pub async fn delete(&self) -> Result<(), StoreError> {
        self.store.delete(&self.name).await
    }
}
