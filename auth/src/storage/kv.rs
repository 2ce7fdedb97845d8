//! # Key-Value Storage
//!
//! Everything this crate persists is a short UTF-8 string under a
//! namespaced UTF-8 key, the same shape as browser local storage. The
//! [`KeyValueStore`] trait is that shape and nothing more, so derivation and
//! persistence logic can run against [`MemoryStore`] in tests and
//! [`super::SledStore`] on disk.

use parking_lot::RwLock;
use std::collections::BTreeMap;

use crate::error::AuthError;

/// Errors raised by a storage backend.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("value under {key} is not UTF-8")]
    Encoding { key: String },

    #[error("backend error: {0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        AuthError::Storage(err.to_string())
    }
}

/// A string-to-string map with deletion and key listing.
///
/// Implementations must be safe to share across tasks; all methods take
/// `&self`.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> StoreResult<Option<String>>;

    fn set(&self, key: &str, value: &str) -> StoreResult<()>;

    /// Removing a missing key is not an error.
    fn delete(&self, key: &str) -> StoreResult<()>;

    /// Every key currently stored, in no particular order.
    fn keys(&self) -> StoreResult<Vec<String>>;

    /// Keys starting with `prefix`. Backends with ordered keys override this.
    fn keys_with_prefix(&self, prefix: &str) -> StoreResult<Vec<String>> {
        Ok(self
            .keys()?
            .into_iter()
            .filter(|key| key.starts_with(prefix))
            .collect())
    }

    /// Delete every key starting with `prefix`; returns how many went.
    fn delete_prefix(&self, prefix: &str) -> StoreResult<usize> {
        let keys = self.keys_with_prefix(prefix)?;
        for key in &keys {
            self.delete(key)?;
        }
        Ok(keys.len())
    }
}

/// In-process store. Contents vanish with the value.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Copy of every entry, for assertions and debugging.
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.entries.read().clone()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> StoreResult<Option<String>> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        self.entries.write().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&self, key: &str) -> StoreResult<()> {
        self.entries.write().remove(key);
        Ok(())
    }

    fn keys(&self) -> StoreResult<Vec<String>> {
        Ok(self.entries.read().keys().cloned().collect())
    }

    fn keys_with_prefix(&self, prefix: &str) -> StoreResult<Vec<String>> {
        Ok(self
            .entries
            .read()
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key.clone())
            .collect())
    }
}
