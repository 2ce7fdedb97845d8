//! # On-Disk Store
//!
//! [`KeyValueStore`] over sled's embedded key-value store. Everything lives
//! in one tree, `credentials`, with UTF-8 keys and values, so sled's
//! lexicographic key order makes namespace scans a `scan_prefix`.
//!
//! Writes are flushed before returning. Losing a freshly pinned salt to a
//! crash would mean a different address on the next sign-in.

use sled::{Db, Tree};
use std::path::Path;

use super::kv::{KeyValueStore, StoreError, StoreResult};

const CREDENTIALS_TREE: &str = "credentials";

/// Persistent credential storage backed by sled.
///
/// sled handles concurrent access internally, so a `SledStore` can be
/// shared via `Arc` without extra locking.
#[derive(Debug, Clone)]
pub struct SledStore {
    db: Db,
    tree: Tree,
}

impl SledStore {
    /// Open or create a store at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    /// A store that is deleted when dropped. For tests.
    pub fn open_temporary() -> StoreResult<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> StoreResult<Self> {
        let tree = db.open_tree(CREDENTIALS_TREE)?;
        Ok(Self { db, tree })
    }

    /// Size of the database on disk, in bytes.
    pub fn size_on_disk(&self) -> StoreResult<u64> {
        Ok(self.db.size_on_disk()?)
    }

    fn decode(key: &str, bytes: &[u8]) -> StoreResult<String> {
        String::from_utf8(bytes.to_vec()).map_err(|_| StoreError::Encoding {
            key: key.to_string(),
        })
    }
}

impl KeyValueStore for SledStore {
    fn get(&self, key: &str) -> StoreResult<Option<String>> {
        self.tree
            .get(key.as_bytes())?
            .map(|bytes| Self::decode(key, &bytes))
            .transpose()
    }

    fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        self.tree.insert(key.as_bytes(), value.as_bytes())?;
        self.tree.flush()?;
        Ok(())
    }

    fn delete(&self, key: &str) -> StoreResult<()> {
        self.tree.remove(key.as_bytes())?;
        self.tree.flush()?;
        Ok(())
    }

    fn keys(&self) -> StoreResult<Vec<String>> {
        self.tree
            .iter()
            .keys()
            .map(|key| {
                let key = key?;
                String::from_utf8(key.to_vec()).map_err(|_| StoreError::Encoding {
                    key: hex::encode(&key),
                })
            })
            .collect()
    }

    fn keys_with_prefix(&self, prefix: &str) -> StoreResult<Vec<String>> {
        self.tree
            .scan_prefix(prefix.as_bytes())
            .keys()
            .map(|key| {
                let key = key?;
                String::from_utf8(key.to_vec()).map_err(|_| StoreError::Encoding {
                    key: hex::encode(&key),
                })
            })
            .collect()
    }
}
