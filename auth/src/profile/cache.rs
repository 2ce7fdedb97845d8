//! Read-through profile cache in the key-value store.
//!
//! Entries live at `mysocial_profile_{address}` as the indexer's JSON. Only
//! found profiles are cached. An entry that no longer parses is dropped
//! and the indexer is asked again.

use std::sync::Arc;
use tracing::{debug, warn};

use super::index::{MySocialProfile, ProfileIndex};
use crate::config::PROFILE_CACHE_PREFIX;
use crate::error::AuthError;
use crate::identity::MysAddress;
use crate::storage::KeyValueStore;

/// Profile lookups with a local cache.
///
/// [`lookup`](Self::lookup) is the one-shot read-through. The session uses
/// the split [`cached`](Self::cached) / [`fetch`](Self::fetch) /
/// [`remember`](Self::remember) steps instead, so a result that arrives
/// after sign-out can be dropped before it touches the cache.
#[derive(Clone)]
pub struct ProfileFetcher {
    index: Arc<dyn ProfileIndex>,
    kv: Arc<dyn KeyValueStore>,
}

impl ProfileFetcher {
    pub fn new(index: Arc<dyn ProfileIndex>, kv: Arc<dyn KeyValueStore>) -> Self {
        Self { index, kv }
    }

    pub fn cache_key(address: &MysAddress) -> String {
        format!("{PROFILE_CACHE_PREFIX}{address}")
    }

    /// The cached profile, if present and parsable.
    pub fn cached(&self, address: &MysAddress) -> Result<Option<MySocialProfile>, AuthError> {
        let key = Self::cache_key(address);
        let Some(json) = self.kv.get(&key)? else {
            return Ok(None);
        };
        match serde_json::from_str(&json) {
            Ok(profile) => Ok(Some(profile)),
            Err(e) => {
                warn!(address = %address, error = %e, "Cached profile unreadable, dropping");
                self.kv.delete(&key)?;
                Ok(None)
            }
        }
    }

    /// Ask the indexer, bypassing the cache. Does not write the cache.
    pub async fn fetch(
        &self,
        address: &MysAddress,
    ) -> Result<Option<MySocialProfile>, AuthError> {
        self.index.fetch_profile(address).await
    }

    /// Cache `profile` for `address`.
    pub fn remember(
        &self,
        address: &MysAddress,
        profile: &MySocialProfile,
    ) -> Result<(), AuthError> {
        let json = serde_json::to_string(profile)
            .map_err(|e| AuthError::Profile(format!("cannot encode profile: {e}")))?;
        self.kv.set(&Self::cache_key(address), &json)?;
        Ok(())
    }

    /// Drop the cache entry for `address`. Returns whether one existed.
    pub fn forget(&self, address: &MysAddress) -> Result<bool, AuthError> {
        let key = Self::cache_key(address);
        let existed = self.kv.get(&key)?.is_some();
        self.kv.delete(&key)?;
        Ok(existed)
    }

    /// Cache first, then the indexer. A found profile is cached.
    pub async fn lookup(
        &self,
        address: &MysAddress,
    ) -> Result<Option<MySocialProfile>, AuthError> {
        if let Some(profile) = self.cached(address)? {
            debug!(address = %address, "Profile served from cache");
            return Ok(Some(profile));
        }
        let profile = self.fetch(address).await?;
        if let Some(profile) = &profile {
            self.remember(address, profile)?;
        }
        Ok(profile)
    }

    pub async fn profile_exists(&self, address: &MysAddress) -> Result<bool, AuthError> {
        self.index.profile_exists(address).await
    }
}
