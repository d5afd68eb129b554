//! Read operations and cache control.

use std::collections::BTreeSet;

use tracing::{debug, instrument};

use super::EntityStore;
use crate::entity::Entity;
use crate::error::DaoError;
use crate::metrics::{self, LatencyTimer};
use crate::resilience::failure::suppress_connectivity;

impl<T: Entity> EntityStore<T> {
    /// Read `key` from the store, bypassing the local cache.
    ///
    /// Returns `Ok(None)` when the key is missing or the store is
    /// unreachable.
    #[instrument(skip(self), fields(entity = self.name))]
    pub async fn find(&self, key: &str) -> Result<Option<T>, DaoError> {
        let _timer = LatencyTimer::new(self.name, "find");
        match suppress_connectivity(self.store.get(key).await)? {
            Some(Some(bytes)) => Ok(Some(self.codec.decode(&bytes)?)),
            Some(None) => Ok(None),
            None => {
                metrics::record_operation(self.name, "find", "degraded");
                Ok(None)
            }
        }
    }

    /// Read `key` through the local cache.
    ///
    /// Without a cache this is [`find`](Self::find). Misses that resolve to
    /// absent are not remembered.
    #[instrument(skip(self), fields(entity = self.name))]
    pub async fn find_cached(&self, key: &str) -> Result<Option<T>, DaoError> {
        let Some(cache) = &self.cache else {
            return self.find(key).await;
        };
        if let Some(hit) = cache.get(key) {
            return Ok(Some(hit));
        }

        let found = self.find(key).await?;
        if let Some(entity) = &found {
            cache.put(key, entity.clone());
        }
        Ok(found)
    }

    /// Keys matching a glob `pattern`, empty when the store is unreachable.
    ///
    /// Runs `KEYS` on the server, which walks the whole key space.
    #[instrument(skip(self), fields(entity = self.name))]
    pub async fn keys(&self, pattern: &str) -> Result<BTreeSet<String>, DaoError> {
        let _timer = LatencyTimer::new(self.name, "keys");
        match suppress_connectivity(self.store.keys_matching(pattern).await)? {
            Some(keys) => Ok(keys.into_iter().collect()),
            None => {
                metrics::record_operation(self.name, "keys", "degraded");
                Ok(BTreeSet::new())
            }
        }
    }

    /// Entities whose keys match `pattern`, fetched one by one in key order.
    ///
    /// One slot per matched key: a key deleted since enumeration, or one
    /// whose read hits an unreachable store, yields `None` in its slot.
    #[instrument(skip(self), fields(entity = self.name))]
    pub async fn query(&self, pattern: &str) -> Result<Vec<Option<T>>, DaoError> {
        let keys = self.keys(pattern).await?;
        let mut found = Vec::with_capacity(keys.len());
        for key in &keys {
            found.push(self.find(key).await?);
        }
        debug!(
            matched = keys.len(),
            resolved = found.iter().filter(|e| e.is_some()).count(),
            "Query complete"
        );
        Ok(found)
    }

    /// Call `callback` once per key matching `pattern`, in key order.
    ///
    /// Keys that do not resolve (deleted since enumeration, or unreachable
    /// store) are passed as `None`.
    #[instrument(skip(self, callback), fields(entity = self.name))]
    pub async fn for_each<F>(&self, pattern: &str, mut callback: F) -> Result<(), DaoError>
    where
        F: FnMut(Option<T>),
    {
        for key in self.keys(pattern).await? {
            callback(self.find(&key).await?);
        }
        Ok(())
    }

    /// Drop `keys` from the local cache only.
    pub fn clear_cache(&self, keys: &[&str]) {
        if let Some(cache) = &self.cache {
            for key in keys {
                cache.remove(key);
            }
        }
    }

    /// Empty the local cache. The store is untouched.
    pub fn clear_all_cache(&self) {
        if let Some(cache) = &self.cache {
            cache.clear();
        }
    }
}
