// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Per-entity-type data access facade.
//!
//! An [`EntityStore<T>`] owns everything one entity type needs to talk to
//! its store: the resolved store handle, the codec, an optional
//! [`LocalCache`], the [`DistributedLock`] and a handle to the write-behind
//! queue.
//!
//! # Read path
//!
//! ```text
//! find_cached(k) ──► LocalCache ──hit──► value
//!                       │ miss
//!                       ▼
//!                 find(k) ──► store GET ──► decode ──► populate cache (if Some)
//! ```
//!
//! # Write paths
//!
//! | Operation | Local cache | Store | On connectivity failure |
//! |-----------|-------------|-------|-------------------------|
//! | `save_sync` | after the write succeeds | `SET` now | retry action after `retry_delay`, or error |
//! | `save` | immediately | `SET` after `write_delay` | handled by the queue |
//! | `remove_sync` | evicted first | `DEL` now | retry action after `retry_delay`, or error |
//! | `remove` | evicted immediately | `DEL` after `write_delay` | handled by the queue |
//!
//! # Durability
//!
//! `save` and `remove` return before the store is touched. The local cache
//! reflects them at once, but the store only does once the queue applies the
//! action; if the process exits first, the write is lost.
//!
//! # Failure handling
//!
//! Connectivity failures degrade: reads return absent/empty, synchronous
//! writes fall back to the queue when `retry_delay_ms > 0`. Every other
//! error (serialization, malformed pattern, server rejection) propagates.

mod keyspace;
mod locking;
mod read;
mod write;

use std::sync::{Arc, Weak};

use tracing::info;
use uuid::Uuid;

use crate::cache::LocalCache;
use crate::codec::EntityCodec;
use crate::config::EntityStoreConfig;
use crate::entity::Entity;
use crate::error::DaoError;
use crate::lock::DistributedLock;
use crate::storage::resolver::DataSourceResolver;
use crate::storage::traits::KvStore;
use crate::write_behind::{ActionTarget, WriteBehindQueue};

pub struct EntityStore<T: Entity> {
    name: &'static str,
    owner: String,
    config: EntityStoreConfig,
    store: Arc<dyn KvStore>,
    codec: Arc<dyn EntityCodec<T>>,
    cache: Option<LocalCache<T>>,
    lock: DistributedLock,
    queue: Arc<dyn WriteBehindQueue<T>>,
}

impl<T: Entity> EntityStore<T> {
    /// Build a facade whose store is looked up by `config.store.data_source`.
    pub fn new(
        config: EntityStoreConfig,
        resolver: &dyn DataSourceResolver,
        codec: Arc<dyn EntityCodec<T>>,
        queue: Arc<dyn WriteBehindQueue<T>>,
    ) -> Result<Arc<Self>, DaoError> {
        config.validate()?;
        let store = resolver.resolve(&config.store.data_source)?;
        Self::with_store(config, store, codec, queue)
    }

    /// Build a facade over an already-resolved store.
    ///
    /// The facade registers itself with `queue` under a fresh owner id so
    /// deferred actions find their way back to it.
    pub fn with_store(
        config: EntityStoreConfig,
        store: Arc<dyn KvStore>,
        codec: Arc<dyn EntityCodec<T>>,
        queue: Arc<dyn WriteBehindQueue<T>>,
    ) -> Result<Arc<Self>, DaoError> {
        config.validate()?;

        let name = T::entity_name();
        let owner = format!("{}_{}", name, Uuid::new_v4());
        let cache = config.cache.as_ref().map(|strategy| LocalCache::new(name, strategy));
        let lock = DistributedLock::new(Arc::clone(&store), config.lock);

        info!(
            entity = name,
            owner = %owner,
            data_source = %config.store.data_source,
            cached = cache.is_some(),
            "Entity store initialized"
        );

        Ok(Arc::new_cyclic(|weak: &Weak<Self>| {
            let target: Weak<dyn ActionTarget<T>> = weak.clone();
            queue.register_owner(&owner, target);
            Self {
                name,
                owner,
                config,
                store,
                codec,
                cache,
                lock,
                queue,
            }
        }))
    }

    /// Id this facade is registered under with the write-behind queue.
    #[must_use]
    pub fn owner(&self) -> &str {
        &self.owner
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    #[must_use]
    pub fn config(&self) -> &EntityStoreConfig {
        &self.config
    }

    /// The local cache, if caching is configured.
    #[must_use]
    pub fn cache(&self) -> Option<&LocalCache<T>> {
        self.cache.as_ref()
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn KvStore> {
        &self.store
    }
}

impl<T: Entity> std::fmt::Debug for EntityStore<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityStore")
            .field("name", &self.name)
            .field("owner", &self.owner)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
