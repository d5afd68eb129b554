//! Shared fixtures for integration tests.
//!
//! - [`FaultyStore`]: wraps the in-memory store, counts calls per command
//!   and injects errors into chosen commands.
//! - [`RecordingQueue`]: a write-behind queue that only records what it was
//!   asked to schedule; tests flush it by hand.
//! - [`Player`]: the entity used throughout.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use entity_store::{
    ActionTarget, CacheStrategy, DaoError, Entity, EntityStore, EntityStoreConfig, InMemoryKvStore,
    JsonCodec, KeyType, KvStore, LockStrategy, ScheduledAction, StorageError, StoreStrategy,
    WriteBehindQueue,
};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "entity_store=debug".into()),
        )
        .with_test_writer()
        .try_init();
}

// =============================================================================
// Entity
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Player {
    pub name: String,
    pub score: u64,
}

impl Player {
    pub fn new(name: &str, score: u64) -> Self {
        Self { name: name.to_string(), score }
    }
}

impl Entity for Player {
    fn to_id(&self) -> String {
        self.name.clone()
    }
}

// =============================================================================
// FaultyStore - counted calls and error injection
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Get,
    Set,
    Delete,
    Keys,
    ConditionalSet,
    Rename,
    Publish,
}

pub fn connection_refused() -> StorageError {
    StorageError::Connection("Connection refused (os error 111)".to_string())
}

pub struct FaultyStore {
    pub inner: Arc<InMemoryKvStore>,
    faults: Mutex<HashMap<Op, StorageError>>,
    calls: Mutex<HashMap<Op, u64>>,
    conditional_sets: AtomicU64,
    vanishing: Mutex<HashSet<String>>,
}

impl FaultyStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: Arc::new(InMemoryKvStore::new()),
            faults: Mutex::new(HashMap::new()),
            calls: Mutex::new(HashMap::new()),
            conditional_sets: AtomicU64::new(0),
            vanishing: Mutex::new(HashSet::new()),
        })
    }

    /// Make every call to `op` fail with `err` until healed.
    pub fn fail(&self, op: Op, err: StorageError) {
        self.faults.lock().insert(op, err);
    }

    /// Delete `key` just before the next read of it reaches the store, as if
    /// another client removed it after it was enumerated.
    pub fn vanish_on_read(&self, key: &str) {
        self.vanishing.lock().insert(key.to_string());
    }

    pub fn heal(&self) {
        self.faults.lock().clear();
    }

    pub fn calls(&self, op: Op) -> u64 {
        self.calls.lock().get(&op).copied().unwrap_or(0)
    }

    pub fn conditional_sets(&self) -> u64 {
        self.conditional_sets.load(Ordering::SeqCst)
    }

    fn enter(&self, op: Op) -> Result<(), StorageError> {
        *self.calls.lock().entry(op).or_insert(0) += 1;
        match self.faults.lock().get(&op) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl KvStore for FaultyStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        self.enter(Op::Get)?;
        if self.vanishing.lock().remove(key) {
            self.inner.delete(&[key.to_string()]).await?;
        }
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        self.enter(Op::Set)?;
        self.inner.set(key, value).await
    }

    async fn delete(&self, keys: &[String]) -> Result<u64, StorageError> {
        self.enter(Op::Delete)?;
        self.inner.delete(keys).await
    }

    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        self.inner.exists(key).await
    }

    async fn keys_matching(&self, pattern: &str) -> Result<Vec<String>, StorageError> {
        self.enter(Op::Keys)?;
        self.inner.keys_matching(pattern).await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StorageError> {
        self.inner.expire(key, ttl).await
    }

    async fn move_key(&self, key: &str, db: u32) -> Result<bool, StorageError> {
        self.inner.move_key(key, db).await
    }

    async fn rename(&self, old_key: &str, new_key: &str) -> Result<(), StorageError> {
        self.enter(Op::Rename)?;
        self.inner.rename(old_key, new_key).await
    }

    async fn key_type(&self, key: &str) -> Result<KeyType, StorageError> {
        self.inner.key_type(key).await
    }

    async fn db_size(&self) -> Result<u64, StorageError> {
        self.inner.db_size().await
    }

    async fn set_with_expiry(
        &self,
        key: &str,
        value: &[u8],
        ttl_secs: u64,
        only_if_absent: bool,
    ) -> Result<bool, StorageError> {
        self.conditional_sets.fetch_add(1, Ordering::SeqCst);
        self.enter(Op::ConditionalSet)?;
        self.inner.set_with_expiry(key, value, ttl_secs, only_if_absent).await
    }

    async fn publish(&self, channel: &str, message: &[u8]) -> Result<u64, StorageError> {
        self.enter(Op::Publish)?;
        self.inner.publish(channel, message).await
    }
}

// =============================================================================
// RecordingQueue - write-behind queue under test control
// =============================================================================

pub struct RecordingQueue<T: Send + Sync + 'static> {
    scheduled: Mutex<Vec<(ScheduledAction<T>, Duration)>>,
    owners: Mutex<HashMap<String, Weak<dyn ActionTarget<T>>>>,
}

impl<T: Clone + Send + Sync + 'static> RecordingQueue<T> {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            scheduled: Mutex::new(Vec::new()),
            owners: Mutex::new(HashMap::new()),
        })
    }

    pub fn scheduled(&self) -> Vec<(ScheduledAction<T>, Duration)> {
        self.scheduled.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.scheduled.lock().len()
    }

    pub fn owners(&self) -> Vec<String> {
        self.owners.lock().keys().cloned().collect()
    }

    /// Apply everything scheduled so far, in order, ignoring delays.
    /// Actions scheduled while flushing are kept for the next flush.
    pub async fn flush(&self) -> Vec<Result<(), DaoError>> {
        let pending = std::mem::take(&mut *self.scheduled.lock());
        let mut results = Vec::with_capacity(pending.len());
        for (action, _) in pending {
            let target = self.owners.lock().get(&action.owner).and_then(|t| t.upgrade());
            match target {
                Some(target) => results.push(target.apply(action).await),
                None => panic!("no owner registered for {}", action.owner),
            }
        }
        results
    }
}

impl<T: Send + Sync + 'static> WriteBehindQueue<T> for RecordingQueue<T> {
    fn schedule(&self, action: ScheduledAction<T>, delay: Duration) {
        self.scheduled.lock().push((action, delay));
    }

    fn register_owner(&self, owner: &str, target: Weak<dyn ActionTarget<T>>) {
        self.owners.lock().insert(owner.to_string(), target);
    }
}

// =============================================================================
// Facade builders
// =============================================================================

pub fn config(cache: Option<CacheStrategy>, retry_delay_ms: u64) -> EntityStoreConfig {
    EntityStoreConfig {
        store: StoreStrategy {
            data_source: "primary".to_string(),
            write_delay_ms: 1_000,
            retry_delay_ms,
        },
        cache,
        lock: LockStrategy {
            max_attempts: 25,
            backoff_step_ms: 10,
            lock_ttl_ms: 10_000,
        },
    }
}

pub fn players(
    store: Arc<dyn KvStore>,
    config: EntityStoreConfig,
) -> (Arc<EntityStore<Player>>, Arc<RecordingQueue<Player>>) {
    let queue = RecordingQueue::new();
    let facade = EntityStore::with_store(config, store, Arc::new(JsonCodec), queue.clone())
        .expect("valid config");
    (facade, queue)
}
