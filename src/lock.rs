// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Distributed lock over the store's conditional set.
//!
//! # Protocol
//!
//! ```text
//! acquire(key):
//!   lock_key = "_clock_" + key
//!   for i in 0 .. max_attempts + 2:
//!       SET lock_key \x00 EX ttl_secs NX   → written? acquired
//!       sleep min(2s, backoff_step * i)    (not after the last attempt)
//!   timeout
//!
//! release(key):
//!   DEL lock_key
//! ```
//!
//! Lock keys live under their own prefix so they never collide with entity
//! keys. The TTL bounds how long a crashed holder can block others.
//!
//! # Known gap
//!
//! [`DistributedLock::lock`] hands out a [`LockGuard`]. A guard dropped
//! without [`LockGuard::release`] (for example when the caller's future is
//! cancelled by a timeout) deletes the lock key on a background task.
//!
//! Release does not check ownership. If the TTL lapses while the holder is
//! still inside its critical section, a second party can acquire the lock
//! and the first party's release deletes the second party's lock.

use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::time::{sleep, Instant};
use tracing::{debug, error, instrument, warn};

use crate::config::LockStrategy;
use crate::metrics;
use crate::storage::traits::{KvStore, StorageError};

/// Namespace for lock keys.
pub const LOCK_PREFIX: &str = "_clock_";

/// Upper bound on a single backoff sleep.
pub const MAX_BACKOFF: Duration = Duration::from_secs(2);

const LOCK_SENTINEL: &[u8] = &[0];

pub struct DistributedLock {
    store: Arc<dyn KvStore>,
    strategy: LockStrategy,
}

impl DistributedLock {
    pub fn new(store: Arc<dyn KvStore>, strategy: LockStrategy) -> Self {
        Self { store, strategy }
    }

    /// Store key guarding `key`.
    #[must_use]
    pub fn lock_key(key: &str) -> String {
        format!("{LOCK_PREFIX}{key}")
    }

    /// Conditional-set attempts made before giving up.
    #[must_use]
    pub fn total_attempts(&self) -> u32 {
        self.strategy.max_attempts.saturating_add(2)
    }

    /// Sleep after failed attempt `attempt` (0-based).
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.strategy.backoff_step().saturating_mul(attempt).min(MAX_BACKOFF)
    }

    #[must_use]
    pub fn strategy(&self) -> &LockStrategy {
        &self.strategy
    }

    /// Try to take the lock on `key`. `Ok(false)` means every attempt found
    /// it held; store errors abort the loop and propagate.
    #[instrument(skip(self))]
    pub async fn acquire(&self, key: &str) -> Result<bool, StorageError> {
        let lock_key = Self::lock_key(key);
        let ttl_secs = self.strategy.lock_ttl_secs();
        let attempts = self.total_attempts();
        let start = Instant::now();

        for attempt in 0..attempts {
            if self
                .store
                .set_with_expiry(&lock_key, LOCK_SENTINEL, ttl_secs, true)
                .await?
            {
                debug!(attempts = attempt + 1, waited_ms = metrics::millis(start.elapsed()), "Lock acquired");
                metrics::record_lock_acquire("acquired", attempt + 1);
                return Ok(true);
            }

            if attempt + 1 < attempts {
                let wait = self.backoff(attempt);
                debug!(attempt, wait_ms = metrics::millis(wait), "Lock held elsewhere, backing off");
                if !wait.is_zero() {
                    sleep(wait).await;
                }
            }
        }

        warn!(
            attempts,
            waited_ms = metrics::millis(start.elapsed()),
            "Lock acquisition timed out"
        );
        metrics::record_lock_acquire("timeout", attempts);
        Ok(false)
    }

    /// Like [`acquire`](Self::acquire), but returns a guard that frees the
    /// lock if it is dropped before being released.
    pub async fn lock(&self, key: &str) -> Result<Option<LockGuard>, StorageError> {
        if !self.acquire(key).await? {
            return Ok(None);
        }
        Ok(Some(LockGuard {
            store: Arc::clone(&self.store),
            key: key.to_string(),
            held_since: Instant::now(),
            armed: true,
        }))
    }

    /// Delete the lock on `key`, whoever holds it.
    pub async fn release(&self, key: &str) -> Result<(), StorageError> {
        self.store.delete(&[Self::lock_key(key)]).await?;
        debug!(key = %key, "Lock released");
        Ok(())
    }
}

/// A held lock. Release it explicitly; dropping it releases in the background.
#[must_use = "dropping the guard releases the lock"]
pub struct LockGuard {
    store: Arc<dyn KvStore>,
    key: String,
    held_since: Instant,
    armed: bool,
}

impl LockGuard {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn held_for(&self) -> Duration {
        self.held_since.elapsed()
    }

    /// Delete the lock key and disarm the guard.
    pub async fn release(mut self) -> Result<(), StorageError> {
        let result = self.store.delete(&[DistributedLock::lock_key(&self.key)]).await;
        self.armed = false;
        result?;
        debug!(key = %self.key, "Lock released");
        Ok(())
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let lock_key = DistributedLock::lock_key(&self.key);
        match Handle::try_current() {
            Ok(handle) => {
                warn!(key = %self.key, "Lock guard dropped while held, releasing in background");
                let store = Arc::clone(&self.store);
                handle.spawn(async move {
                    if let Err(e) = store.delete(std::slice::from_ref(&lock_key)).await {
                        error!(lock_key = %lock_key, error = %e, "Background lock release failed");
                    }
                });
            }
            Err(_) => {
                error!(key = %self.key, "Lock guard dropped outside a runtime, lock held until TTL");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::InMemoryKvStore;

    fn lock_with(store: &Arc<InMemoryKvStore>, max_attempts: u32, backoff_step_ms: u64) -> DistributedLock {
        DistributedLock::new(
            store.clone(),
            LockStrategy {
                max_attempts,
                backoff_step_ms,
                lock_ttl_ms: 10_000,
            },
        )
    }

    #[test]
    fn test_backoff_is_linear_and_capped() {
        let store = Arc::new(InMemoryKvStore::new());
        let lock = lock_with(&store, 25, 250);
        assert_eq!(lock.backoff(0), Duration::ZERO);
        assert_eq!(lock.backoff(1), Duration::from_millis(250));
        assert_eq!(lock.backoff(4), Duration::from_millis(1000));
        assert_eq!(lock.backoff(8), MAX_BACKOFF);
        assert_eq!(lock.backoff(24), MAX_BACKOFF);
        assert_eq!(lock.total_attempts(), 27);
    }

    #[test]
    fn test_lock_key_is_namespaced() {
        assert_eq!(DistributedLock::lock_key("order:1"), "_clock_order:1");
    }

    #[tokio::test]
    async fn test_acquire_and_release() {
        let store = Arc::new(InMemoryKvStore::new());
        let lock = lock_with(&store, 0, 10);

        assert!(lock.acquire("k").await.unwrap());
        assert_eq!(store.peek("_clock_k"), Some(vec![0]));
        assert!(store.peek("k").is_none());

        lock.release("k").await.unwrap();
        assert!(store.peek("_clock_k").is_none());
        assert!(lock.acquire("k").await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_held_lock_times_out_after_backoff_schedule() {
        let store = Arc::new(InMemoryKvStore::new());
        store.poke("_clock_k", &[0]);
        let lock = lock_with(&store, 3, 10);

        let start = Instant::now();
        assert!(!lock.acquire("k").await.unwrap());
        // five attempts, sleeping 0 + 10 + 20 + 30 between them
        assert_eq!(start.elapsed(), Duration::from_millis(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquires_once_holder_releases() {
        let store = Arc::new(InMemoryKvStore::new());
        store.poke("_clock_k", &[0]);
        let lock = lock_with(&store, 5, 10);

        let releaser = {
            let store = store.clone();
            tokio::spawn(async move {
                sleep(Duration::from_millis(25)).await;
                store.delete(&["_clock_k".to_string()]).await.unwrap();
            })
        };

        assert!(lock.acquire("k").await.unwrap());
        releaser.await.unwrap();
    }

    #[tokio::test]
    async fn test_release_is_unconditional() {
        let store = Arc::new(InMemoryKvStore::new());
        let lock = lock_with(&store, 0, 10);
        store.poke("_clock_k", &[0]);

        // someone else's lock is removed too
        lock.release("k").await.unwrap();
        assert!(store.peek("_clock_k").is_none());
    }

    #[tokio::test]
    async fn test_store_errors_propagate() {
        let store = Arc::new(InMemoryKvStore::new());
        store.set_offline(true);
        let lock = lock_with(&store, 5, 10);

        let err = lock.acquire("k").await.unwrap_err();
        assert!(matches!(err, StorageError::Connection(_)));
    }

    #[tokio::test]
    async fn test_guard_release_disarms() {
        let store = Arc::new(InMemoryKvStore::new());
        let lock = lock_with(&store, 0, 10);

        let guard = lock.lock("k").await.unwrap().unwrap();
        assert_eq!(guard.key(), "k");
        guard.release().await.unwrap();

        // a later holder is not touched by the released guard
        store.poke("_clock_k", &[0]);
        tokio::task::yield_now().await;
        assert_eq!(store.peek("_clock_k"), Some(vec![0]));
    }

    #[tokio::test]
    async fn test_dropped_guard_releases_in_background() {
        let store = Arc::new(InMemoryKvStore::new());
        let lock = lock_with(&store, 0, 10);

        let guard = lock.lock("k").await.unwrap().unwrap();
        drop(guard);
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert!(store.peek("_clock_k").is_none());
    }

    #[tokio::test]
    async fn test_lock_returns_none_when_held() {
        let store = Arc::new(InMemoryKvStore::new());
        store.poke("_clock_k", &[0]);
        let lock = lock_with(&store, 0, 10);

        assert!(lock.lock("k").await.unwrap().is_none());
    }
}
