// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Bounded, optionally expiring local cache.
//!
//! One [`LocalCache`] lives inside each facade and holds the last value the
//! process read or wrote for a key. It is private to the facade; nothing is
//! shared across processes.
//!
//! # Eviction
//!
//! - **Capacity**: inserting a new key into a full cache evicts exactly one
//!   entry, the least recently accessed one. Recency is a monotonic tick per
//!   `get`/`put`, indexed in a `BTreeMap` so the victim is its first key.
//! - **Age**: with a TTL configured, an entry is absent once either its last
//!   write or its last access is `ttl` or more in the past. Expired entries
//!   are dropped lazily by the lookup that finds them.
//!
//! The internal mutex is never held across an `.await`; every method is
//! synchronous.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::trace;

use crate::config::CacheStrategy;
use crate::metrics;

struct Slot<T> {
    value: T,
    written_at: Instant,
    accessed_at: Instant,
    tick: u64,
}

struct Inner<T> {
    entries: HashMap<String, Slot<T>>,
    /// tick → key, oldest access first
    recency: BTreeMap<u64, String>,
    clock: u64,
}

impl<T> Inner<T> {
    fn next_tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    fn remove(&mut self, key: &str) -> Option<T> {
        let slot = self.entries.remove(key)?;
        self.recency.remove(&slot.tick);
        Some(slot.value)
    }

    fn evict_oldest(&mut self) -> Option<String> {
        let (_, key) = self.recency.pop_first()?;
        self.entries.remove(&key);
        Some(key)
    }
}

/// LRU + TTL cache keyed by entity id.
pub struct LocalCache<T> {
    name: String,
    capacity: Option<usize>,
    ttl: Option<Duration>,
    inner: Mutex<Inner<T>>,
}

impl<T: Clone> LocalCache<T> {
    /// `name` labels the cache in logs and metrics.
    pub fn new(name: impl Into<String>, strategy: &CacheStrategy) -> Self {
        Self {
            name: name.into(),
            capacity: strategy.capacity(),
            ttl: strategy.ttl(),
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                recency: BTreeMap::new(),
                clock: 0,
            }),
        }
    }

    fn is_expired(&self, slot: &Slot<T>, now: Instant) -> bool {
        match self.ttl {
            Some(ttl) => {
                now.duration_since(slot.written_at) >= ttl || now.duration_since(slot.accessed_at) >= ttl
            }
            None => false,
        }
    }

    pub fn get(&self, key: &str) -> Option<T> {
        let now = Instant::now();
        let mut inner = self.inner.lock();

        let expired = match inner.entries.get(key) {
            Some(slot) => self.is_expired(slot, now),
            None => {
                metrics::record_cache_lookup(&self.name, false);
                return None;
            }
        };

        if expired {
            inner.remove(key);
            trace!(cache = %self.name, key = %key, "Cache entry expired");
            metrics::record_cache_eviction(&self.name, "expired", 1);
            metrics::record_cache_lookup(&self.name, false);
            metrics::set_cache_entries(&self.name, inner.entries.len());
            return None;
        }

        let tick = inner.next_tick();
        let Inner { entries, recency, .. } = &mut *inner;
        let slot = entries.get_mut(key)?;
        recency.remove(&slot.tick);
        recency.insert(tick, key.to_string());
        slot.tick = tick;
        slot.accessed_at = now;

        metrics::record_cache_lookup(&self.name, true);
        Some(slot.value.clone())
    }

    /// Insert or replace. Last writer wins.
    pub fn put(&self, key: &str, value: T) {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        let tick = inner.next_tick();

        let previous = inner.entries.insert(
            key.to_string(),
            Slot {
                value,
                written_at: now,
                accessed_at: now,
                tick,
            },
        );
        if let Some(previous) = previous {
            inner.recency.remove(&previous.tick);
        }
        inner.recency.insert(tick, key.to_string());

        if let Some(capacity) = self.capacity {
            let mut evicted = 0;
            while inner.entries.len() > capacity {
                match inner.evict_oldest() {
                    Some(victim) => {
                        trace!(cache = %self.name, key = %victim, "Evicted least recently used entry");
                        evicted += 1;
                    }
                    None => break,
                }
            }
            if evicted > 0 {
                metrics::record_cache_eviction(&self.name, "capacity", evicted);
            }
        }

        metrics::set_cache_entries(&self.name, inner.entries.len());
    }

    pub fn remove(&self, key: &str) -> Option<T> {
        let mut inner = self.inner.lock();
        let removed = inner.remove(key);
        if removed.is_some() {
            metrics::set_cache_entries(&self.name, inner.entries.len());
        }
        removed
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.recency.clear();
        metrics::set_cache_entries(&self.name, 0);
    }

    /// Entries currently held, including ones that have expired but not
    /// yet been looked up.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    #[must_use]
    pub fn ttl(&self) -> Option<Duration> {
        self.ttl
    }
}
