use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::broadcast;

use super::pattern::KeyPattern;
use super::traits::{KeyType, KvStore, StorageError};

/// Number of logical databases, as in a default Redis server.
pub const DATABASES: u32 = 16;

#[derive(Debug, Clone)]
struct Slot {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

impl Slot {
    fn persistent(value: Vec<u8>) -> Self {
        Self { value, expires_at: None }
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

/// In-process [`KvStore`] with Redis semantics for the commands the facade uses.
///
/// Operates on database 0; `move_key` transfers into one of the other
/// [`DATABASES`]. Expiry is applied lazily on access. [`set_offline`](Self::set_offline)
/// makes every command fail with [`StorageError::Connection`], which is how
/// tests simulate an unreachable server.
pub struct InMemoryKvStore {
    databases: Vec<DashMap<String, Slot>>,
    offline: AtomicBool,
    channel: broadcast::Sender<(String, Vec<u8>)>,
}

impl InMemoryKvStore {
    #[must_use]
    pub fn new() -> Self {
        let (channel, _) = broadcast::channel(1024);
        Self {
            databases: (0..DATABASES).map(|_| DashMap::new()).collect(),
            offline: AtomicBool::new(false),
            channel,
        }
    }

    /// Simulate losing (or regaining) the connection to the server.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_offline(&self) -> bool {
        self.offline.load(Ordering::SeqCst)
    }

    /// Subscribe to every message published through this store.
    pub fn subscribe(&self) -> broadcast::Receiver<(String, Vec<u8>)> {
        self.channel.subscribe()
    }

    /// Live (non-expired) key count of a logical database.
    #[must_use]
    pub fn len_of(&self, db: u32) -> usize {
        let now = Instant::now();
        self.databases
            .get(db as usize)
            .map(|space| space.iter().filter(|slot| !slot.is_expired(now)).count())
            .unwrap_or(0)
    }

    /// Raw read that bypasses the offline switch. Test inspection only.
    #[must_use]
    pub fn peek(&self, key: &str) -> Option<Vec<u8>> {
        let now = Instant::now();
        self.primary()
            .get(key)
            .filter(|slot| !slot.is_expired(now))
            .map(|slot| slot.value.clone())
    }

    /// Raw write that bypasses the offline switch. Test setup only.
    pub fn poke(&self, key: &str, value: &[u8]) {
        self.primary()
            .insert(key.to_string(), Slot::persistent(value.to_vec()));
    }

    /// Clear all databases
    pub fn clear(&self) {
        for space in &self.databases {
            space.clear();
        }
    }

    fn primary(&self) -> &DashMap<String, Slot> {
        &self.databases[0]
    }

    fn check_online(&self) -> Result<(), StorageError> {
        if self.is_offline() {
            Err(StorageError::Connection("Connection refused (os error 111)".to_string()))
        } else {
            Ok(())
        }
    }

    /// Drop `key` if it has expired, so later lookups see a clean map.
    fn purge_if_expired(&self, key: &str, now: Instant) {
        self.primary().remove_if(key, |_, slot| slot.is_expired(now));
    }
}

impl Default for InMemoryKvStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KvStore for InMemoryKvStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        self.check_online()?;
        let now = Instant::now();
        self.purge_if_expired(key, now);
        Ok(self.primary().get(key).map(|slot| slot.value.clone()))
    }

    async fn set(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        self.check_online()?;
        self.primary()
            .insert(key.to_string(), Slot::persistent(value.to_vec()));
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> Result<u64, StorageError> {
        self.check_online()?;
        let now = Instant::now();
        let removed = keys
            .iter()
            .filter_map(|key| self.primary().remove(key))
            .filter(|(_, slot)| !slot.is_expired(now))
            .count();
        Ok(removed as u64)
    }

    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        self.check_online()?;
        self.purge_if_expired(key, Instant::now());
        Ok(self.primary().contains_key(key))
    }

    async fn keys_matching(&self, pattern: &str) -> Result<Vec<String>, StorageError> {
        self.check_online()?;
        let pattern = KeyPattern::compile(pattern)?;
        let now = Instant::now();
        let mut keys: Vec<String> = self
            .primary()
            .iter()
            .filter(|entry| !entry.value().is_expired(now) && pattern.matches(entry.key()))
            .map(|entry| entry.key().clone())
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StorageError> {
        self.check_online()?;
        let now = Instant::now();
        self.purge_if_expired(key, now);
        match self.primary().get_mut(key) {
            Some(mut slot) => {
                slot.expires_at = Some(now + ttl);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn move_key(&self, key: &str, db: u32) -> Result<bool, StorageError> {
        self.check_online()?;
        if db >= DATABASES {
            return Err(StorageError::Backend("ERR DB index is out of range".to_string()));
        }
        if db == 0 {
            return Err(StorageError::Backend(
                "ERR source and destination objects are the same".to_string(),
            ));
        }
        let now = Instant::now();
        self.purge_if_expired(key, now);
        let target = &self.databases[db as usize];
        target.remove_if(key, |_, slot| slot.is_expired(now));
        if target.contains_key(key) {
            return Ok(false);
        }
        match self.primary().remove(key) {
            Some((key, slot)) => {
                target.insert(key, slot);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn rename(&self, old_key: &str, new_key: &str) -> Result<(), StorageError> {
        self.check_online()?;
        self.purge_if_expired(old_key, Instant::now());
        let (_, slot) = self
            .primary()
            .remove(old_key)
            .ok_or_else(|| StorageError::Backend("ERR no such key".to_string()))?;
        self.primary().insert(new_key.to_string(), slot);
        Ok(())
    }

    async fn key_type(&self, key: &str) -> Result<KeyType, StorageError> {
        self.check_online()?;
        self.purge_if_expired(key, Instant::now());
        Ok(if self.primary().contains_key(key) {
            KeyType::String
        } else {
            KeyType::None
        })
    }

    async fn db_size(&self) -> Result<u64, StorageError> {
        self.check_online()?;
        Ok(self.len_of(0) as u64)
    }

    async fn set_with_expiry(
        &self,
        key: &str,
        value: &[u8],
        ttl_secs: u64,
        only_if_absent: bool,
    ) -> Result<bool, StorageError> {
        self.check_online()?;
        if ttl_secs == 0 {
            return Err(StorageError::Backend(
                "ERR invalid expire time in 'set' command".to_string(),
            ));
        }
        let now = Instant::now();
        let slot = Slot {
            value: value.to_vec(),
            expires_at: Some(now + Duration::from_secs(ttl_secs)),
        };
        match self.primary().entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if only_if_absent && !occupied.get().is_expired(now) {
                    return Ok(false);
                }
                occupied.insert(slot);
                Ok(true)
            }
            Entry::Vacant(vacant) => {
                vacant.insert(slot);
                Ok(true)
            }
        }
    }

    async fn publish(&self, channel: &str, message: &[u8]) -> Result<u64, StorageError> {
        self.check_online()?;
        // send() only fails when nobody is subscribed
        let receivers = self
            .channel
            .send((channel.to_string(), message.to_vec()))
            .unwrap_or(0);
        Ok(receivers as u64)
    }
}
