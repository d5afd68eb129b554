//! Key-space pass-throughs and event publishing.

use std::time::Duration;

use tracing::{debug, instrument};

use super::EntityStore;
use crate::entity::Entity;
use crate::error::DaoError;
use crate::event::{EventEnvelope, StoreEvent};
use crate::metrics;
use crate::resilience::failure::is_connectivity_failure;
use crate::storage::traits::KeyType;

impl<T: Entity> EntityStore<T> {
    pub async fn exists(&self, key: &str) -> Result<bool, DaoError> {
        Ok(self.store.exists(key).await?)
    }

    /// Set a time-to-live on `key`. `false` if the key does not exist.
    pub async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, DaoError> {
        Ok(self.store.expire(key, ttl).await?)
    }

    /// Move `key` to database `db`. `false` if it is missing here or already
    /// present there.
    pub async fn move_key(&self, key: &str, db: u32) -> Result<bool, DaoError> {
        Ok(self.store.move_key(key, db).await?)
    }

    /// Rename `old_key` to `new_key`; `false` when the store is unreachable.
    #[instrument(skip(self), fields(entity = self.name))]
    pub async fn rename(&self, old_key: &str, new_key: &str) -> Result<bool, DaoError> {
        match self.store.rename(old_key, new_key).await {
            Ok(()) => Ok(true),
            Err(err) if is_connectivity_failure(&err) => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    pub async fn key_type(&self, key: &str) -> Result<KeyType, DaoError> {
        Ok(self.store.key_type(key).await?)
    }

    /// Number of keys in the current database.
    pub async fn db_size(&self) -> Result<u64, DaoError> {
        Ok(self.store.db_size().await?)
    }

    /// Publish `event` on every channel, wrapped in an [`EventEnvelope`].
    /// Returns the total number of subscribers that received it.
    #[instrument(skip(self, event), fields(entity = self.name))]
    pub async fn send<E: StoreEvent>(&self, event: &E, channels: &[&str]) -> Result<u64, DaoError> {
        let envelope = EventEnvelope::of(event)?;
        let payload = envelope.encode()?;

        let mut receivers = 0;
        for channel in channels {
            let reached = self.store.publish(channel, &payload).await?;
            debug!(channel = %channel, code = %envelope.code, reached, "Published event");
            receivers += reached;
        }
        metrics::record_event_published(&envelope.code, receivers);
        Ok(receivers)
    }
}
