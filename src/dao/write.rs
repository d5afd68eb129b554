//! Synchronous and deferred writes, and execution of deferred actions.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, instrument, warn};

use super::EntityStore;
use crate::entity::Entity;
use crate::error::DaoError;
use crate::metrics::{self, LatencyTimer};
use crate::resilience::failure::is_connectivity_failure;
use crate::storage::traits::StorageError;
use crate::write_behind::{ActionOp, ActionTarget, ScheduledAction};

impl<T: Entity> EntityStore<T> {
    /// Write each entity to the store now, caching it once the write lands.
    ///
    /// Entities are written in order; the first propagated error stops the
    /// batch with earlier entities already stored.
    #[instrument(skip(self, entities), fields(entity = self.name, count = entities.len()))]
    pub async fn save_sync(&self, entities: &[T]) -> Result<(), DaoError> {
        let _timer = LatencyTimer::new(self.name, "save_sync");
        for entity in entities {
            let key = entity.to_id();
            let bytes = self.codec.encode(entity)?;
            match self.store.set(&key, &bytes).await {
                Ok(()) => {
                    if let Some(cache) = &self.cache {
                        cache.put(&key, entity.clone());
                    }
                    metrics::record_operation(self.name, "save_sync", "success");
                }
                Err(err) if is_connectivity_failure(&err) => {
                    let action = ScheduledAction::upsert(self.owner.as_str(), entity.clone(), true);
                    self.fall_back(action, err)?;
                }
                Err(err) => {
                    metrics::record_operation(self.name, "save_sync", "error");
                    return Err(err.into());
                }
            }
        }
        Ok(())
    }

    /// Cache each entity now and persist it after `write_delay_ms`.
    ///
    /// Not durable until the queue applies the write.
    #[instrument(skip(self, entities), fields(entity = self.name, count = entities.len()))]
    pub fn save(&self, entities: &[T]) {
        let delay = self.config.store.write_delay();
        for entity in entities {
            if let Some(cache) = &self.cache {
                cache.put(&entity.to_id(), entity.clone());
            }
            self.schedule(ScheduledAction::upsert(self.owner.as_str(), entity.clone(), false), delay);
        }
    }

    /// Evict each key from the cache and delete it from the store now.
    #[instrument(skip(self), fields(entity = self.name))]
    pub async fn remove_sync(&self, keys: &[&str]) -> Result<(), DaoError> {
        let _timer = LatencyTimer::new(self.name, "remove_sync");
        for key in keys {
            if let Some(cache) = &self.cache {
                cache.remove(key);
            }
            match self.store.delete(&[key.to_string()]).await {
                Ok(_) => metrics::record_operation(self.name, "remove_sync", "success"),
                Err(err) if is_connectivity_failure(&err) => {
                    let action = ScheduledAction::delete(self.owner.as_str(), *key, true);
                    self.fall_back(action, err)?;
                }
                Err(err) => {
                    metrics::record_operation(self.name, "remove_sync", "error");
                    return Err(err.into());
                }
            }
        }
        Ok(())
    }

    /// Evict each key from the cache now and delete it after `write_delay_ms`.
    ///
    /// Not durable until the queue applies the delete.
    #[instrument(skip(self), fields(entity = self.name))]
    pub fn remove(&self, keys: &[&str]) {
        let delay = self.config.store.write_delay();
        for key in keys {
            if let Some(cache) = &self.cache {
                cache.remove(key);
            }
            self.schedule(ScheduledAction::delete(self.owner.as_str(), *key, false), delay);
        }
    }

    /// Defer `action` as a retry, or surface `err` when retries are off.
    fn fall_back(&self, action: ScheduledAction<T>, err: StorageError) -> Result<(), DaoError> {
        match self.config.store.retry_delay() {
            Some(delay) => {
                warn!(
                    entity = self.name,
                    kind = action.kind(),
                    retry_in_ms = metrics::millis(delay),
                    "Store unreachable, deferring write"
                );
                metrics::record_operation(self.name, action.kind(), "deferred");
                self.schedule(action, delay);
                Ok(())
            }
            None => Err(err.into()),
        }
    }

    fn schedule(&self, action: ScheduledAction<T>, delay: Duration) {
        debug!(
            entity = self.name,
            kind = action.kind(),
            retry = action.retry,
            delay_ms = metrics::millis(delay),
            "Scheduling write-behind action"
        );
        metrics::record_action_scheduled(action.kind(), action.retry);
        self.queue.schedule(action, delay);
    }
}

#[async_trait]
impl<T: Entity> ActionTarget<T> for EntityStore<T> {
    /// Execute a deferred action. Connectivity failures re-schedule it as a
    /// retry after `retry_delay_ms`; with retries off they are returned.
    async fn apply(&self, action: ScheduledAction<T>) -> Result<(), DaoError> {
        let result = match &action.op {
            ActionOp::Upsert(entity) => {
                let bytes = self.codec.encode(entity)?;
                self.store.set(&entity.to_id(), &bytes).await
            }
            ActionOp::Delete(key) => self.store.delete(std::slice::from_ref(key)).await.map(|_| ()),
        };

        match result {
            Ok(()) => {
                metrics::record_operation(self.name, action.kind(), "applied");
                Ok(())
            }
            Err(err) if is_connectivity_failure(&err) => self.fall_back(action.into_retry(), err),
            Err(err) => Err(err.into()),
        }
    }
}
