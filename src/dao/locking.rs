//! Lock-guarded critical sections.

use std::future::Future;

use tracing::{error, instrument};

use super::EntityStore;
use crate::entity::Entity;
use crate::error::DaoError;
use crate::lock::LockGuard;
use crate::metrics;

impl<T: Entity> EntityStore<T> {
    /// Run `f` while holding the distributed lock on `key`.
    ///
    /// The lock is released whether `f` succeeds or fails. If `f` succeeds
    /// but the release fails, the release error is returned. Failing to
    /// acquire yields [`DaoError::LockTimeout`] converted into `E`. If the
    /// returned future is dropped mid-section the lock is freed in the
    /// background instead of lingering until its TTL.
    ///
    /// ```rust,no_run
    /// # use std::sync::Arc;
    /// # use entity_store::{DaoError, Entity, EntityStore};
    /// # async fn example<T: Entity>(store: Arc<EntityStore<T>>) -> Result<(), DaoError> {
    /// let total = store
    ///     .with_lock("ledger:42", || async { Ok::<_, DaoError>(7) })
    ///     .await?;
    /// # Ok(())
    /// # }
    /// ```
    #[instrument(skip(self, f), fields(entity = self.name))]
    pub async fn with_lock<F, Fut, R, E>(&self, key: &str, f: F) -> Result<R, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<R, E>>,
        E: From<DaoError>,
    {
        let guard = self.acquire_lock(key).await?;
        let result = f().await;
        let released = self.release_lock(guard).await;

        match (result, released) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(release_err)) => Err(release_err.into()),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(release_err)) => {
                error!(key = %key, error = %release_err, "Lock release failed after section error");
                Err(e)
            }
        }
    }

    /// Read-modify-write `key` under the distributed lock.
    ///
    /// `f` receives the current value (or `None`) and returns the new one.
    /// A `Some` result is written with [`save_sync`](Self::save_sync) before
    /// the lock is released; `None` writes nothing.
    ///
    /// If `f` fails, the value it was given is written back (when there was
    /// one) before the error is returned. Callers relying on "no write on
    /// failure" must not use this helper.
    #[instrument(skip(self, f), fields(entity = self.name))]
    pub async fn transact<F, Fut, E>(&self, key: &str, f: F) -> Result<Option<T>, E>
    where
        F: FnOnce(Option<T>) -> Fut,
        Fut: Future<Output = Result<Option<T>, E>>,
        E: From<DaoError>,
    {
        let guard = self.acquire_lock(key).await?;

        let current = match self.find(key).await {
            Ok(current) => current,
            Err(err) => {
                if let Err(release_err) = self.release_lock(guard).await {
                    error!(key = %key, error = %release_err, "Lock release failed after read error");
                }
                return Err(err.into());
            }
        };

        let snapshot = current.clone();
        let (to_persist, result) = match f(current).await {
            Ok(updated) => (updated.clone(), Ok(updated)),
            Err(e) => (snapshot, Err(e)),
        };

        let saved = match &to_persist {
            Some(entity) => self.save_sync(std::slice::from_ref(entity)).await,
            None => Ok(()),
        };
        let released = self.release_lock(guard).await;

        match result {
            Ok(updated) => {
                saved?;
                released?;
                Ok(updated)
            }
            Err(e) => {
                if let Err(save_err) = saved {
                    error!(key = %key, error = %save_err, "Failed to write back value after transform error");
                }
                if let Err(release_err) = released {
                    error!(key = %key, error = %release_err, "Lock release failed after transform error");
                }
                Err(e)
            }
        }
    }

    async fn acquire_lock(&self, key: &str) -> Result<LockGuard, DaoError> {
        match self.lock.lock(key).await? {
            Some(guard) => Ok(guard),
            None => {
                metrics::record_operation(self.name, "lock", "timeout");
                Err(DaoError::LockTimeout {
                    key: key.to_string(),
                    attempts: self.lock.total_attempts(),
                })
            }
        }
    }

    async fn release_lock(&self, guard: LockGuard) -> Result<(), DaoError> {
        metrics::record_lock_held(guard.held_for());
        guard.release().await?;
        Ok(())
    }
}
