// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Write-behind handoff.
//!
//! Facades hand deferred writes to a [`WriteBehindQueue`] as
//! [`ScheduledAction`]s and forget about them. The queue owns timing,
//! execution and logging of failures; it routes each action back to the
//! facade that produced it through the owner id registered at construction.
//!
//! ```text
//! facade.save(e) ──schedule(action, delay)──► queue ──(after delay)──► owner.apply(action)
//! ```
//!
//! [`ChannelQueue`] is the in-process implementation: an unbounded tokio
//! channel drained by [`ChannelQueue::run_worker`], one sleeping task per
//! action. Nothing is persisted, so pending actions die with the process.

use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, warn};

use crate::error::DaoError;
use crate::metrics;

/// What a deferred action does to the store.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionOp<T> {
    /// Encode and `SET` the entity under its id.
    Upsert(T),
    /// `DEL` the key.
    Delete(String),
}

/// A unit of deferred work, fire-and-forget from the facade's side.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledAction<T> {
    /// Owner id of the facade that applies it
    pub owner: String,
    pub op: ActionOp<T>,
    /// Set when the action replays a synchronous write that hit a
    /// connectivity failure
    pub retry: bool,
}

impl<T> ScheduledAction<T> {
    pub fn upsert(owner: impl Into<String>, entity: T, retry: bool) -> Self {
        Self {
            owner: owner.into(),
            op: ActionOp::Upsert(entity),
            retry,
        }
    }

    pub fn delete(owner: impl Into<String>, key: impl Into<String>, retry: bool) -> Self {
        Self {
            owner: owner.into(),
            op: ActionOp::Delete(key.into()),
            retry,
        }
    }

    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self.op {
            ActionOp::Upsert(_) => "upsert",
            ActionOp::Delete(_) => "delete",
        }
    }

    /// The same action, flagged as a retry.
    #[must_use]
    pub fn into_retry(mut self) -> Self {
        self.retry = true;
        self
    }
}

/// Something that can execute actions it scheduled earlier.
#[async_trait]
pub trait ActionTarget<T>: Send + Sync
where
    T: Send + Sync + 'static,
{
    async fn apply(&self, action: ScheduledAction<T>) -> Result<(), DaoError>;
}

/// Handle facades use to defer work.
pub trait WriteBehindQueue<T>: Send + Sync
where
    T: Send + Sync + 'static,
{
    /// Enqueue `action` to run after `delay`. Must not block.
    fn schedule(&self, action: ScheduledAction<T>, delay: Duration);

    /// Route future actions for `owner` to `target`.
    fn register_owner(&self, owner: &str, target: Weak<dyn ActionTarget<T>>);
}

struct Pending<T> {
    action: ScheduledAction<T>,
    delay: Duration,
}

type Owners<T> = Arc<DashMap<String, Weak<dyn ActionTarget<T>>>>;

/// In-process write-behind queue.
pub struct ChannelQueue<T: Send + Sync + 'static> {
    sender: mpsc::UnboundedSender<Pending<T>>,
    receiver: Mutex<Option<mpsc::UnboundedReceiver<Pending<T>>>>,
    owners: Owners<T>,
}

impl<T: Send + Sync + 'static> ChannelQueue<T> {
    #[must_use]
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            sender,
            receiver: Mutex::new(Some(receiver)),
            owners: Arc::new(DashMap::new()),
        }
    }

    /// Start draining the queue on the current runtime.
    ///
    /// Actions scheduled before the worker starts are buffered. Returns
    /// `None` if a worker was already started. The worker ends once the
    /// queue is dropped and every buffered action has been dispatched.
    pub fn run_worker(&self) -> Option<JoinHandle<()>> {
        let Some(mut receiver) = self.receiver.lock().take() else {
            warn!("Write-behind worker already running");
            return None;
        };
        let owners = Arc::clone(&self.owners);

        Some(tokio::spawn(async move {
            while let Some(Pending { action, delay }) = receiver.recv().await {
                let owners = Arc::clone(&owners);
                tokio::spawn(async move {
                    if !delay.is_zero() {
                        sleep(delay).await;
                    }
                    dispatch(&owners, action).await;
                });
            }
            debug!("Write-behind queue closed, worker exiting");
        }))
    }

    #[must_use]
    pub fn owner_count(&self) -> usize {
        self.owners.len()
    }
}

impl<T: Send + Sync + 'static> Default for ChannelQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

async fn dispatch<T: Send + Sync + 'static>(owners: &Owners<T>, action: ScheduledAction<T>) {
    let kind = action.kind();
    let target = owners.get(&action.owner).and_then(|target| target.upgrade());

    let Some(target) = target else {
        warn!(owner = %action.owner, kind, "Owner gone, discarding write-behind action");
        owners.remove(&action.owner);
        metrics::record_action_applied(kind, "orphaned");
        return;
    };

    let owner = action.owner.clone();
    let retry = action.retry;
    match target.apply(action).await {
        Ok(()) => {
            debug!(owner = %owner, kind, retry, "Applied write-behind action");
            metrics::record_action_applied(kind, "success");
        }
        Err(e) => {
            error!(owner = %owner, kind, retry, error = %e, "Write-behind action failed");
            metrics::record_action_applied(kind, "error");
        }
    }
}

impl<T: Send + Sync + 'static> WriteBehindQueue<T> for ChannelQueue<T> {
    fn schedule(&self, action: ScheduledAction<T>, delay: Duration) {
        if let Err(mpsc::error::SendError(pending)) = self.sender.send(Pending { action, delay }) {
            error!(
                owner = %pending.action.owner,
                kind = pending.action.kind(),
                "Write-behind worker stopped, action dropped"
            );
        }
    }

    fn register_owner(&self, owner: &str, target: Weak<dyn ActionTarget<T>>) {
        debug!(owner = %owner, "Registered write-behind owner");
        self.owners.insert(owner.to_string(), target);
    }
}
