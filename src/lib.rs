//! # Entity Store
//!
//! Per-entity-type data access over Redis: a local LRU/TTL cache, a
//! distributed lock for read-modify-write sections, and two write paths
//! (write-through now, or write-behind later).
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     EntityStore<T>                          │
//! │  • find / find_cached / keys / query / for_each            │
//! │  • save_sync / remove_sync  (write-through)                │
//! │  • save / remove            (write-behind)                 │
//! │  • with_lock / transact     (distributed lock)             │
//! └─────────────────────────────────────────────────────────────┘
//!          │                    │                     │
//!          ▼                    ▼                     ▼
//! ┌─────────────────┐ ┌───────────────────┐ ┌──────────────────────┐
//! │   LocalCache    │ │  DistributedLock  │ │   WriteBehindQueue   │
//! │ LRU bound + TTL │ │ SET NX EX, backoff│ │ delayed upsert/delete│
//! └─────────────────┘ └───────────────────┘ └──────────────────────┘
//!                              │                     │
//!                              ▼                     ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                KvStore (Redis / in-memory)                  │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use entity_store::{
//!     ChannelQueue, DataSourcesConfig, EntityStore, EntityStoreConfig, Entity, JsonCodec,
//!     StoreStrategy, CacheStrategy,
//! };
//! use entity_store::storage::resolver::connect_redis_sources;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Clone, Serialize, Deserialize)]
//! struct Player {
//!     name: String,
//!     score: u64,
//! }
//!
//! impl Entity for Player {
//!     fn to_id(&self) -> String {
//!         format!("player:{}", self.name)
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let sources: DataSourcesConfig = serde_json::from_str(
//!         r#"{"sources": {"primary": {"url": "redis://localhost:6379/0"}}}"#,
//!     )?;
//!     let resolver = connect_redis_sources(&sources).await?;
//!
//!     let queue = Arc::new(ChannelQueue::new());
//!     queue.run_worker();
//!
//!     let players = EntityStore::<Player>::new(
//!         EntityStoreConfig {
//!             store: StoreStrategy::new("primary"),
//!             cache: Some(CacheStrategy { max_entries: 10_000, ttl_ms: 60_000 }),
//!             ..Default::default()
//!         },
//!         &resolver,
//!         Arc::new(JsonCodec),
//!         queue,
//!     )?;
//!
//!     players.save_sync(&[Player { name: "alice".into(), score: 10 }]).await?;
//!
//!     let bumped = players
//!         .transact("player:alice", |current| async move {
//!             Ok::<_, entity_store::DaoError>(current.map(|mut p| {
//!                 p.score += 1;
//!                 p
//!             }))
//!         })
//!         .await?;
//!     assert_eq!(bumped.map(|p| p.score), Some(11));
//!     Ok(())
//! }
//! ```
//!
//! ## Durability
//!
//! [`EntityStore::save`] and [`EntityStore::remove`] update the local cache
//! immediately and reach the store only when the write-behind queue applies
//! them. They are not durable until then; a process exit loses pending
//! actions. Use [`EntityStore::save_sync`] / [`EntityStore::remove_sync`]
//! when the caller needs the store to have the write on return.
//!
//! ## Failure handling
//!
//! Store errors are classified as connectivity failures (unreachable server)
//! or everything else. Reads degrade to absent/empty on connectivity
//! failures; synchronous writes fall back to the queue when a retry delay is
//! configured. All other errors propagate unchanged.
//!
//! ## Modules
//!
//! - [`dao`]: The [`EntityStore`] facade
//! - [`cache`]: Local LRU/TTL cache
//! - [`lock`]: Distributed lock
//! - [`write_behind`]: Scheduled actions and the in-process queue
//! - [`storage`]: Store contract, Redis and in-memory stores, data-source resolution
//! - [`resilience`]: Failure classification and transport retry

pub mod cache;
pub mod codec;
pub mod config;
pub mod dao;
pub mod entity;
pub mod error;
pub mod event;
pub mod lock;
pub mod metrics;
pub mod resilience;
pub mod storage;
pub mod write_behind;

pub use crate::cache::LocalCache;
pub use crate::codec::{EntityCodec, JsonCodec};
pub use crate::config::{CacheStrategy, DataSourceConfig, DataSourcesConfig, EntityStoreConfig, LockStrategy, StoreStrategy};
pub use crate::dao::EntityStore;
pub use crate::entity::Entity;
pub use crate::error::{ConfigError, DaoError, DaoResult};
pub use crate::event::{EventEnvelope, StoreEvent};
pub use crate::lock::{DistributedLock, LockGuard};
pub use crate::storage::memory::InMemoryKvStore;
pub use crate::storage::redis::RedisKvStore;
pub use crate::storage::resolver::{DataSourceResolver, StaticDataSources};
pub use crate::storage::traits::{KeyType, KvStore, StorageError};
pub use crate::write_behind::{ActionOp, ActionTarget, ChannelQueue, ScheduledAction, WriteBehindQueue};
pub use crate::resilience::retry::RetryConfig;
pub use crate::metrics::LatencyTimer;
