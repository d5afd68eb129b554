//! Named data-source resolution.
//!
//! Facades name the store they live in (`StoreStrategy::data_source`); a
//! resolver turns that name into a shared store handle once, at
//! construction time.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::info;

use super::redis::RedisKvStore;
use super::traits::{KvStore, StorageError};
use crate::config::DataSourcesConfig;
use crate::error::ConfigError;

/// Resolves a data-source name to a store connection.
pub trait DataSourceResolver: Send + Sync {
    fn resolve(&self, name: &str) -> Result<Arc<dyn KvStore>, ConfigError>;
}

/// A fixed set of already-built stores.
#[derive(Default, Clone)]
pub struct StaticDataSources {
    sources: HashMap<String, Arc<dyn KvStore>>,
}

impl StaticDataSources {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `store` under `name`, replacing any previous entry.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, store: Arc<dyn KvStore>) -> Self {
        self.sources.insert(name.into(), store);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, store: Arc<dyn KvStore>) {
        self.sources.insert(name.into(), store);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

impl DataSourceResolver for StaticDataSources {
    fn resolve(&self, name: &str) -> Result<Arc<dyn KvStore>, ConfigError> {
        self.sources
            .get(name)
            .cloned()
            .ok_or_else(|| ConfigError::UnknownDataSource { name: name.to_string() })
    }
}

/// Connect one [`RedisKvStore`] per configured data source.
pub async fn connect_redis_sources(config: &DataSourcesConfig) -> Result<StaticDataSources, StorageError> {
    let mut sources = StaticDataSources::new();
    for (name, source) in &config.sources {
        let store = RedisKvStore::with_prefix(&source.url, source.prefix.as_deref()).await?;
        info!(data_source = %name, prefix = ?source.prefix, "Connected data source");
        sources.insert(name.clone(), Arc::new(store));
    }
    Ok(sources)
}
