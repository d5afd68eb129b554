//! Per-entity-type configuration.
//!
//! Each facade is configured by three strategies, resolved once when the
//! facade is built:
//!
//! - [`StoreStrategy`] (required): which data source, write-behind delay and
//!   connectivity-failure retry delay.
//! - [`CacheStrategy`] (optional): bound and TTL of the local cache. Absent
//!   means no local caching for the entity type.
//! - [`LockStrategy`]: distributed lock retry budget, backoff step and TTL.
//!
//! # Example
//!
//! ```
//! use entity_store::{EntityStoreConfig, StoreStrategy, CacheStrategy};
//!
//! let config = EntityStoreConfig {
//!     store: StoreStrategy::new("primary"),
//!     cache: Some(CacheStrategy { max_entries: 10_000, ttl_ms: 60_000 }),
//!     ..Default::default()
//! };
//! assert_eq!(config.lock.max_attempts, 25);
//! assert!(config.validate().is_ok());
//! ```

use std::collections::HashMap;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

/// Distributed lock tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct LockStrategy {
    /// Retry budget. Acquisition makes `max_attempts + 2` conditional-set attempts.
    #[serde(default = "default_lock_max_attempts")]
    pub max_attempts: u32,

    /// Linear backoff step; attempt `i` is followed by `min(2s, step * i)` of sleep.
    #[serde(default = "default_lock_backoff_step_ms")]
    pub backoff_step_ms: u64,

    /// Lock expiry. Sent to the store in whole seconds (rounded down).
    #[serde(default = "default_lock_ttl_ms")]
    pub lock_ttl_ms: u64,
}

fn default_lock_max_attempts() -> u32 { 25 }
fn default_lock_backoff_step_ms() -> u64 { 250 }
fn default_lock_ttl_ms() -> u64 { 10_000 }

impl Default for LockStrategy {
    fn default() -> Self {
        Self {
            max_attempts: default_lock_max_attempts(),
            backoff_step_ms: default_lock_backoff_step_ms(),
            lock_ttl_ms: default_lock_ttl_ms(),
        }
    }
}

impl LockStrategy {
    #[must_use]
    pub fn backoff_step(&self) -> Duration {
        Duration::from_millis(self.backoff_step_ms)
    }

    /// TTL at store granularity.
    #[must_use]
    pub fn lock_ttl_secs(&self) -> u64 {
        self.lock_ttl_ms / 1000
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.lock_ttl_secs() == 0 {
            return Err(ConfigError::InvalidValue {
                field: "lock.lock_ttl_ms".to_string(),
                value: self.lock_ttl_ms.to_string(),
                reason: "must be at least one second".to_string(),
            });
        }
        Ok(())
    }
}

/// Local cache bound and expiry. Zero disables the respective limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct CacheStrategy {
    /// Maximum entries before least-recently-used eviction (0 = unbounded)
    #[serde(default = "default_cache_max_entries")]
    pub max_entries: usize,

    /// Entry lifetime after last write or access (0 = never expires)
    #[serde(default)]
    pub ttl_ms: u64,
}

fn default_cache_max_entries() -> usize { 10_000 }

impl Default for CacheStrategy {
    fn default() -> Self {
        Self {
            max_entries: default_cache_max_entries(),
            ttl_ms: 0,
        }
    }
}

impl CacheStrategy {
    #[must_use]
    pub fn ttl(&self) -> Option<Duration> {
        (self.ttl_ms > 0).then(|| Duration::from_millis(self.ttl_ms))
    }

    #[must_use]
    pub fn capacity(&self) -> Option<usize> {
        (self.max_entries > 0).then_some(self.max_entries)
    }
}

/// Where and how an entity type is persisted.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StoreStrategy {
    /// Name of the data source to resolve (see [`DataSourcesConfig`])
    pub data_source: String,

    /// Delay before an asynchronous write reaches the store
    #[serde(default = "default_write_delay_ms")]
    pub write_delay_ms: u64,

    /// Delay before a synchronous write that hit a connectivity failure is
    /// retried through the write-behind queue (0 = propagate the failure)
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

fn default_write_delay_ms() -> u64 { 1_000 }
fn default_retry_delay_ms() -> u64 { 5_000 }

impl StoreStrategy {
    pub fn new(data_source: impl Into<String>) -> Self {
        Self {
            data_source: data_source.into(),
            write_delay_ms: default_write_delay_ms(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }

    #[must_use]
    pub fn write_delay(&self) -> Duration {
        Duration::from_millis(self.write_delay_ms)
    }

    /// `None` when connectivity fallback is disabled.
    #[must_use]
    pub fn retry_delay(&self) -> Option<Duration> {
        (self.retry_delay_ms > 0).then(|| Duration::from_millis(self.retry_delay_ms))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.data_source.trim().is_empty() {
            return Err(ConfigError::MissingRequired {
                field: "store.data_source".to_string(),
            });
        }
        Ok(())
    }
}

impl Default for StoreStrategy {
    fn default() -> Self {
        Self::new("default")
    }
}

/// Full configuration of one facade.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct EntityStoreConfig {
    pub store: StoreStrategy,

    #[serde(default)]
    pub cache: Option<CacheStrategy>,

    #[serde(default)]
    pub lock: LockStrategy,
}

impl EntityStoreConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.store.validate()?;
        self.lock.validate()
    }
}

/// Connection settings for one named data source.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DataSourceConfig {
    /// Redis connection string (e.g., "redis://localhost:6379/0")
    pub url: String,

    /// Optional key prefix applied to every key of this source
    #[serde(default)]
    pub prefix: Option<String>,
}

/// Named data sources shared by all facades of a process.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct DataSourcesConfig {
    #[serde(default)]
    pub sources: HashMap<String, DataSourceConfig>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_defaults() {
        let lock = LockStrategy::default();
        assert_eq!(lock.max_attempts, 25);
        assert_eq!(lock.backoff_step(), Duration::from_millis(250));
        assert_eq!(lock.lock_ttl_secs(), 10);
    }

    #[test]
    fn test_lock_ttl_rounds_down_to_seconds() {
        let lock = LockStrategy { lock_ttl_ms: 2_999, ..Default::default() };
        assert_eq!(lock.lock_ttl_secs(), 2);
        assert!(lock.validate().is_ok());

        let sub_second = LockStrategy { lock_ttl_ms: 999, ..Default::default() };
        assert!(matches!(
            sub_second.validate(),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_cache_limits() {
        let unbounded = CacheStrategy { max_entries: 0, ttl_ms: 0 };
        assert_eq!(unbounded.capacity(), None);
        assert_eq!(unbounded.ttl(), None);

        let bounded = CacheStrategy { max_entries: 2, ttl_ms: 500 };
        assert_eq!(bounded.capacity(), Some(2));
        assert_eq!(bounded.ttl(), Some(Duration::from_millis(500)));
    }

    #[test]
    fn test_store_retry_delay_zero_disables_fallback() {
        let store = StoreStrategy { retry_delay_ms: 0, ..StoreStrategy::new("primary") };
        assert_eq!(store.retry_delay(), None);
        assert_eq!(StoreStrategy::new("primary").retry_delay(), Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_empty_data_source_is_rejected() {
        let config = EntityStoreConfig {
            store: StoreStrategy::new("  "),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingRequired { .. })
        ));
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let config: EntityStoreConfig = serde_json::from_str(
            r#"{"store": {"data_source": "primary", "retry_delay_ms": 0}, "cache": {"ttl_ms": 1000}}"#,
        )
        .unwrap();
        assert_eq!(config.store.data_source, "primary");
        assert_eq!(config.store.write_delay_ms, 1_000);
        assert_eq!(config.store.retry_delay_ms, 0);
        assert_eq!(config.cache, Some(CacheStrategy { max_entries: 10_000, ttl_ms: 1_000 }));
        assert_eq!(config.lock, LockStrategy::default());
    }

    #[test]
    fn test_deserialize_without_cache_disables_it() {
        let config: EntityStoreConfig =
            serde_json::from_str(r#"{"store": {"data_source": "primary"}}"#).unwrap();
        assert!(config.cache.is_none());
    }

    #[test]
    fn test_data_sources_deserialize() {
        let config: DataSourcesConfig = serde_json::from_str(
            r#"{"sources": {"primary": {"url": "redis://localhost:6379/0", "prefix": "app:"}}}"#,
        )
        .unwrap();
        let primary = &config.sources["primary"];
        assert_eq!(primary.url, "redis://localhost:6379/0");
        assert_eq!(primary.prefix.as_deref(), Some("app:"));
    }
}
