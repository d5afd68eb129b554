//! Redis implementation of [`KvStore`].
//!
//! Values are opaque byte strings (`GET`/`SET`); the facade's codec decides
//! their shape. Transport failures (refused, reset, dropped connections and
//! I/O timeouts) surface as [`StorageError::Connection`]; server-side
//! rejections surface as [`StorageError::Backend`] and are never retried.
//!
//! Idempotent commands (reads, plain `SET`, `DEL`, `PEXPIRE`) are retried
//! on transport failures with [`RetryConfig::query`]. `SET ... NX`,
//! `PUBLISH`, `RENAME` and `MOVE` are sent once: a reply lost after the
//! server applied them cannot be told apart from a refusal, and resending
//! would report our own lock as held or deliver a message twice.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{cmd, Client, RedisError};

use super::traits::{KeyType, KvStore, StorageError};
use crate::resilience::failure::is_transport_error;
use crate::resilience::retry::{retry, RetryConfig};

impl From<RedisError> for StorageError {
    fn from(e: RedisError) -> Self {
        if e.is_connection_refusal() || e.is_connection_dropped() || e.is_io_error() || e.is_timeout() {
            StorageError::Connection(e.to_string())
        } else {
            StorageError::Backend(e.to_string())
        }
    }
}

/// Whether a command may be resent after a transport failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Delivery {
    /// Sending twice has the same effect as sending once.
    Idempotent,
    /// A lost reply may hide an applied command, so send it once.
    AtMostOnce,
}

impl Delivery {
    fn policy(self, configured: &RetryConfig) -> RetryConfig {
        match self {
            Delivery::Idempotent => configured.clone(),
            Delivery::AtMostOnce => RetryConfig::once(),
        }
    }
}

pub struct RedisKvStore {
    connection: ConnectionManager,
    /// Optional key prefix for namespacing (e.g., "myapp:" → "myapp:user.alice")
    prefix: String,
    retry: RetryConfig,
}

impl RedisKvStore {
    /// Create a new Redis store without a key prefix.
    pub async fn new(connection_string: &str) -> Result<Self, StorageError> {
        Self::with_prefix(connection_string, None).await
    }

    /// Create a new Redis store with an optional key prefix.
    ///
    /// The prefix is prepended to all keys, enabling namespacing when
    /// sharing a Redis instance with other applications. Keys returned by
    /// [`KvStore::keys_matching`] have the prefix stripped again.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// # use entity_store::storage::redis::RedisKvStore;
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// // Keys will be prefixed: "myapp:user.alice", "myapp:config.app"
    /// let store = RedisKvStore::with_prefix("redis://localhost", Some("myapp:")).await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn with_prefix(connection_string: &str, prefix: Option<&str>) -> Result<Self, StorageError> {
        let client = Client::open(connection_string)
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        // Use startup config: fast-fail after a few seconds, don't hang forever
        let connection = retry("redis_connect", &RetryConfig::startup(), is_transport_error, || async {
            ConnectionManager::new(client.clone()).await.map_err(StorageError::from)
        })
        .await?;

        Ok(Self {
            connection,
            prefix: prefix.unwrap_or("").to_string(),
            retry: RetryConfig::query(),
        })
    }

    /// Override the per-command retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Apply the prefix to a key.
    #[inline]
    fn prefixed_key(&self, key: &str) -> String {
        if self.prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}{}", self.prefix, key)
        }
    }

    /// Strip the prefix from a key (for returning clean IDs).
    #[inline]
    fn strip_prefix<'a>(&self, key: &'a str) -> &'a str {
        if self.prefix.is_empty() {
            key
        } else {
            key.strip_prefix(&self.prefix).unwrap_or(key)
        }
    }

    /// Get a clone of the connection manager
    pub fn connection(&self) -> ConnectionManager {
        self.connection.clone()
    }

    /// Get the configured prefix
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Run one command, retrying transport failures only if `delivery` allows.
    async fn query<T>(&self, operation: &str, command: redis::Cmd, delivery: Delivery) -> Result<T, StorageError>
    where
        T: redis::FromRedisValue + Send,
    {
        let policy = delivery.policy(&self.retry);
        let conn = self.connection.clone();
        retry(operation, &policy, is_transport_error, || {
            let mut conn = conn.clone();
            let command = command.clone();
            async move {
                let reply: redis::RedisResult<T> = command.query_async(&mut conn).await;
                reply.map_err(StorageError::from)
            }
        })
        .await
    }
}

#[async_trait]
impl KvStore for RedisKvStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let mut command = cmd("GET");
        command.arg(self.prefixed_key(key));
        self.query("redis_get", command, Delivery::Idempotent).await
    }

    async fn set(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        let mut command = cmd("SET");
        command.arg(self.prefixed_key(key)).arg(value);
        self.query("redis_set", command, Delivery::Idempotent).await
    }

    async fn delete(&self, keys: &[String]) -> Result<u64, StorageError> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut command = cmd("DEL");
        for key in keys {
            command.arg(self.prefixed_key(key));
        }
        self.query("redis_delete", command, Delivery::Idempotent).await
    }

    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        let mut command = cmd("EXISTS");
        command.arg(self.prefixed_key(key));
        self.query("redis_exists", command, Delivery::Idempotent).await
    }

    async fn keys_matching(&self, pattern: &str) -> Result<Vec<String>, StorageError> {
        let mut command = cmd("KEYS");
        command.arg(format!("{}{}", escape_glob(&self.prefix), pattern));
        let keys: Vec<String> = self.query("redis_keys", command, Delivery::Idempotent).await?;
        Ok(keys.iter().map(|k| self.strip_prefix(k).to_string()).collect())
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StorageError> {
        let mut command = cmd("PEXPIRE");
        command.arg(self.prefixed_key(key)).arg(u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX));
        self.query("redis_pexpire", command, Delivery::Idempotent).await
    }

    async fn move_key(&self, key: &str, db: u32) -> Result<bool, StorageError> {
        let mut command = cmd("MOVE");
        command.arg(self.prefixed_key(key)).arg(db);
        self.query("redis_move", command, Delivery::AtMostOnce).await
    }

    async fn rename(&self, old_key: &str, new_key: &str) -> Result<(), StorageError> {
        let mut command = cmd("RENAME");
        command.arg(self.prefixed_key(old_key)).arg(self.prefixed_key(new_key));
        self.query("redis_rename", command, Delivery::AtMostOnce).await
    }

    async fn key_type(&self, key: &str) -> Result<KeyType, StorageError> {
        let mut command = cmd("TYPE");
        command.arg(self.prefixed_key(key));
        let reply: String = self.query("redis_type", command, Delivery::Idempotent).await?;
        Ok(KeyType::from_type_reply(&reply))
    }

    async fn db_size(&self) -> Result<u64, StorageError> {
        self.query("redis_dbsize", cmd("DBSIZE"), Delivery::Idempotent).await
    }

    async fn set_with_expiry(
        &self,
        key: &str,
        value: &[u8],
        ttl_secs: u64,
        only_if_absent: bool,
    ) -> Result<bool, StorageError> {
        let mut command = cmd("SET");
        command.arg(self.prefixed_key(key)).arg(value).arg("EX").arg(ttl_secs);
        // "OK" when written, nil when NX refused
        let delivery = if only_if_absent {
            command.arg("NX");
            Delivery::AtMostOnce
        } else {
            Delivery::Idempotent
        };
        let reply: Option<String> = self.query("redis_set_ex", command, delivery).await?;
        Ok(reply.is_some())
    }

    async fn publish(&self, channel: &str, message: &[u8]) -> Result<u64, StorageError> {
        let mut command = cmd("PUBLISH");
        command.arg(channel).arg(message);
        self.query("redis_publish", command, Delivery::AtMostOnce).await
    }
}

/// Escape glob metacharacters so `literal` only matches itself in `KEYS`.
fn escape_glob(literal: &str) -> String {
    let mut escaped = String::with_capacity(literal.len());
    for c in literal.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::pattern::KeyPattern;

    #[test]
    fn test_at_most_once_commands_are_never_resent() {
        let configured = RetryConfig::query();
        assert_eq!(Delivery::AtMostOnce.policy(&configured).max_retries, 1);
        assert_eq!(Delivery::Idempotent.policy(&configured).max_retries, configured.max_retries);
    }

    #[test]
    fn test_escape_glob_leaves_plain_prefix_alone() {
        assert_eq!(escape_glob("myapp:"), "myapp:");
        assert_eq!(escape_glob(""), "");
    }

    #[test]
    fn test_escaped_prefix_matches_only_itself() {
        let pattern = format!("{}user:*", escape_glob("a*[b]?\\:"));
        assert_eq!(pattern, "a\\*\\[b\\]\\?\\\\:user:*");
        let compiled = KeyPattern::compile(&pattern).unwrap();
        assert!(compiled.matches("a*[b]?\\:user:1"));
        assert!(!compiled.matches("axyzb0\\:user:1"));
        assert!(!compiled.matches("abb?\\:user:1"));
    }
}
