use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// Transport-level failure: refused, reset or dropped connection, I/O timeout.
    #[error("Store connection failed: {0}")]
    Connection(String),
    #[error("Storage backend error: {0}")]
    Backend(String),
    #[error("Serialization failed: {0}")]
    Serialization(String),
    #[error("Invalid key pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },
}

/// Redis-style type of the value stored under a key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyType {
    None,
    String,
    List,
    Set,
    ZSet,
    Hash,
    Stream,
    Other(String),
}

impl KeyType {
    /// Parse the reply of a `TYPE` command.
    pub fn from_type_reply(reply: &str) -> Self {
        match reply {
            "none" => Self::None,
            "string" => Self::String,
            "list" => Self::List,
            "set" => Self::Set,
            "zset" => Self::ZSet,
            "hash" => Self::Hash,
            "stream" => Self::Stream,
            other => Self::Other(other.to_string()),
        }
    }
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::String => write!(f, "string"),
            Self::List => write!(f, "list"),
            Self::Set => write!(f, "set"),
            Self::ZSet => write!(f, "zset"),
            Self::Hash => write!(f, "hash"),
            Self::Stream => write!(f, "stream"),
            Self::Other(name) => write!(f, "{}", name),
        }
    }
}

/// Remote key-value store the facade sits in front of.
///
/// Implementations must report transport failures as
/// [`StorageError::Connection`] so callers can tell an unreachable store
/// apart from a rejected command.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;
    async fn set(&self, key: &str, value: &[u8]) -> Result<(), StorageError>;

    /// Delete keys, returning how many existed.
    async fn delete(&self, keys: &[String]) -> Result<u64, StorageError>;
    async fn exists(&self, key: &str) -> Result<bool, StorageError>;

    /// Glob-style enumeration (`*`, `?`, `[...]`). Cost scales with the key space.
    async fn keys_matching(&self, pattern: &str) -> Result<Vec<String>, StorageError>;

    /// Returns `false` when the key does not exist.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StorageError>;

    /// Move a key to another logical database. `false` if the key is missing
    /// or already present in the target.
    async fn move_key(&self, key: &str, db: u32) -> Result<bool, StorageError>;
    async fn rename(&self, old_key: &str, new_key: &str) -> Result<(), StorageError>;
    async fn key_type(&self, key: &str) -> Result<KeyType, StorageError>;
    async fn db_size(&self) -> Result<u64, StorageError>;

    /// Atomic `SET key value EX ttl_secs [NX]`. Returns whether the value was written.
    async fn set_with_expiry(
        &self,
        key: &str,
        value: &[u8],
        ttl_secs: u64,
        only_if_absent: bool,
    ) -> Result<bool, StorageError>;

    /// Returns the number of subscribers that received the message.
    async fn publish(&self, channel: &str, message: &[u8]) -> Result<u64, StorageError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_type_parses_known_replies() {
        assert_eq!(KeyType::from_type_reply("none"), KeyType::None);
        assert_eq!(KeyType::from_type_reply("string"), KeyType::String);
        assert_eq!(KeyType::from_type_reply("zset"), KeyType::ZSet);
        assert_eq!(
            KeyType::from_type_reply("ReJSON-RL"),
            KeyType::Other("ReJSON-RL".to_string())
        );
    }

    #[test]
    fn test_key_type_display_round_trips_reply() {
        for reply in ["none", "string", "list", "set", "zset", "hash", "stream", "ReJSON-RL"] {
            assert_eq!(KeyType::from_type_reply(reply).to_string(), reply);
        }
    }

    #[test]
    fn test_storage_error_display() {
        let err = StorageError::InvalidPattern {
            pattern: "user:[".into(),
            reason: "unterminated class".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("user:["));
        assert!(msg.contains("unterminated class"));
    }
}
