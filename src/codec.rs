//! Entity ⇄ bytes and value ⇄ text conversion.
//!
//! The facade never looks inside stored values; it hands entities to an
//! [`EntityCodec`] before `SET` and after `GET`. [`JsonCodec`] is the
//! default and stores entities as JSON documents, which keeps them readable
//! from `redis-cli`.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::storage::traits::StorageError;

/// Converts entities to and from their stored byte form.
pub trait EntityCodec<T>: Send + Sync {
    fn encode(&self, entity: &T) -> Result<Vec<u8>, StorageError>;
    fn decode(&self, bytes: &[u8]) -> Result<T, StorageError>;
}

/// JSON via `serde_json`.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonCodec;

impl<T> EntityCodec<T> for JsonCodec
where
    T: Serialize + DeserializeOwned,
{
    fn encode(&self, entity: &T) -> Result<Vec<u8>, StorageError> {
        serde_json::to_vec(entity).map_err(|e| StorageError::Serialization(e.to_string()))
    }

    fn decode(&self, bytes: &[u8]) -> Result<T, StorageError> {
        serde_json::from_slice(bytes).map_err(|e| StorageError::Serialization(e.to_string()))
    }
}

/// Render any serializable value as JSON text (event payloads).
pub fn to_text<S: Serialize + ?Sized>(value: &S) -> Result<String, StorageError> {
    serde_json::to_string(value).map_err(|e| StorageError::Serialization(e.to_string()))
}
