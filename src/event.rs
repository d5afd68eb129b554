//! Publish envelope for store events.
//!
//! `send` publishes `{"code": <event type>, "body": <event as JSON text>}`
//! so subscribers can dispatch on `code` before decoding `body`.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::codec::to_text;
use crate::entity::short_type_name;
use crate::storage::traits::StorageError;

/// A message that can be published through a facade.
pub trait StoreEvent: Serialize + Send + Sync {
    /// Dispatch code carried in the envelope. Defaults to the short type name.
    fn event_code(&self) -> String {
        short_type_name(std::any::type_name::<Self>()).to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub code: String,
    pub body: String,
}

impl EventEnvelope {
    pub fn of<E: StoreEvent + ?Sized>(event: &E) -> Result<Self, StorageError> {
        Ok(Self {
            code: event.event_code(),
            body: to_text(event)?,
        })
    }

    pub fn encode(&self) -> Result<Vec<u8>, StorageError> {
        serde_json::to_vec(self).map_err(|e| StorageError::Serialization(e.to_string()))
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, StorageError> {
        serde_json::from_slice(bytes).map_err(|e| StorageError::Serialization(e.to_string()))
    }

    /// Decode the body as `E`.
    pub fn body_as<E: DeserializeOwned>(&self) -> Result<E, StorageError> {
        serde_json::from_str(&self.body).map_err(|e| StorageError::Serialization(e.to_string()))
    }
}
