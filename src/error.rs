//! Error types for facade operations

use thiserror::Error;

use crate::storage::traits::StorageError;

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Unknown data source: {name}")]
    UnknownDataSource { name: String },
}

/// Master error type for facade operations.
///
/// Connectivity failures only reach callers from operations that cannot
/// degrade (see [`crate::dao::EntityStore`]); reads suppress them.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DaoError {
    #[error("Store error: {0}")]
    Store(#[from] StorageError),

    #[error("Lock timeout on '{key}' after {attempts} attempts")]
    LockTimeout { key: String, attempts: u32 },

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

impl DaoError {
    /// Whether this wraps a transport-level store failure.
    #[must_use]
    pub fn is_connectivity(&self) -> bool {
        matches!(self, DaoError::Store(StorageError::Connection(_)))
    }

    #[must_use]
    pub fn is_lock_timeout(&self) -> bool {
        matches!(self, DaoError::LockTimeout { .. })
    }
}

/// Result type alias for facade operations.
pub type DaoResult<T> = Result<T, DaoError>;
