//! Failure classification for store errors.
//!
//! A connectivity failure means the store could not be reached; callers
//! degrade (empty reads, deferred writes) instead of failing. Every other
//! error is a logic error and must reach the caller unchanged.

use tracing::error;

use crate::storage::traits::StorageError;

/// Whether `err` is a transport-level failure. Connectivity failures are
/// logged and counted here so call sites only decide how to degrade.
pub fn is_connectivity_failure(err: &StorageError) -> bool {
    let connectivity = is_transport_error(err);
    if connectivity {
        error!(error = %err, "Store unreachable");
        crate::metrics::record_connectivity_failure();
    }
    connectivity
}

/// Side-effect free variant of [`is_connectivity_failure`].
#[inline]
pub fn is_transport_error(err: &StorageError) -> bool {
    matches!(err, StorageError::Connection(_))
}

/// Split a store result into "value", "suppressed connectivity failure"
/// (`Ok(None)`), or the propagated error.
pub fn suppress_connectivity<T>(result: Result<T, StorageError>) -> Result<Option<T>, StorageError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(err) if is_connectivity_failure(&err) => Ok(None),
        Err(err) => Err(err),
    }
}
